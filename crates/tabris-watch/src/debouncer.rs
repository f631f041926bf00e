//! Change debouncing for live reload.
//!
//! Coalesces filesystem events into one batch per quiet window. Every
//! recorded event pushes the shared deadline back, so a burst of writes
//! across any number of files yields a single batch once the files settle.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A debounced filesystem change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Single-owner change debouncer.
pub(crate) struct ChangeDebouncer {
    pending: BTreeMap<PathBuf, ChangeKind>,
    deadline: Option<Instant>,
    window: Duration,
}

impl ChangeDebouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            pending: BTreeMap::new(),
            deadline: None,
            window,
        }
    }

    /// Record a change and restart the quiet window.
    pub(crate) fn record(&mut self, path: PathBuf, kind: ChangeKind) {
        use std::collections::btree_map::Entry;

        self.deadline = Some(Instant::now() + self.window);

        match self.pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(kind);
            }
            Entry::Occupied(mut entry) => {
                if let Some(coalesced) = Self::coalesce(*entry.get(), kind) {
                    *entry.get_mut() = coalesced;
                } else {
                    entry.remove();
                }
            }
        }
    }

    /// Coalesce two change kinds for the same path.
    ///
    /// Returns `None` if both should be discarded (created then removed).
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Created, Modified, Removed};

        match (existing, new) {
            (Created, Created) => Some(Created),
            (Created, Modified) => Some(Created),
            (Created, Removed) => None,

            (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),

            // Replaced via write-to-temp-then-rename.
            (Removed, Created) => Some(Modified),
            (Removed, Modified) => Some(Removed),
            (Removed, Removed) => Some(Removed),
        }
    }

    /// Take the pending batch if the quiet window has elapsed.
    pub(crate) fn drain_ready(&mut self) -> Vec<Change> {
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {}
            _ => return Vec::new(),
        }
        self.deadline = None;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(path, kind)| Change { path, kind })
            .collect()
    }

    /// When the pending batch becomes ready, if anything is pending.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Discard everything pending.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }
}

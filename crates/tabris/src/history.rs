//! Persisted remote console history.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name of the history log inside the data directory.
pub(crate) const HISTORY_FILE: &str = "cli_history.log";

/// Entries kept when loading.
const MAX_ENTRIES: usize = 1000;

/// Command history with up/down navigation.
///
/// The cursor sits past the newest entry until the user navigates back.
#[derive(Debug, Default)]
pub(crate) struct History {
    path: Option<PathBuf>,
    entries: Vec<String>,
    cursor: usize,
}

impl History {
    /// Load the history stored at `path`. A missing file is an empty history.
    pub(crate) fn load(path: &Path) -> io::Result<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        let skip = entries.len().saturating_sub(MAX_ENTRIES);
        let entries: Vec<String> = entries.into_iter().skip(skip).collect();
        Ok(Self {
            path: Some(path.to_path_buf()),
            cursor: entries.len(),
            entries,
        })
    }

    /// Record `command` and reset navigation.
    ///
    /// A repeat of the newest entry is not recorded again.
    pub(crate) fn add(&mut self, command: &str) {
        if self.entries.last().is_none_or(|last| last != command) {
            self.entries.push(command.to_owned());
            if let Err(e) = self.append(command) {
                tracing::debug!(error = %e, "Failed to write console history");
            }
        }
        self.reset();
    }

    /// Step back to an older entry. Stays on the oldest.
    pub(crate) fn older(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = self.cursor.saturating_sub(1);
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Step forward to a newer entry. Past the newest the line is empty.
    pub(crate) fn newer(&mut self) -> Option<&str> {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
        self.entries.get(self.cursor).map(String::as_str)
    }

    pub(crate) fn reset(&mut self) {
        self.cursor = self.entries.len();
    }

    fn append(&self, command: &str) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{command}")
    }
}

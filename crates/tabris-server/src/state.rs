//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use tabris_session::SessionManager;
use tabris_watch::ReloadWatcher;

/// State shared by all handlers.
pub(crate) struct AppState {
    /// Canonical project root; every served file lives below it.
    pub(crate) project_dir: PathBuf,
    pub(crate) sessions: SessionManager,
    /// Reload watcher, when live reload is enabled.
    pub(crate) watcher: Option<Arc<ReloadWatcher>>,
}

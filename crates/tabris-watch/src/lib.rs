//! Live reload for files delivered to a tabris device.
//!
//! The serving layer calls [`ReloadWatcher::observe`] for every file it
//! delivers. Only those files (and direct children of delivered
//! directories) are watched. Once [`ReloadWatcher::start`] is called, a
//! settled burst of changes sends [`RELOAD_COMMAND`] through a
//! [`CommandSender`](tabris_session::CommandSender), usually the
//! [`SessionManager`](tabris_session::SessionManager).

mod debouncer;
mod error;
mod watch_set;
mod watcher;

pub use debouncer::{Change, ChangeKind};
pub use error::WatchError;
pub use watcher::{DEFAULT_DEBOUNCE, RELOAD_COMMAND, ReloadNotice, ReloadWatcher};

use std::path::PathBuf;

/// Error arming filesystem watches.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to create file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

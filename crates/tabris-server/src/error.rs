//! Server error types.

use std::net::SocketAddr;

use tabris_watch::WatchError;

/// Error starting or running the development server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Project must be a directory: {}", .0.display())]
    NotADirectory(std::path::PathBuf),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

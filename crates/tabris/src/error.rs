//! CLI error types.

use tabris_config::ConfigError;
use tabris_platform::PlatformError;
use tabris_server::ServerError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("{0}")]
    Platform(#[from] PlatformError),

    #[error("{0}")]
    Validation(String),
}

//! Error types for platform resolution.

use std::path::PathBuf;

/// Error during a single file download.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The server answered with a status other than 200.
    #[error("Unexpected status code {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },

    /// The connection ended before the declared content length arrived.
    #[error("Download incomplete: received {received} of {expected} bytes")]
    Incomplete {
        /// Declared content length.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    /// Reading the response or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// HTTP status code, for [`DownloadError::UnexpectedStatus`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status } => Some(*status),
            _ => None,
        }
    }
}

/// Error resolving a platform.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Download failed for a reason other than a rejected credential.
    #[error("Unable to download platform: {0}")]
    Download(#[source] DownloadError),

    /// Every offered credential was rejected.
    #[error("Unable to download platform: build key rejected {attempts} times")]
    CredentialRejected {
        /// Number of rejected attempts.
        attempts: u32,
    },

    /// The credential prompt failed.
    #[error("Unable to read build key: {0}")]
    Prompt(#[source] std::io::Error),

    /// The downloaded archive could not be unpacked.
    #[error("Unable to extract platform: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Installing the platform's own dependencies failed.
    #[error("Unable to install dependencies in {}: {message}", path.display())]
    Dependencies {
        /// Platform directory.
        path: PathBuf,
        /// Failure description.
        message: String,
    },

    /// `package.json` of the installed tabris module could not be read.
    #[error("Unable to read tabris version from {}: {message}", path.display())]
    VersionRead {
        /// Manifest path.
        path: PathBuf,
        /// Failure description.
        message: String,
    },

    /// The installed tabris version is not a valid semantic version.
    #[error("App uses invalid tabris version: {actual}")]
    InvalidVersion {
        /// Installed version string.
        actual: String,
    },

    /// The installed tabris version does not match the platform.
    #[error("App uses incompatible tabris version: {actual}, {required} required.")]
    IncompatibleVersion {
        /// Installed version string.
        actual: String,
        /// Required range, e.g. `3.6.x`.
        required: String,
    },

    /// The required version given by the caller is not a version.
    #[error("Invalid platform version: {0}")]
    InvalidRequiredVersion(String),

    /// Filesystem error in the platform cache.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

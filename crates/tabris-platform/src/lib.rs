//! Download and cache tabris build platforms.
//!
//! [`PlatformProvider`] resolves a platform name and version to a local
//! directory: an environment override, a cached copy under
//! `<data_dir>/platforms`, or a fresh download. Downloads go through
//! [`FileDownloader`], which streams to disk and reports
//! [`DownloadProgress`] per chunk. A download rejected with 401 asks the
//! [`CredentialPrompt`] for a new build key and tries again.
//!
//! # Example
//!
//! ```ignore
//! use tabris_platform::{NoPrompt, Platform, PlatformProvider};
//!
//! let provider = PlatformProvider::new(&config.platforms_resolved, Box::new(NoPrompt));
//! let resolved = provider.get_platform(&Platform::new("android", "3.6.0"))?;
//! println!("{}", resolved.path.display());
//! ```

mod archive;
mod credential;
mod deps;
mod download;
mod error;
mod provider;
mod transport;
mod version;

pub use credential::{Credential, CredentialPrompt};
pub use deps::{DependencyInstaller, NpmInstaller, needs_dependencies};
pub use download::{DownloadProgress, FileDownloader};
pub use error::{DownloadError, PlatformError};
pub use provider::{
    BUILD_KEY_ENV, BUILD_KEY_HEADER, NoPrompt, Platform, PlatformProvider, PlatformSource,
    ResolvedPlatform,
};
pub use transport::{DownloadRequest, HttpResponse, HttpTransport, UreqTransport};
pub use version::{installed_version, validate_installed_version};

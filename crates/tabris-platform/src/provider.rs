//! Platform provider.
//!
//! Resolves a platform `(name, version)` to a local directory. Resolution
//! order, first match wins:
//!
//! 1. `TABRIS_<NAME>_PLATFORM` names a path, returned as-is.
//! 2. `<data_dir>/platforms/<name>/<version>` exists.
//! 3. The platform is downloaded, unpacked into a staging directory next to
//!    the cache, and renamed into place.
//!
//! A failed resolution leaves the cache exactly as it was.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tabris_config::PlatformsConfig;
use tempfile::TempDir;

use crate::archive;
use crate::credential::{Credential, CredentialPrompt};
use crate::deps::{DependencyInstaller, NpmInstaller, needs_dependencies};
use crate::download::{DownloadProgress, FileDownloader};
use crate::error::{DownloadError, PlatformError};
use crate::transport::{DownloadRequest, HttpTransport, UreqTransport};

/// Header carrying the build key.
pub const BUILD_KEY_HEADER: &str = "X-Tabris-Build-Key";

/// Environment variable seeding the first build key.
pub const BUILD_KEY_ENV: &str = "TABRIS_BUILD_KEY";

const HTTP_UNAUTHORIZED: u16 = 401;

/// A platform to resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    /// Platform name, e.g. `android`.
    pub name: String,
    /// Platform version, e.g. `3.6.0`.
    pub version: String,
}

impl Platform {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Name of the variable that overrides this platform's location.
    pub fn override_var(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("TABRIS_{name}_PLATFORM")
    }
}

/// Where a resolved platform came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformSource {
    /// Taken from the environment override.
    Override,
    /// Found in the cache.
    Cached,
    /// Downloaded by this call.
    Fetched,
}

/// A resolved platform directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPlatform {
    pub path: PathBuf,
    pub source: PlatformSource,
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;
type ProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Resolves platforms, downloading them on a cache miss.
pub struct PlatformProvider {
    endpoint: String,
    platforms_dir: PathBuf,
    max_credential_attempts: Option<u32>,
    downloader: FileDownloader,
    prompt: Box<dyn CredentialPrompt>,
    installer: Box<dyn DependencyInstaller>,
    env: EnvLookup,
    progress: Option<ProgressCallback>,
    credential: Mutex<Option<Credential>>,
}

impl PlatformProvider {
    /// Create a provider using HTTPS, npm and the process environment.
    pub fn new(config: &PlatformsConfig, prompt: Box<dyn CredentialPrompt>) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            platforms_dir: config.platforms_dir(),
            max_credential_attempts: config.max_credential_attempts,
            downloader: FileDownloader::new(Arc::new(UreqTransport::new())),
            prompt,
            installer: Box::new(NpmInstaller),
            env: Box::new(|name| std::env::var(name).ok()),
            progress: None,
            credential: Mutex::new(None),
        }
    }

    /// Replace the HTTP transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.downloader = FileDownloader::new(transport);
        self
    }

    /// Replace the dependency installer.
    #[must_use]
    pub fn with_installer(mut self, installer: Box<dyn DependencyInstaller>) -> Self {
        self.installer = installer;
        self
    }

    /// Replace the environment lookup.
    #[must_use]
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Report download progress.
    #[must_use]
    pub fn with_progress(
        mut self,
        progress: impl Fn(&DownloadProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Root of the platform cache.
    pub fn platforms_dir(&self) -> &Path {
        &self.platforms_dir
    }

    /// Cache directory for `platform`.
    pub fn cache_path(&self, platform: &Platform) -> PathBuf {
        self.platforms_dir
            .join(&platform.name)
            .join(&platform.version)
    }

    /// Download URL for `platform`.
    pub fn download_url(&self, platform: &Platform) -> String {
        format!(
            "{}/api/v1/downloads/cli/{}/{}",
            self.endpoint, platform.version, platform.name
        )
    }

    /// Resolve `platform` to a directory.
    pub fn get_platform(&self, platform: &Platform) -> Result<ResolvedPlatform, PlatformError> {
        if let Some(path) = (self.env)(&platform.override_var()) {
            tracing::info!(name = %platform.name, path = %path, "Using platform override");
            return Ok(ResolvedPlatform {
                path: PathBuf::from(path),
                source: PlatformSource::Override,
            });
        }

        let target = self.cache_path(platform);
        if target.is_dir() {
            tracing::debug!(path = %target.display(), "Platform cache hit");
            return Ok(ResolvedPlatform {
                path: target,
                source: PlatformSource::Cached,
            });
        }

        let created = missing_dirs(&self.platforms_dir);
        fs::create_dir_all(&self.platforms_dir)?;
        if let Err(e) = self.fetch(platform, &target) {
            // Innermost first; stops at the first directory still in use.
            for dir in &created {
                if fs::remove_dir(dir).is_err() {
                    break;
                }
            }
            return Err(e);
        }

        tracing::info!(
            name = %platform.name,
            version = %platform.version,
            path = %target.display(),
            "Platform downloaded"
        );
        Ok(ResolvedPlatform {
            path: target,
            source: PlatformSource::Fetched,
        })
    }

    /// Download and install into `target`. The staging directory is gone
    /// when this returns.
    fn fetch(&self, platform: &Platform, target: &Path) -> Result<(), PlatformError> {
        let staging = self.download(platform)?;
        self.install(platform, &staging, target)
    }

    /// Download the archive into a fresh staging directory, re-prompting
    /// for the build key on every 401.
    fn download(&self, platform: &Platform) -> Result<TempDir, PlatformError> {
        let url = self.download_url(platform);
        let mut credential = self.initial_credential()?;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let staging = tempfile::Builder::new()
                .prefix(&format!(".{}-{}-", platform.name, platform.version))
                .tempdir_in(&self.platforms_dir)?;
            let archive = staging.path().join("platform.zip");
            let request = DownloadRequest::new(&url).header(BUILD_KEY_HEADER, credential.expose());

            tracing::info!(url = %url, attempt = attempts, "Downloading platform");
            let result = self.downloader.download_file(&request, &archive, |progress| {
                if let Some(report) = &self.progress {
                    report(&progress);
                }
            });

            match result {
                Ok(_) => {
                    *self.lock_credential() = Some(credential);
                    return Ok(staging);
                }
                Err(DownloadError::UnexpectedStatus {
                    status: HTTP_UNAUTHORIZED,
                }) => {
                    tracing::warn!(attempt = attempts, "Build key rejected");
                    *self.lock_credential() = None;
                    if self
                        .max_credential_attempts
                        .is_some_and(|max| attempts >= max)
                    {
                        return Err(PlatformError::CredentialRejected { attempts });
                    }
                    credential = self.prompt_credential()?;
                }
                Err(e) => return Err(PlatformError::Download(e)),
            }
        }
    }

    /// Unpack the staged archive and move it into the cache.
    fn install(&self, platform: &Platform, staging: &TempDir, target: &Path) -> Result<(), PlatformError> {
        let unpacked = staging.path().join("unpacked");
        archive::extract(&staging.path().join("platform.zip"), &unpacked)?;
        let root = archive::content_root(&unpacked)?;

        if needs_dependencies(&root) {
            self.installer.ensure(&root)?;
        }

        let parent = self.platforms_dir.join(&platform.name);
        fs::create_dir_all(&parent)?;
        match fs::rename(&root, target) {
            Ok(()) => Ok(()),
            // Lost a race against a concurrent resolution of the same key.
            Err(_) if target.is_dir() => Ok(()),
            Err(e) => {
                // Only succeeds if the directory is still empty.
                let _ = fs::remove_dir(&parent);
                Err(e.into())
            }
        }
    }

    /// Held key, else `TABRIS_BUILD_KEY`, else the prompt.
    fn initial_credential(&self) -> Result<Credential, PlatformError> {
        if let Some(credential) = self.lock_credential().clone() {
            return Ok(credential);
        }
        if let Some(key) = (self.env)(BUILD_KEY_ENV).filter(|key| !key.is_empty()) {
            return Ok(Credential::new(key));
        }
        self.prompt_credential()
    }

    fn prompt_credential(&self) -> Result<Credential, PlatformError> {
        self.prompt
            .prompt_credential()
            .map_err(PlatformError::Prompt)
    }

    fn lock_credential(&self) -> MutexGuard<'_, Option<Credential>> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PlatformProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformProvider")
            .field("endpoint", &self.endpoint)
            .field("platforms_dir", &self.platforms_dir)
            .field("max_credential_attempts", &self.max_credential_attempts)
            .finish_non_exhaustive()
    }
}

/// Directories `create_dir_all(dir)` would create, innermost first.
fn missing_dirs(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|path| !path.as_os_str().is_empty() && !path.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Prompt that always fails, for non-interactive use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn prompt_credential(&self) -> io::Result<Credential> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no build key available, set {BUILD_KEY_ENV}"),
        ))
    }
}

//! Dependency materialization for unpacked platforms.

use std::path::Path;
use std::process::Command;

use crate::error::PlatformError;

/// Installs a package's own dependencies.
pub trait DependencyInstaller: Send + Sync {
    /// Install dependencies of the package in `dir`. Must be idempotent.
    fn ensure(&self, dir: &Path) -> Result<(), PlatformError>;
}

/// Returns `true` if `dir` is a package whose dependencies are missing.
pub fn needs_dependencies(dir: &Path) -> bool {
    dir.join("package.json").is_file() && !dir.join("node_modules").exists()
}

/// Runs `npm install --production`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NpmInstaller;

impl NpmInstaller {
    fn program() -> &'static str {
        if cfg!(windows) { "npm.cmd" } else { "npm" }
    }
}

impl DependencyInstaller for NpmInstaller {
    fn ensure(&self, dir: &Path) -> Result<(), PlatformError> {
        tracing::info!(dir = %dir.display(), "Installing platform dependencies");
        let output = Command::new(Self::program())
            .args(["install", "--production"])
            .current_dir(dir)
            .output()
            .map_err(|e| PlatformError::Dependencies {
                path: dir.to_path_buf(),
                message: format!("failed to run npm: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlatformError::Dependencies {
                path: dir.to_path_buf(),
                message: format!("npm exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

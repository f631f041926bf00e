//! Installed tabris version checks.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::PlatformError;

#[derive(Deserialize)]
struct PackageManifest {
    version: Option<String>,
}

/// Version of the `tabris` module installed in the app at `app_dir`.
///
/// Reads `node_modules/tabris/package.json`.
pub fn installed_version(app_dir: &Path) -> Result<String, PlatformError> {
    let path = app_dir
        .join("node_modules")
        .join("tabris")
        .join("package.json");
    let read_error = |message: String| PlatformError::VersionRead {
        path: path.clone(),
        message,
    };

    let content = fs::read_to_string(&path).map_err(|e| read_error(e.to_string()))?;
    let manifest: PackageManifest =
        serde_json::from_str(&content).map_err(|e| read_error(e.to_string()))?;
    manifest
        .version
        .ok_or_else(|| read_error("missing \"version\" field".to_owned()))
}

/// Check that `actual` is a valid version with the same major and minor
/// as `required`.
pub fn validate_installed_version(actual: &str, required: &str) -> Result<(), PlatformError> {
    let Some(installed) = Version::parse_strict(actual) else {
        return Err(PlatformError::InvalidVersion {
            actual: actual.to_owned(),
        });
    };
    let wanted = Version::parse_loose(required)
        .ok_or_else(|| PlatformError::InvalidRequiredVersion(required.to_owned()))?;

    if installed.major != wanted.major || installed.minor != wanted.minor {
        return Err(PlatformError::IncompatibleVersion {
            actual: actual.to_owned(),
            required: format!("{}.{}.x", wanted.major, wanted.minor),
        });
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct Version {
    major: u64,
    minor: u64,
}

impl Version {
    /// `MAJOR.MINOR.PATCH` with optional `-pre` and `+build` suffixes.
    fn parse_strict(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let core = s.split_once('+').map_or(s, |(core, _)| core);
        let (core, pre) = match core.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (core, None),
        };
        if pre.is_some_and(|pre| pre.is_empty() || pre.split('.').any(str::is_empty)) {
            return None;
        }

        let mut parts = core.split('.');
        let major = numeric(parts.next()?)?;
        let minor = numeric(parts.next()?)?;
        numeric(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor })
    }

    /// Accepts `MAJOR[.MINOR[.PATCH]]`, ignoring suffixes.
    fn parse_loose(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let core = s.split(['-', '+']).next()?;
        let mut parts = core.split('.');
        let major = numeric(parts.next()?)?;
        let minor = match parts.next() {
            Some(part) => numeric(part)?,
            None => 0,
        };
        Some(Self { major, minor })
    }
}

/// Non-negative integer without leading zeros.
fn numeric(part: &str) -> Option<u64> {
    if part.is_empty()
        || !part.bytes().all(|b| b.is_ascii_digit())
        || (part.len() > 1 && part.starts_with('0'))
    {
        return None;
    }
    part.parse().ok()
}

//! Platform archive unpacking.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::PlatformError;

/// Extract the zip file at `archive` into `destination`.
///
/// Entries with paths escaping `destination` are rejected by `zip`.
pub(crate) fn extract(archive: &Path, destination: &Path) -> Result<(), PlatformError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(destination)?;
    zip.extract(destination)?;
    Ok(())
}

/// Root of the unpacked content.
///
/// Platform archives wrap everything in one top-level directory
/// (`tabris-android/...`); that directory is the root. Otherwise `dir`
/// itself is.
pub(crate) fn content_root(dir: &Path) -> Result<PathBuf, PlatformError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    if entries.len() == 1
        && entries[0].file_type()?.is_dir()
        && let Some(entry) = entries.pop()
    {
        return Ok(entry.path());
    }
    Ok(dir.to_path_buf())
}

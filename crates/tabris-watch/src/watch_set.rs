//! Set of paths delivered to the device.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Paths in use by the device and the directories watched on their behalf.
///
/// Files are watched through their parent directory so that
/// write-to-temp-then-rename saves are seen. One watch is armed per
/// directory no matter how many of its files are in use.
#[derive(Debug, Default)]
pub(crate) struct WatchSet {
    files: HashSet<PathBuf>,
    dirs: HashSet<PathBuf>,
    armed: HashSet<PathBuf>,
}

impl WatchSet {
    /// Mark `path` as in use.
    ///
    /// Returns the directory that needs a watch, or `None` if one is
    /// already armed for it.
    pub(crate) fn insert(&mut self, path: PathBuf, is_dir: bool) -> Option<PathBuf> {
        let watch_dir = if is_dir {
            self.dirs.insert(path.clone());
            path
        } else {
            let parent = path.parent().map(Path::to_path_buf)?;
            self.files.insert(path);
            parent
        };

        if self.armed.contains(&watch_dir) {
            None
        } else {
            Some(watch_dir)
        }
    }

    /// Record that a watch is now armed on `dir`.
    pub(crate) fn arm(&mut self, dir: PathBuf) {
        self.armed.insert(dir);
    }

    /// Returns `true` if a change to `path` concerns the device.
    ///
    /// Direct children of an observed directory count as in use.
    pub(crate) fn contains(&self, path: &Path) -> bool {
        self.files.contains(path) || path.parent().is_some_and(|dir| self.dirs.contains(dir))
    }

    pub(crate) fn is_armed(&self, dir: &Path) -> bool {
        self.armed.contains(dir)
    }

    pub(crate) fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Forget everything; returns the directories that were armed.
    pub(crate) fn clear(&mut self) -> Vec<PathBuf> {
        self.files.clear();
        self.dirs.clear();
        self.armed.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_arms_parent_once() {
        let mut set = WatchSet::default();

        let dir = set.insert(PathBuf::from("/app/src/a.js"), false);
        assert_eq!(dir, Some(PathBuf::from("/app/src")));
        set.arm(PathBuf::from("/app/src"));

        assert_eq!(set.insert(PathBuf::from("/app/src/a.js"), false), None);
        assert_eq!(set.insert(PathBuf::from("/app/src/b.js"), false), None);
        assert_eq!(set.armed_count(), 1);
    }

    #[test]
    fn test_contains_only_observed_files() {
        let mut set = WatchSet::default();
        set.insert(PathBuf::from("/app/src/a.js"), false);

        assert!(set.contains(Path::new("/app/src/a.js")));
        assert!(!set.contains(Path::new("/app/src/b.js")));
        assert!(!set.contains(Path::new("/app/src")));
    }

    #[test]
    fn test_directory_covers_direct_children() {
        let mut set = WatchSet::default();
        let dir = set.insert(PathBuf::from("/app/lib"), true);
        assert_eq!(dir, Some(PathBuf::from("/app/lib")));

        assert!(set.contains(Path::new("/app/lib/util.js")));
        assert!(!set.contains(Path::new("/app/lib/nested/deep.js")));
    }

    #[test]
    fn test_clear_returns_armed_dirs() {
        let mut set = WatchSet::default();
        set.insert(PathBuf::from("/app/a.js"), false);
        set.arm(PathBuf::from("/app"));

        assert_eq!(set.clear(), vec![PathBuf::from("/app")]);
        assert_eq!(set.armed_count(), 0);
        assert!(!set.contains(Path::new("/app/a.js")));
    }
}

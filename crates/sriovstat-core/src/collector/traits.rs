//! Filesystem seam between the collector and sysfs.
//!
//! Everything the collector learns about PCI topology comes through the
//! `FileSystem` trait, so discovery and readers run unchanged against the real
//! `/sys` tree (`RealFs`) or an in-memory one (`MockFs`).
//!
//! Sysfs models virtual functions as symbolic links, so the trait exposes link
//! inspection separately from content reads: `read_to_string` follows links,
//! `is_symlink` and `read_link` never do.

use std::io;
use std::path::{Path, PathBuf};

/// Read-only view of a sysfs-like tree.
pub trait FileSystem: Send + Sync {
    /// Reads a whole attribute file, following symlinks.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Returns `true` if `path` resolves to a file or directory.
    fn exists(&self, path: &Path) -> bool;

    /// Lists the children of a directory as full paths, in no particular order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns `true` if the final component of `path` is a symbolic link.
    ///
    /// Never follows the link itself; a missing path is not a symlink.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Returns the raw target of a symbolic link.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Lists entries of `dir` whose file name starts with `prefix`.
    ///
    /// Equivalent to the shell glob `dir/prefix*`. Results are sorted so that
    /// callers see a stable order regardless of the underlying implementation.
    fn glob_prefix(&self, dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
        let mut matches: Vec<PathBuf> = self
            .read_dir(dir)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .collect();
        matches.sort();
        Ok(matches)
    }
}

/// `FileSystem` over the host's `/sys`, backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_fs_reads_attribute_files() {
        let dir = tempfile::tempdir().unwrap();
        let dev = dir.path().join("0000:1d:00.0");
        std::fs::create_dir(&dev).unwrap();
        std::fs::write(dev.join("class"), "0x020000\n").unwrap();

        let fs = RealFs::new();
        assert_eq!(fs.read_to_string(&dev.join("class")).unwrap(), "0x020000\n");
        assert!(fs.exists(&dev));
        assert!(fs.exists(&dev.join("class")));
        assert!(!fs.exists(&dev.join("sriov_totalvfs")));
        assert!(fs.read_to_string(&dev.join("sriov_totalvfs")).is_err());
        assert_eq!(fs.read_dir(&dev).unwrap(), vec![dev.join("class")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_real_fs_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let pf = dir.path().join("0000:1d:00.0");
        std::fs::create_dir(&pf).unwrap();
        std::fs::write(pf.join("numa_node"), "0\n").unwrap();
        std::os::unix::fs::symlink("../0000:1d:01.0", pf.join("virtfn0")).unwrap();

        let fs = RealFs::new();
        assert!(fs.is_symlink(&pf.join("virtfn0")));
        assert!(!fs.is_symlink(&pf.join("numa_node")));
        assert!(!fs.is_symlink(&pf.join("missing")));
        assert_eq!(
            fs.read_link(&pf.join("virtfn0")).unwrap(),
            PathBuf::from("../0000:1d:01.0")
        );
        assert!(fs.read_link(&pf.join("numa_node")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_real_fs_glob_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("../a", dir.path().join("virtfn1")).unwrap();
        std::os::unix::fs::symlink("../b", dir.path().join("virtfn0")).unwrap();
        std::fs::write(dir.path().join("vendor"), "0x8086").unwrap();

        let fs = RealFs::new();
        let entries = fs.glob_prefix(dir.path(), "virtfn").unwrap();
        assert_eq!(
            entries,
            vec![dir.path().join("virtfn0"), dir.path().join("virtfn1")]
        );
    }
}

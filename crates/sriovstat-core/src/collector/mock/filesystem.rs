//! In-memory mock filesystem for testing collectors without real `/sys`.
//!
//! Symbolic links are first-class entries: they show up in `read_dir`, report
//! `true` from `is_symlink`, and are followed when they appear in the middle of
//! a path or when their target is read. A link whose target is not a known
//! mock file cannot be read, the same as a dangling link on a real system.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Upper bound on link hops while resolving one path.
const MAX_LINK_HOPS: usize = 40;

/// Sysfs stand-in built from attribute files, directories and links.
///
/// Lets collector tests describe hosts with SR-IOV hardware that the build
/// machine does not have.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Attribute contents keyed by absolute path.
    files: HashMap<PathBuf, String>,
    /// Known directories, implicit parents included.
    directories: HashSet<PathBuf>,
    /// Map from link path to its raw target.
    symlinks: HashMap<PathBuf, PathBuf>,
}

impl MockFs {
    /// An empty tree with no root entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an attribute file, creating any missing parents.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Creates a directory and its parents.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds a symbolic link at `path` pointing to `target`.
    ///
    /// Relative targets are resolved against the link's parent directory,
    /// like `ln -s` does. The target does not need to exist.
    pub fn add_symlink(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.symlinks.insert(path, target.as_ref().to_path_buf());
    }

    /// Copies a real directory tree into memory under `virtual_root`.
    ///
    /// Symlinks are captured as links, not followed. This is useful for
    /// regression tests with sysfs trees copied from real hosts
    /// (`cp -a /sys/bus/pci/devices/0000:3b:00.0 ...`).
    pub fn from_snapshot(dir: &Path, virtual_root: &Path) -> io::Result<Self> {
        let mut fs = Self::new();
        copy_tree(&mut fs, dir, virtual_root)?;
        Ok(fs)
    }

    fn add_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.directories.insert(ancestor.to_path_buf());
        }
    }

    /// Resolves every symlink component of `path`, including the last one.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = PathBuf::new();
        let mut hops = 0;

        for component in path.components() {
            resolved.push(component.as_os_str());
            while let Some(target) = self.symlinks.get(&resolved) {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(io::Error::other(format!(
                        "too many levels of symbolic links: {:?}",
                        path
                    )));
                }
                let base = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                resolved = normalize(&base.join(target));
            }
        }

        Ok(normalize(&resolved))
    }

    /// Resolves symlinks in the parent of `path` but leaves the final component alone.
    fn resolve_parent(&self, path: &Path) -> io::Result<PathBuf> {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
                Ok(self.resolve(parent)?.join(name))
            }
            _ => Ok(path.to_path_buf()),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn not_found(kind: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found: {:?}", kind, path),
    )
}

fn copy_tree(fs: &mut MockFs, src: &Path, dst: &Path) -> io::Result<()> {
    fs.add_dir(dst);

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let kind = entry.file_type()?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if kind.is_symlink() {
            fs.add_symlink(&to, std::fs::read_link(&from)?);
        } else if kind.is_dir() {
            copy_tree(fs, &from, &to)?;
        } else if kind.is_file() {
            // Write-only and binary attributes are left out
            match std::fs::read_to_string(&from) {
                Ok(content) => fs.add_file(&to, content),
                Err(e) => tracing::trace!(path = ?from, error = %e, "skipping unreadable attribute"),
            }
        }
    }
    Ok(())
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let resolved = self.resolve(path)?;
        match self.files.get(&resolved) {
            Some(content) => Ok(content.clone()),
            None if self.directories.contains(&resolved) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("is a directory: {:?}", path),
            )),
            None => Err(not_found("file", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_ok_and(|resolved| {
            self.files.contains_key(&resolved) || self.directories.contains(&resolved)
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let resolved = self.resolve(path)?;
        if !self.directories.contains(&resolved) {
            return Err(not_found("directory", path));
        }

        // Children of the resolved directory, reported under the requested path
        let names: HashSet<_> = self
            .files
            .keys()
            .chain(self.directories.iter())
            .chain(self.symlinks.keys())
            .filter(|child| *child != &resolved && child.parent() == Some(resolved.as_path()))
            .filter_map(|child| child.file_name())
            .collect();

        Ok(names.into_iter().map(|name| path.join(name)).collect())
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.resolve_parent(path)
            .is_ok_and(|link| self.symlinks.contains_key(&link))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let link = self.resolve_parent(path)?;
        self.symlinks.get(&link).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a symbolic link: {:?}", path),
            )
        })
    }
}

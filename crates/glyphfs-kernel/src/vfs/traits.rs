//! Core VFS traits and types.

use crate::error::FsResult;

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// A directory entry as reported by `list_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    /// Kind of entry.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }

    /// Create a new file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
        }
    }
}

/// The contract every backing filesystem implements.
///
/// Paths are absolute and relative to the driver's own root: a driver mounted
/// at `/fat` sees `/fat/HELLO.TXT` as `/HELLO.TXT`. Each driver's constructor
/// plays the role of `init`; the driver value is its own context.
pub trait Driver {
    /// Short driver name for mount listings.
    fn name(&self) -> &'static str;

    /// Returns true if every mutating operation fails with EROFS.
    fn read_only(&self) -> bool;

    /// Create a directory. Idempotent on an existing directory.
    fn mkdir(&mut self, path: &str) -> FsResult<()>;

    /// Write (or with `append`, extend) a file, creating it if needed.
    fn write_file(&mut self, path: &str, data: &[u8], append: bool) -> FsResult<()>;

    /// Copy up to `buf.len()` bytes of a file into `buf`.
    ///
    /// Returns the file's true size, which may exceed `buf.len()`; callers
    /// detect truncation by comparing the two.
    fn read_file(&mut self, path: &str, buf: &mut [u8]) -> FsResult<usize>;

    /// Borrow a file's full contents.
    ///
    /// The slice stays valid until the next call on this driver.
    fn read_file_ref(&mut self, path: &str) -> FsResult<&[u8]>;

    /// Remove a file or directory. Non-empty directories need `recursive`.
    fn remove(&mut self, path: &str, recursive: bool) -> FsResult<()>;

    /// Kind of the entry at `path`, or `None` if nothing is there.
    fn file_type(&mut self, path: &str) -> Option<EntryKind>;

    /// Check if a path exists.
    fn exists(&mut self, path: &str) -> bool {
        self.file_type(path).is_some()
    }

    /// Call `visit` once per entry of the directory at `path`.
    fn list_dir(&mut self, path: &str, visit: &mut dyn FnMut(&DirEntry)) -> FsResult<()>;
}

/// Split a path into normalised components.
///
/// Leading/trailing and repeated slashes are ignored, `.` is dropped and `..`
/// pops the previous component (never above the root).
pub fn path_components(path: &str) -> Vec<&str> {
    let mut components = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            name => components.push(name),
        }
    }
    components
}

/// Render components back into an absolute path.
pub fn join_components(components: &[&str]) -> String {
    if components.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for component in components {
        out.push('/');
        out.push_str(component);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_like_a_shell() {
        assert_eq!(path_components("/a//b/./c/"), vec!["a", "b", "c"]);
        assert_eq!(path_components("/a/b/../c"), vec!["a", "c"]);
        assert_eq!(path_components("/../.."), Vec::<&str>::new());
        assert_eq!(join_components(&path_components("a/b/")), "/a/b");
        assert_eq!(join_components(&[]), "/");
    }
}

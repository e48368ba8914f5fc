//! VFS mount table.
//!
//! Routes filesystem operations to the driver mounted at the longest
//! component-wise prefix of the path.

use super::traits::{DirEntry, Driver, EntryKind, join_components, path_components};
use crate::error::{FsError, FsResult};

/// Information about a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// The mount path (e.g., "/fat").
    pub path: String,
    /// Driver name, e.g. "ramfs".
    pub driver: &'static str,
    /// Whether the driver refuses writes.
    pub read_only: bool,
}

struct MountEntry {
    mount_point: String,
    driver: Box<dyn Driver>,
}

impl MountEntry {
    fn depth(&self) -> usize {
        path_components(&self.mount_point).len()
    }
}

/// Routes filesystem operations to mounted drivers.
///
/// Mount points are matched by longest prefix on whole components: with `/`
/// and `/fat` mounted, `/fat/HELLO.TXT` goes to `/fat` while `/fatty` goes to
/// `/`. The driver sees the remainder of the path re-rooted at `/`.
#[derive(Default)]
pub struct Vfs {
    /// In mount order.
    mounts: Vec<MountEntry>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field(
                "mounts",
                &self.mounts.iter().map(|m| &m.mount_point).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Fails every entry point when the crate is built without the `vfs` feature.
fn gate() -> FsResult<()> {
    if cfg!(feature = "vfs") {
        Ok(())
    } else {
        Err(FsError::NotSupported("VFS support is compiled out".into()))
    }
}

/// Normalise an absolute path, rejecting relative ones.
fn absolute(path: &str) -> FsResult<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidArgument(format!(
            "path must be absolute: {:?}",
            path
        )));
    }
    Ok(path_components(path))
}

impl Vfs {
    pub fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    /// Mount a driver at the given path.
    ///
    /// If a driver is already mounted at this path, it is replaced.
    pub fn mount(&mut self, path: &str, driver: impl Driver + 'static) -> FsResult<()> {
        self.mount_boxed(path, Box::new(driver))
    }

    /// Mount an already boxed driver.
    pub fn mount_boxed(&mut self, path: &str, driver: Box<dyn Driver>) -> FsResult<()> {
        gate()?;
        let mount_point = join_components(&absolute(path)?);
        tracing::debug!(mount = %mount_point, driver = driver.name(), "mount");

        match self.mounts.iter_mut().find(|m| m.mount_point == mount_point) {
            Some(existing) => {
                tracing::warn!(
                    mount = %mount_point,
                    previous = existing.driver.name(),
                    "replacing existing mount"
                );
                existing.driver = driver;
            }
            None => {
                self.mounts.try_reserve(1)?;
                self.mounts.push(MountEntry {
                    mount_point,
                    driver,
                });
            }
        }
        Ok(())
    }

    /// Unmount the driver at the given path and hand it back.
    pub fn unmount(&mut self, path: &str) -> FsResult<Box<dyn Driver>> {
        gate()?;
        let mount_point = join_components(&absolute(path)?);
        let index = self
            .mounts
            .iter()
            .position(|m| m.mount_point == mount_point)
            .ok_or_else(|| FsError::NotFound(format!("nothing mounted at {}", mount_point)))?;
        tracing::debug!(mount = %mount_point, "unmount");
        Ok(self.mounts.remove(index).driver)
    }

    /// List all current mounts in mount order.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .iter()
            .map(|m| MountInfo {
                path: m.mount_point.clone(),
                driver: m.driver.name(),
                read_only: m.driver.read_only(),
            })
            .collect()
    }

    /// Find the driver for `path` and the path relative to its mount point.
    pub fn resolve(&mut self, path: &str) -> FsResult<(&mut dyn Driver, String)> {
        gate()?;
        let components = absolute(path)?;

        let mut best: Option<(usize, usize)> = None;
        for (index, entry) in self.mounts.iter().enumerate() {
            let mount = path_components(&entry.mount_point);
            if components.starts_with(&mount) && best.is_none_or(|(_, depth)| mount.len() > depth)
            {
                best = Some((index, mount.len()));
            }
        }

        let (index, depth) =
            best.ok_or_else(|| FsError::NotFound(format!("no mount point for path: {}", path)))?;
        let relative = join_components(&components[depth..]);
        let entry = &mut self.mounts[index];
        tracing::trace!(path, mount = %entry.mount_point, relative = %relative, "resolve");
        Ok((entry.driver.as_mut(), relative))
    }

    pub fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let (driver, relative) = self.resolve(path)?;
        driver.mkdir(&relative)
    }

    /// Create or overwrite a file.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let (driver, relative) = self.resolve(path)?;
        driver.write_file(&relative, data, false)
    }

    /// Extend a file, creating it if needed.
    pub fn append_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let (driver, relative) = self.resolve(path)?;
        driver.write_file(&relative, data, true)
    }

    /// Copy up to `buf.len()` bytes into `buf`; returns the file's true size.
    pub fn read_file(&mut self, path: &str, buf: &mut [u8]) -> FsResult<usize> {
        let (driver, relative) = self.resolve(path)?;
        driver.read_file(&relative, buf)
    }

    /// Borrow a file's contents; valid until the next call on this VFS.
    pub fn read_file_ref(&mut self, path: &str) -> FsResult<&[u8]> {
        let (driver, relative) = self.resolve(path)?;
        driver.read_file_ref(&relative)
    }

    /// Read a whole file into an owned buffer.
    pub fn read_to_vec(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let contents = self.read_file_ref(path)?;
        let mut out = Vec::new();
        out.try_reserve_exact(contents.len())?;
        out.extend_from_slice(contents);
        Ok(out)
    }

    pub fn remove(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        let (driver, relative) = self.resolve(path)?;
        driver.remove(&relative, recursive)
    }

    pub fn exists(&mut self, path: &str) -> bool {
        self.file_type(path).is_some()
    }

    pub fn file_type(&mut self, path: &str) -> Option<EntryKind> {
        if let Ok((driver, relative)) = self.resolve(path) {
            if let Some(kind) = driver.file_type(&relative) {
                return Some(kind);
            }
        }
        // Directories that only exist because something is mounted below.
        if gate().is_ok() && !self.mounted_children(path).is_empty() {
            return Some(EntryKind::Directory);
        }
        None
    }

    /// Call `visit` for each entry of the directory at `path`.
    ///
    /// Mount points directly below `path` are listed as directories even when
    /// the parent driver has no entry for them.
    pub fn list_dir(&mut self, path: &str, visit: &mut dyn FnMut(&DirEntry)) -> FsResult<()> {
        gate()?;
        let mounted = self.mounted_children(path);
        let mut seen = Vec::new();

        match self.resolve(path) {
            Ok((driver, relative)) => driver.list_dir(&relative, &mut |entry| {
                seen.push(entry.name.clone());
                visit(entry);
            })?,
            Err(FsError::NotFound(_)) if !mounted.is_empty() => {}
            Err(e) => return Err(e),
        }

        for name in mounted {
            if !seen.contains(&name) {
                visit(&DirEntry::directory(name));
            }
        }
        Ok(())
    }

    /// Collect a directory listing.
    pub fn list(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        self.list_dir(path, &mut |entry| entries.push(entry.clone()))?;
        Ok(entries)
    }

    /// Names of mount points exactly one level below `path`.
    fn mounted_children(&self, path: &str) -> Vec<String> {
        let Ok(parent) = absolute(path) else {
            return Vec::new();
        };
        self.mounts
            .iter()
            .filter(|m| m.depth() == parent.len() + 1)
            .filter_map(|m| {
                let mount = path_components(&m.mount_point);
                match mount.split_last() {
                    Some((name, prefix)) if prefix == parent.as_slice() => Some(name.to_string()),
                    _ => None,
                }
            })
            .collect()
    }
}

//! Overlays: logical paths in, canonical VFS paths out.
//!
//! An overlay owns a backing root and a codec. Every operation parses the
//! logical path, renders it under the root, makes sure the parent
//! directories exist and then hands the canonical path to the [`Vfs`].
//!
//! ```text
//! [🕉️]music[🕉️]chants[🕉️]108.mp3  →  /ucfs/U+1F549/music/chants/108.mp3
//! ```

use std::marker::PhantomData;

use crate::codec::{LogicalPath, PxfsPath, UcfsPath};
use crate::error::{FsError, FsResult};
use crate::vfs::{Vfs, join_components, path_components};

/// Longest accepted backing root, in bytes.
pub const MAX_ROOT_LEN: usize = 128;

/// Default bound on a rendered canonical path, in bytes.
pub const DEFAULT_MAX_PATH_LEN: usize = 512;

/// Translator from one logical path grammar onto the VFS.
#[derive(Debug, Clone)]
pub struct Overlay<P: LogicalPath> {
    root: String,
    max_path_len: usize,
    codec: PhantomData<fn() -> P>,
}

pub type UcfsOverlay = Overlay<UcfsPath>;
pub type PxfsOverlay = Overlay<PxfsPath>;

impl<P: LogicalPath> Default for Overlay<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_root(root: &str) -> FsResult<String> {
    if root.len() > MAX_ROOT_LEN {
        return Err(FsError::NameTooLong(format!(
            "overlay root is {} bytes, limit {}",
            root.len(),
            MAX_ROOT_LEN
        )));
    }
    if !root.starts_with('/') || root.contains('\0') {
        return Err(FsError::InvalidArgument(format!(
            "overlay root must be an absolute path: {:?}",
            root
        )));
    }
    let raw: Vec<&str> = root.split('/').filter(|s| !s.is_empty()).collect();
    if raw.iter().any(|s| *s == "." || *s == "..") {
        return Err(FsError::InvalidArgument(format!(
            "overlay root may not contain . or ..: {:?}",
            root
        )));
    }
    Ok(join_components(&raw))
}

impl<P: LogicalPath> Overlay<P> {
    /// Overlay on the codec's default root.
    pub fn new() -> Self {
        Self {
            root: P::DEFAULT_ROOT.to_string(),
            max_path_len: DEFAULT_MAX_PATH_LEN,
            codec: PhantomData,
        }
    }

    pub fn with_root(root: &str) -> FsResult<Self> {
        let mut overlay = Self::new();
        overlay.set_root(root)?;
        Ok(overlay)
    }

    /// Bound rendered canonical paths to `max` bytes.
    pub fn with_max_path_len(mut self, max: usize) -> Self {
        self.max_path_len = max;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn max_path_len(&self) -> usize {
        self.max_path_len
    }

    /// Replace the backing root. The root is left unchanged on error.
    pub fn set_root(&mut self, root: &str) -> FsResult<()> {
        self.root = validate_root(root)?;
        tracing::debug!(scheme = P::SCHEME, root = %self.root, "overlay root set");
        Ok(())
    }

    /// Canonical VFS path for a logical path.
    pub fn canonical_path(&self, logical: &str) -> FsResult<String> {
        let parsed = P::parse(logical)?;
        let canonical = parsed.canonicalize(&self.root);
        if canonical.len() > self.max_path_len {
            return Err(FsError::NoSpace(format!(
                "canonical {} path is {} bytes, limit {}",
                P::SCHEME,
                canonical.len(),
                self.max_path_len
            )));
        }
        tracing::trace!(scheme = P::SCHEME, logical, canonical = %canonical, "translate");
        Ok(canonical)
    }

    /// `mkdir` every directory above `canonical`.
    pub fn ensure_directories(&self, vfs: &mut Vfs, canonical: &str) -> FsResult<()> {
        let components = path_components(canonical);
        for depth in 1..components.len() {
            vfs.mkdir(&join_components(&components[..depth]))?;
        }
        Ok(())
    }

    fn prepare(&self, vfs: &mut Vfs, logical: &str) -> FsResult<String> {
        let canonical = self.canonical_path(logical)?;
        self.ensure_directories(vfs, &canonical)?;
        Ok(canonical)
    }

    /// Create or overwrite the file named by `logical`.
    pub fn write_file(&self, vfs: &mut Vfs, logical: &str, data: &[u8]) -> FsResult<()> {
        let canonical = self.prepare(vfs, logical)?;
        vfs.write_file(&canonical, data)
    }

    pub fn append_file(&self, vfs: &mut Vfs, logical: &str, data: &[u8]) -> FsResult<()> {
        let canonical = self.prepare(vfs, logical)?;
        vfs.append_file(&canonical, data)
    }

    /// Copy up to `buf.len()` bytes; returns the file's true size.
    pub fn read_file(&self, vfs: &mut Vfs, logical: &str, buf: &mut [u8]) -> FsResult<usize> {
        let canonical = self.prepare(vfs, logical)?;
        vfs.read_file(&canonical, buf)
    }

    pub fn read_to_vec(&self, vfs: &mut Vfs, logical: &str) -> FsResult<Vec<u8>> {
        let canonical = self.prepare(vfs, logical)?;
        vfs.read_to_vec(&canonical)
    }

    /// False on any failure, including a malformed logical path.
    pub fn exists(&self, vfs: &mut Vfs, logical: &str) -> bool {
        self.prepare(vfs, logical)
            .map(|canonical| vfs.exists(&canonical))
            .unwrap_or(false)
    }

    /// Logical form of a canonical path for display; verbatim if it is not ours.
    pub fn prompt_form(&self, canonical: &str) -> String {
        P::decode(canonical, &self.root)
    }
}

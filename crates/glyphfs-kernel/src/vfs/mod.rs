//! Virtual Filesystem (VFS) for glyphfs.
//!
//! The VFS provides a unified interface over multiple drivers:
//!
//! - **Ramfs**: In-memory tree (for `/`, overlays, tests)
//! - **Fat32Volume**: Read-only FAT32 volume on a block device
//! - **Vfs**: Routes paths to mounted drivers
//!
//! # Design
//!
//! The runtime owns `/` in its VFS. Drivers are mounted at paths:
//!
//! ```text
//! /                      # Ramfs
//! ├── /ucfs/U+1F30D/     # UCFS overlay storage (on the root ramfs)
//! ├── /pxfs/FF0000/      # PXFS overlay storage (on the root ramfs)
//! └── /fat/              # Fat32Volume (ro)
//! ```
//!
//! The router finds the longest matching mount point and delegates with the
//! mount prefix stripped.

pub mod fat32;
mod ramfs;
mod router;
mod traits;

pub use fat32::Fat32Volume;
pub use ramfs::{NodeId, Ramfs};
pub use router::{MountInfo, Vfs};
pub use traits::{DirEntry, Driver, EntryKind, join_components, path_components};

//! glyphfs-kernel: the core of glyphfs.
//!
//! This crate provides:
//!
//! - **Block devices**: a fixed-size registry of named block stores, ramdisk-backed
//! - **Codecs**: UCFS (`[🌍]a[🌍]b`) and PXFS (`{255,0,0}a{255,0,0}b`) logical paths
//! - **VFS**: a mount table routing paths to drivers
//! - **Drivers**: an in-memory tree (`Ramfs`) and a read-only FAT32 reader
//! - **Overlays**: logical path → canonical VFS path translators
//! - **Runtime**: all of the above assembled from a TOML config
//!
//! Every operation fails with an [`FsError`] that maps onto a POSIX-style
//! [`Errno`].

pub mod blockdev;
pub mod codec;
pub mod config;
pub mod error;
pub mod overlay;
pub mod runtime;
pub mod vfs;

pub use blockdev::{BlockDevice, BlockDeviceRegistry, BlockOps, DeviceHandle, Ramdisk};
pub use codec::{LogicalPath, PxfsPath, Rgb, UcfsPath};
pub use config::RuntimeConfig;
pub use error::{Errno, FsError, FsResult};
pub use overlay::{Overlay, PxfsOverlay, UcfsOverlay};
pub use runtime::Runtime;
pub use vfs::{DirEntry, Driver, EntryKind, Fat32Volume, MountInfo, Ramfs, Vfs};

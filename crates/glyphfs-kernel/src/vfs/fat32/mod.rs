//! Read-only FAT32 driver.
//!
//! Mounts a volume from a registered [`BlockDevice`](crate::blockdev::BlockDevice)
//! and serves files out of its root directory by 8.3 name. Sector and cluster
//! scratch buffers are allocated once at mount and reused by every call.
//!
//! Subdirectories are visible in root listings but are not searched.

mod bpb;
mod dir;

pub use bpb::Fat32Geometry;
pub use dir::{ShortEntry, format_83_name};

use bpb::BOOT_SECTOR_SIZE;
use dir::{DIR_ENTRY_SIZE, Slot};

use super::traits::{DirEntry, Driver, EntryKind, path_components};
use crate::blockdev::DeviceHandle;
use crate::error::{FsError, FsResult};

const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
const FAT_END_OF_CHAIN: u32 = 0x0FFF_FFF8;
const FAT_BAD_CLUSTER: u32 = 0x0FFF_FFF7;

/// What a driver-relative path names on the volume.
enum Target {
    Root,
    Entry(ShortEntry),
}

/// A mounted FAT32 volume.
pub struct Fat32Volume {
    device: DeviceHandle,
    geometry: Fat32Geometry,
    /// Device blocks per FAT sector.
    blocks_per_sector: u64,
    sector_buf: Vec<u8>,
    cluster_buf: Vec<u8>,
    /// Backs slices handed out by `read_file_ref`.
    file_buf: Vec<u8>,
}

impl std::fmt::Debug for Fat32Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fat32Volume")
            .field("device", &self.device.name())
            .field("geometry", &self.geometry)
            .finish()
    }
}

fn zeroed(len: usize) -> FsResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

impl Fat32Volume {
    /// Read the boot sector of `device` and prepare the volume.
    pub fn mount(device: DeviceHandle) -> FsResult<Self> {
        let block_size = device.block_size();
        let boot_blocks = BOOT_SECTOR_SIZE.div_ceil(block_size);
        let mut boot = zeroed(boot_blocks * block_size)?;
        device.read(0, &mut boot, boot_blocks as u64)?;

        let geometry = Fat32Geometry::parse(&boot)?;
        if !Fat32Geometry::has_boot_signature(&boot) {
            tracing::warn!(device = device.name(), "boot sector lacks 0x55AA signature");
        }

        let bytes_per_sector = usize::from(geometry.bytes_per_sector);
        if bytes_per_sector % block_size != 0 {
            return Err(FsError::InvalidArgument(format!(
                "{}: sector size {} is not a multiple of block size {}",
                device.name(),
                bytes_per_sector,
                block_size
            )));
        }
        let blocks_per_sector = (bytes_per_sector / block_size) as u64;

        let sector_buf = zeroed(bytes_per_sector)?;
        let cluster_buf = zeroed(geometry.cluster_size())?;

        tracing::debug!(
            device = device.name(),
            bytes_per_sector,
            sectors_per_cluster = geometry.sectors_per_cluster,
            fat_start = geometry.fat_start_lba,
            data_start = geometry.data_start_lba,
            root_cluster = geometry.root_cluster,
            "mounted FAT32 volume"
        );

        Ok(Self {
            device,
            geometry,
            blocks_per_sector,
            sector_buf,
            cluster_buf,
            file_buf: Vec::new(),
        })
    }

    pub fn geometry(&self) -> &Fat32Geometry {
        &self.geometry
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Look up a root directory entry by its 11-byte short name.
    pub fn find_entry(&mut self, name: &[u8; 11]) -> FsResult<ShortEntry> {
        let mut found = None;
        self.scan_root(&mut |entry| {
            if &entry.name == name {
                found = Some(*entry);
                true
            } else {
                false
            }
        })?;
        found.ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).trim_end().to_string()))
    }

    /// Read one FAT sector into `sector_buf`.
    fn read_sector(&mut self, lba: u64) -> FsResult<()> {
        self.device
            .read(lba * self.blocks_per_sector, &mut self.sector_buf, self.blocks_per_sector)
            .map_err(|e| FsError::Io(format!("sector {}: {}", lba, e)))
    }

    /// Read one data cluster into `cluster_buf`.
    fn read_cluster(&mut self, cluster: u32) -> FsResult<()> {
        let lba = self.geometry.cluster_to_lba(cluster)?;
        let count = u64::from(self.geometry.sectors_per_cluster) * self.blocks_per_sector;
        self.device
            .read(lba * self.blocks_per_sector, &mut self.cluster_buf, count)
            .map_err(|e| FsError::Io(format!("cluster {}: {}", cluster, e)))
    }

    /// FAT entry for `cluster`, masked to 28 bits.
    fn fat_entry(&mut self, cluster: u32) -> FsResult<u32> {
        let bytes_per_sector = u64::from(self.geometry.bytes_per_sector);
        let offset = u64::from(cluster) * 4;
        self.read_sector(self.geometry.fat_start_lba + offset / bytes_per_sector)?;
        let at = (offset % bytes_per_sector) as usize;
        let raw = u32::from_le_bytes([
            self.sector_buf[at],
            self.sector_buf[at + 1],
            self.sector_buf[at + 2],
            self.sector_buf[at + 3],
        ]);
        Ok(raw & FAT_ENTRY_MASK)
    }

    /// Follow the chain one step. `None` marks the end of the chain.
    ///
    /// `steps` counts links taken; a chain longer than the FAT itself can
    /// only be a cycle.
    fn next_cluster(&mut self, cluster: u32, steps: &mut u64) -> FsResult<Option<u32>> {
        *steps += 1;
        if *steps > self.geometry.max_chain_len() {
            return Err(FsError::Io(format!(
                "cluster chain through {} exceeds FAT length",
                cluster
            )));
        }
        let next = self.fat_entry(cluster)?;
        tracing::trace!(cluster, next, "fat chain step");
        if next >= FAT_END_OF_CHAIN {
            return Ok(None);
        }
        if next < 2 || next == FAT_BAD_CLUSTER {
            return Err(FsError::Io(format!(
                "cluster {} links to invalid entry {:#x}",
                cluster, next
            )));
        }
        Ok(Some(next))
    }

    /// Visit live root directory entries until `visit` returns true.
    fn scan_root(&mut self, visit: &mut dyn FnMut(&ShortEntry) -> bool) -> FsResult<()> {
        let mut cluster = self.geometry.root_cluster;
        let mut steps = 0;
        loop {
            let first = self.geometry.cluster_to_lba(cluster)?;
            for sector in 0..u64::from(self.geometry.sectors_per_cluster) {
                self.read_sector(first + sector)?;
                for raw in self.sector_buf.chunks_exact(DIR_ENTRY_SIZE) {
                    match Slot::parse(raw) {
                        Slot::End => return Ok(()),
                        Slot::Skip => {}
                        Slot::Entry(entry) => {
                            if visit(&entry) {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            match self.next_cluster(cluster, &mut steps)? {
                Some(next) => cluster = next,
                None => return Ok(()),
            }
        }
    }

    /// Fill `dest` from the chain starting at `first`.
    fn copy_chain(&mut self, first: u32, dest: &mut [u8]) -> FsResult<()> {
        let mut cluster = first;
        let mut copied = 0;
        let mut steps = 0;
        while copied < dest.len() {
            self.read_cluster(cluster)?;
            let n = self.cluster_buf.len().min(dest.len() - copied);
            dest[copied..copied + n].copy_from_slice(&self.cluster_buf[..n]);
            copied += n;
            if copied == dest.len() {
                break;
            }
            cluster = self.next_cluster(cluster, &mut steps)?.ok_or_else(|| {
                FsError::Io(format!(
                    "cluster chain from {} ends after {} of {} bytes",
                    first,
                    copied,
                    dest.len()
                ))
            })?;
        }
        Ok(())
    }

    fn resolve(&mut self, path: &str) -> FsResult<Target> {
        match path_components(path).as_slice() {
            [] => Ok(Target::Root),
            [name] => {
                let name = format_83_name(name)?;
                self.find_entry(&name).map(Target::Entry)
            }
            _ => Err(FsError::NotFound(path.to_string())),
        }
    }

    fn file_entry(&mut self, path: &str) -> FsResult<ShortEntry> {
        match self.resolve(path)? {
            Target::Entry(entry) if !entry.is_dir() => Ok(entry),
            _ => Err(FsError::IsDirectory(path.to_string())),
        }
    }
}

impl Driver for Fat32Volume {
    fn name(&self) -> &'static str {
        "fat32"
    }

    fn read_only(&self) -> bool {
        true
    }

    fn mkdir(&mut self, _path: &str) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn write_file(&mut self, _path: &str, _data: &[u8], _append: bool) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn read_file(&mut self, path: &str, buf: &mut [u8]) -> FsResult<usize> {
        let entry = self.file_entry(path)?;
        let size = entry.size as usize;
        let n = size.min(buf.len());
        if n > 0 {
            self.copy_chain(entry.first_cluster, &mut buf[..n])?;
        }
        Ok(size)
    }

    fn read_file_ref(&mut self, path: &str) -> FsResult<&[u8]> {
        let entry = self.file_entry(path)?;
        // No chain can hold more than the FAT has entries for.
        let limit = self
            .geometry
            .max_chain_len()
            .saturating_mul(self.geometry.cluster_size() as u64);
        if u64::from(entry.size) > limit {
            return Err(FsError::Io(format!(
                "{}: size {} exceeds volume capacity {}",
                path, entry.size, limit
            )));
        }
        let size = entry.size as usize;

        let mut contents = std::mem::take(&mut self.file_buf);
        contents.clear();
        contents.try_reserve_exact(size)?;
        contents.resize(size, 0);
        let copied = if size > 0 {
            self.copy_chain(entry.first_cluster, &mut contents)
        } else {
            Ok(())
        };
        self.file_buf = contents;
        copied?;
        Ok(&self.file_buf)
    }

    fn remove(&mut self, _path: &str, _recursive: bool) -> FsResult<()> {
        Err(FsError::ReadOnly)
    }

    fn file_type(&mut self, path: &str) -> Option<EntryKind> {
        match self.resolve(path).ok()? {
            Target::Root => Some(EntryKind::Directory),
            Target::Entry(entry) if entry.is_dir() => Some(EntryKind::Directory),
            Target::Entry(_) => Some(EntryKind::File),
        }
    }

    fn list_dir(&mut self, path: &str, visit: &mut dyn FnMut(&DirEntry)) -> FsResult<()> {
        match self.resolve(path)? {
            Target::Root => self.scan_root(&mut |entry| {
                let listed = if entry.is_dir() {
                    DirEntry::directory(entry.display_name())
                } else {
                    DirEntry::file(entry.display_name(), u64::from(entry.size))
                };
                visit(&listed);
                false
            }),
            Target::Entry(entry) if entry.is_dir() => Err(FsError::NotSupported(format!(
                "FAT32 subdirectory listing: {}",
                path
            ))),
            Target::Entry(_) => Err(FsError::NotDirectory(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::BlockDeviceRegistry;
    use crate::error::Errno;
    use glyphfs_testutil::Fat32ImageBuilder;

    const HELLO: &[u8] = b"Hello from FAT32\n\0";

    fn volume(image: Vec<u8>) -> Fat32Volume {
        let mut registry = BlockDeviceRegistry::new();
        let device = registry
            .create_ramdisk_from_image("fat0", 512, &image)
            .unwrap();
        Fat32Volume::mount(device).unwrap()
    }

    #[test]
    fn reads_hello_from_root() {
        let mut vol = volume(Fat32ImageBuilder::new().file("HELLO.TXT", HELLO).build());
        let entry = vol.find_entry(b"HELLO   TXT").unwrap();
        assert_eq!(entry.first_cluster, 3);
        assert_eq!(entry.size, 18);

        let mut buf = [0u8; 64];
        assert_eq!(vol.read_file("/HELLO.TXT", &mut buf).unwrap(), 18);
        assert_eq!(&buf[..18], HELLO);
        assert_eq!(vol.read_file_ref("/hello.txt").unwrap(), HELLO);
    }

    #[test]
    fn short_buffer_reports_true_size() {
        let mut vol = volume(Fat32ImageBuilder::new().file("HELLO.TXT", HELLO).build());
        let mut empty = [0u8; 0];
        assert_eq!(vol.read_file("/HELLO.TXT", &mut empty).unwrap(), 18);
        let mut five = [0u8; 5];
        assert_eq!(vol.read_file("/HELLO.TXT", &mut five).unwrap(), 18);
        assert_eq!(&five, b"Hello");
    }

    #[test]
    fn multi_cluster_file() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut vol = volume(Fat32ImageBuilder::new().file("BIG.BIN", &data).build());
        assert_eq!(vol.read_file_ref("/BIG.BIN").unwrap(), data.as_slice());

        let mut partial = vec![0u8; 1100];
        assert_eq!(vol.read_file("/BIG.BIN", &mut partial).unwrap(), 3000);
        assert_eq!(partial, data[..1100]);
    }

    #[test]
    fn larger_clusters() {
        let data = vec![7u8; 5000];
        let image = Fat32ImageBuilder::new()
            .sectors_per_cluster(4)
            .file("A.DAT", b"a")
            .file("B.DAT", &data)
            .build();
        let mut vol = volume(image);
        assert_eq!(vol.geometry().cluster_size(), 2048);
        assert_eq!(vol.read_file_ref("/B.DAT").unwrap(), data.as_slice());
        assert_eq!(vol.read_file_ref("/A.DAT").unwrap(), b"a");
    }

    #[test]
    fn missing_and_nested_paths_are_enoent() {
        let mut vol = volume(
            Fat32ImageBuilder::new()
                .file("HELLO.TXT", HELLO)
                .directory("SUB")
                .build(),
        );
        let mut buf = [0u8; 8];
        for path in ["/MISSING.TXT", "/SUB/HELLO.TXT", "/HELLO.TXT/X"] {
            let err = vol.read_file(path, &mut buf).unwrap_err();
            assert_eq!(err.errno(), Errno::ENOENT, "{}", path);
        }
        assert!(!vol.exists("/MISSING.TXT"));
        assert!(vol.exists("/hello.txt"));
    }

    #[test]
    fn skips_deleted_long_name_and_label_slots() {
        let image = Fat32ImageBuilder::new()
            .volume_label("GLYPHFS")
            .long_name_slot()
            .deleted("HELLO.TXT")
            .file("HELLO.TXT", HELLO)
            .build();
        let mut vol = volume(image);
        assert_eq!(vol.read_file_ref("/HELLO.TXT").unwrap(), HELLO);

        let mut names = Vec::new();
        vol.list_dir("/", &mut |e| names.push(e.name.clone())).unwrap();
        assert_eq!(names, vec!["HELLO.TXT"]);
    }

    #[test]
    fn root_spanning_clusters() {
        let mut builder = Fat32ImageBuilder::new();
        for i in 0..40 {
            builder = builder.file(&format!("F{}.TXT", i), format!("file {}", i).as_bytes());
        }
        let mut vol = volume(builder.build());
        assert_eq!(vol.read_file_ref("/F39.TXT").unwrap(), b"file 39");

        let mut count = 0;
        vol.list_dir("/", &mut |_| count += 1).unwrap();
        assert_eq!(count, 40);
    }

    #[test]
    fn listing_types_directories() {
        let mut vol = volume(
            Fat32ImageBuilder::new()
                .file("HELLO.TXT", HELLO)
                .directory("DOCS")
                .build(),
        );
        let mut entries = Vec::new();
        vol.list_dir("/", &mut |e| entries.push(e.clone())).unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("HELLO.TXT", 18), DirEntry::directory("DOCS")]
        );
        assert_eq!(vol.file_type("/DOCS"), Some(EntryKind::Directory));
        assert_eq!(vol.file_type("/"), Some(EntryKind::Directory));
        assert_eq!(vol.file_type("/HELLO.TXT"), Some(EntryKind::File));

        let err = vol.list_dir("/DOCS", &mut |_| {}).unwrap_err();
        assert_eq!(err.errno(), Errno::ENOSYS);
        let err = vol.list_dir("/HELLO.TXT", &mut |_| {}).unwrap_err();
        assert_eq!(err.errno(), Errno::ENOTDIR);

        let mut buf = [0u8; 4];
        assert_eq!(vol.read_file("/DOCS", &mut buf).unwrap_err().errno(), Errno::EISDIR);
        assert_eq!(vol.read_file("/", &mut buf).unwrap_err().errno(), Errno::EISDIR);
    }

    #[test]
    fn mutations_are_read_only() {
        let mut vol = volume(Fat32ImageBuilder::new().file("HELLO.TXT", HELLO).build());
        assert!(vol.read_only());
        assert_eq!(vol.write_file("/NEW.TXT", b"x", false).unwrap_err().errno(), Errno::EROFS);
        assert_eq!(vol.write_file("/HELLO.TXT", b"x", true).unwrap_err().errno(), Errno::EROFS);
        assert_eq!(vol.mkdir("/DIR").unwrap_err().errno(), Errno::EROFS);
        assert_eq!(vol.remove("/HELLO.TXT", false).unwrap_err().errno(), Errno::EROFS);
    }

    #[test]
    fn chain_cycle_is_eio() {
        let data = vec![1u8; 2048];
        // BIG.BIN occupies clusters 3..=6; loop 6 back to 4.
        let image = Fat32ImageBuilder::new()
            .file("BIG.BIN", &data)
            .fat_entry(6, 4)
            .build();
        let mut vol = volume(image);
        let mut buf = vec![0u8; 2048];
        // Exactly four clusters still read fine.
        assert_eq!(vol.read_file("/BIG.BIN", &mut buf).unwrap(), 2048);

        let image = Fat32ImageBuilder::new()
            .file("BIG.BIN", &data)
            .fat_entry(6, 4)
            .file_size("BIG.BIN", 1 << 20)
            .build();
        let mut vol = volume(image);
        let err = vol.read_file_ref("/BIG.BIN").unwrap_err();
        assert_eq!(err.errno(), Errno::EIO);
    }

    #[test]
    fn free_cluster_mid_chain_is_eio() {
        let data = vec![1u8; 1024];
        let image = Fat32ImageBuilder::new()
            .file("TWO.BIN", &data)
            .fat_entry(3, 0)
            .build();
        let mut vol = volume(image);
        let mut buf = vec![0u8; 1024];
        assert_eq!(vol.read_file("/TWO.BIN", &mut buf).unwrap_err().errno(), Errno::EIO);
    }

    #[test]
    fn short_chain_is_eio() {
        let image = Fat32ImageBuilder::new()
            .file("HELLO.TXT", HELLO)
            .file_size("HELLO.TXT", 4096)
            .build();
        let mut vol = volume(image);
        assert_eq!(vol.read_file_ref("/HELLO.TXT").unwrap_err().errno(), Errno::EIO);
    }

    #[test]
    fn mount_checks_geometry() {
        let mut registry = BlockDeviceRegistry::new();

        let blank = registry.create_ramdisk("blank", 512, 64).unwrap();
        let err = Fat32Volume::mount(blank).unwrap_err();
        assert_eq!(err.errno(), Errno::EINVAL);

        // 512-byte sectors on a 4096-byte block device.
        let image = Fat32ImageBuilder::new().file("HELLO.TXT", HELLO).build();
        let coarse = registry
            .create_ramdisk_from_image("coarse", 4096, &image)
            .unwrap();
        let err = Fat32Volume::mount(coarse).unwrap_err();
        assert_eq!(err.errno(), Errno::EINVAL);

        // 1024-byte sectors on a 512-byte device are fine.
        let image = Fat32ImageBuilder::new()
            .bytes_per_sector(1024)
            .file("HELLO.TXT", HELLO)
            .build();
        let fine = registry.create_ramdisk_from_image("fine", 512, &image).unwrap();
        let mut vol = Fat32Volume::mount(fine).unwrap();
        assert_eq!(vol.read_file_ref("/HELLO.TXT").unwrap(), HELLO);
    }

    #[test]
    fn odd_sector_size_is_rejected_at_mount() {
        let mut image = Fat32ImageBuilder::new().file("HELLO.TXT", HELLO).build();
        image[11..13].copy_from_slice(&6u16.to_le_bytes());
        image[44..48].copy_from_slice(&4u32.to_le_bytes());

        let mut registry = BlockDeviceRegistry::new();
        let device = registry.create_ramdisk_from_image("odd", 2, &image).unwrap();
        let err = Fat32Volume::mount(device).unwrap_err();
        assert_eq!(err.errno(), Errno::EINVAL);
    }

    #[test]
    fn oversized_entry_fails_before_allocating() {
        let image = Fat32ImageBuilder::new()
            .file("HUGE.BIN", b"tiny")
            .file_size("HUGE.BIN", u32::MAX)
            .build();
        let mut vol = volume(image);
        let err = vol.read_file_ref("/HUGE.BIN").unwrap_err();
        assert_eq!(err.errno(), Errno::EIO);
        assert_eq!(vol.file_buf.capacity(), 0);

        // A bounded read still reports the recorded size.
        let mut buf = [0u8; 4];
        assert_eq!(vol.read_file("/HUGE.BIN", &mut buf).unwrap(), u32::MAX as usize);
        assert_eq!(&buf, b"tiny");
    }

    #[test]
    fn missing_signature_still_mounts() {
        let image = Fat32ImageBuilder::new()
            .without_boot_signature()
            .file("HELLO.TXT", HELLO)
            .build();
        let mut vol = volume(image);
        assert!(vol.exists("/HELLO.TXT"));
    }

    #[test]
    fn empty_file_reads_nothing() {
        let mut vol = volume(Fat32ImageBuilder::new().file("EMPTY", b"").build());
        let entry = vol.find_entry(b"EMPTY      ").unwrap();
        assert_eq!(entry.first_cluster, 0);
        assert_eq!(vol.read_file_ref("/EMPTY").unwrap(), b"");
        let mut buf = [0u8; 4];
        assert_eq!(vol.read_file("/EMPTY", &mut buf).unwrap(), 0);
    }
}

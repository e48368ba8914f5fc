//! Test utilities for glyphfs.
//!
//! [`Fat32ImageBuilder`] lays out a small FAT32 volume in memory so driver
//! and end-to-end tests can mount real on-disk structures without fixtures:
//!
//! ```
//! use glyphfs_testutil::Fat32ImageBuilder;
//!
//! let image = Fat32ImageBuilder::new()
//!     .file("HELLO.TXT", b"Hello from FAT32\n\0")
//!     .build();
//! assert_eq!(&image[510..512], &[0x55, 0xAA]);
//! ```
//!
//! The root directory starts at cluster 2 and grows as entries need it.
//! Files and directories then take consecutive clusters in insertion order,
//! so the first file of a small volume always starts at cluster 3.

const END_OF_CHAIN: u32 = 0x0FFF_FFFF;
const MEDIA_ENTRY: u32 = 0x0FFF_FFF8;
const DIR_ENTRY_SIZE: usize = 32;
/// Free clusters left after the last allocation.
const SPARE_CLUSTERS: u32 = 4;

const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_ARCHIVE: u8 = 0x20;
const ATTR_LONG_NAME: u8 = 0x0F;

/// Encode `NAME.EXT` as an 11-byte space-padded short name.
///
/// Panics on names that do not fit; builder input is test data.
pub fn short_name(name: &str) -> [u8; 11] {
    let upper = name.to_ascii_uppercase();
    let (base, ext) = upper.split_once('.').unwrap_or((upper.as_str(), ""));
    assert!(
        !base.is_empty() && base.len() <= 8 && ext.len() <= 3,
        "not an 8.3 name: {name}"
    );
    let mut out = [b' '; 11];
    out[..base.len()].copy_from_slice(base.as_bytes());
    out[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
    out
}

#[derive(Debug, Clone)]
struct Slot {
    name: [u8; 11],
    attr: u8,
    contents: Vec<u8>,
    size: Option<u32>,
}

impl Slot {
    fn is_dir(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    /// Slots that own clusters.
    fn clusters(&self, cluster_size: usize) -> u32 {
        if self.attr == ATTR_LONG_NAME || self.attr & ATTR_VOLUME_ID != 0 || self.name[0] == 0xE5 {
            0
        } else if self.is_dir() {
            1
        } else {
            self.contents.len().div_ceil(cluster_size) as u32
        }
    }
}

/// Builder for an in-memory FAT32 volume image.
#[derive(Debug, Clone)]
pub struct Fat32ImageBuilder {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    boot_signature: bool,
    slots: Vec<Slot>,
    fat_overrides: Vec<(u32, u32)>,
}

impl Default for Fat32ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Fat32ImageBuilder {
    /// 512-byte sectors, one sector per cluster, two FATs.
    pub fn new() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 4,
            fat_count: 2,
            boot_signature: true,
            slots: Vec::new(),
            fat_overrides: Vec::new(),
        }
    }

    pub fn bytes_per_sector(mut self, bytes: u16) -> Self {
        assert!(bytes >= 512 && bytes.is_power_of_two(), "bad sector size {bytes}");
        self.bytes_per_sector = bytes;
        self
    }

    pub fn sectors_per_cluster(mut self, sectors: u8) -> Self {
        assert!(sectors > 0, "sectors per cluster must be non-zero");
        self.sectors_per_cluster = sectors;
        self
    }

    pub fn fat_count(mut self, fats: u8) -> Self {
        self.fat_count = fats;
        self
    }

    /// Leave bytes 510..512 of the boot sector zero.
    pub fn without_boot_signature(mut self) -> Self {
        self.boot_signature = false;
        self
    }

    /// Add a root directory file.
    pub fn file(mut self, name: &str, contents: &[u8]) -> Self {
        self.slots.push(Slot {
            name: short_name(name),
            attr: ATTR_ARCHIVE,
            contents: contents.to_vec(),
            size: None,
        });
        self
    }

    /// Add an empty root subdirectory holding only `.` and `..`.
    pub fn directory(mut self, name: &str) -> Self {
        self.slots.push(Slot {
            name: short_name(name),
            attr: ATTR_DIRECTORY,
            contents: Vec::new(),
            size: None,
        });
        self
    }

    /// Add a deleted (0xE5) entry.
    pub fn deleted(mut self, name: &str) -> Self {
        let mut name = short_name(name);
        name[0] = 0xE5;
        self.slots.push(Slot {
            name,
            attr: ATTR_ARCHIVE,
            contents: Vec::new(),
            size: None,
        });
        self
    }

    /// Add a volume label entry.
    pub fn volume_label(mut self, label: &str) -> Self {
        let mut name = [b' '; 11];
        let len = label.len().min(11);
        name[..len].copy_from_slice(&label.as_bytes()[..len]);
        self.slots.push(Slot {
            name,
            attr: ATTR_VOLUME_ID,
            contents: Vec::new(),
            size: None,
        });
        self
    }

    /// Add a long-file-name fragment.
    pub fn long_name_slot(mut self) -> Self {
        self.slots.push(Slot {
            name: *b"A\0h\0e\0l\0l\0o",
            attr: ATTR_LONG_NAME,
            contents: Vec::new(),
            size: None,
        });
        self
    }

    /// Override the size recorded in a file's directory entry.
    pub fn file_size(mut self, name: &str, size: u32) -> Self {
        let name = short_name(name);
        let slot = self.slots.iter_mut().rev().find(|s| s.name == name);
        assert!(slot.is_some(), "no entry named {:?}", String::from_utf8_lossy(&name));
        if let Some(slot) = slot {
            slot.size = Some(size);
        }
        self
    }

    /// Force a raw FAT entry after chains are laid out.
    pub fn fat_entry(mut self, cluster: u32, value: u32) -> Self {
        self.fat_overrides.push((cluster, value));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let bps = usize::from(self.bytes_per_sector);
        let spc = usize::from(self.sectors_per_cluster);
        let cluster_size = bps * spc;

        let root_bytes = self.slots.len() * DIR_ENTRY_SIZE;
        let root_clusters = root_bytes.div_ceil(cluster_size).max(1) as u32;

        // Lay out chains as (first cluster, length).
        let mut next = 2 + root_clusters;
        let mut firsts = Vec::with_capacity(self.slots.len());
        let mut chains = vec![(2, root_clusters)];
        for slot in &self.slots {
            let n = slot.clusters(cluster_size);
            if n == 0 {
                firsts.push(0);
            } else {
                firsts.push(next);
                chains.push((next, n));
                next += n;
            }
        }

        let total_clusters = next - 2 + SPARE_CLUSTERS;
        let fat_entries = (total_clusters + 2) as usize;
        let sectors_per_fat = (fat_entries * 4).div_ceil(bps);
        let data_start = usize::from(self.reserved_sectors) + usize::from(self.fat_count) * sectors_per_fat;
        let total_sectors = data_start + total_clusters as usize * spc;

        let mut image = vec![0u8; total_sectors * bps];
        self.write_boot_sector(&mut image, sectors_per_fat as u32, total_sectors as u32);

        let mut fat = vec![0u32; sectors_per_fat * bps / 4];
        fat[0] = MEDIA_ENTRY;
        fat[1] = END_OF_CHAIN;
        for &(first, len) in &chains {
            for c in first..first + len - 1 {
                fat[c as usize] = c + 1;
            }
            fat[(first + len - 1) as usize] = END_OF_CHAIN;
        }
        for &(cluster, value) in &self.fat_overrides {
            fat[cluster as usize] = value;
        }
        for copy in 0..usize::from(self.fat_count) {
            let start = (usize::from(self.reserved_sectors) + copy * sectors_per_fat) * bps;
            for (i, entry) in fat.iter().enumerate() {
                image[start + i * 4..start + i * 4 + 4].copy_from_slice(&entry.to_le_bytes());
            }
        }

        let cluster_offset = |cluster: u32| (data_start + (cluster as usize - 2) * spc) * bps;

        let root = cluster_offset(2);
        for (i, (slot, &first)) in self.slots.iter().zip(&firsts).enumerate() {
            let size = if slot.is_dir() {
                0
            } else {
                slot.size.unwrap_or(slot.contents.len() as u32)
            };
            let at = root + i * DIR_ENTRY_SIZE;
            write_entry(&mut image[at..at + DIR_ENTRY_SIZE], &slot.name, slot.attr, first, size);

            if first == 0 {
                continue;
            }
            let data = cluster_offset(first);
            if slot.is_dir() {
                write_entry(&mut image[data..data + 32], b".          ", ATTR_DIRECTORY, first, 0);
                write_entry(&mut image[data + 32..data + 64], b"..         ", ATTR_DIRECTORY, 0, 0);
            } else {
                image[data..data + slot.contents.len()].copy_from_slice(&slot.contents);
            }
        }

        image
    }

    fn write_boot_sector(&self, image: &mut [u8], sectors_per_fat: u32, total_sectors: u32) {
        image[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        image[3..11].copy_from_slice(b"GLYPHFS ");
        image[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        image[13] = self.sectors_per_cluster;
        image[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        image[16] = self.fat_count;
        image[21] = 0xF8;
        image[32..36].copy_from_slice(&total_sectors.to_le_bytes());
        image[36..40].copy_from_slice(&sectors_per_fat.to_le_bytes());
        image[44..48].copy_from_slice(&2u32.to_le_bytes());
        image[48..50].copy_from_slice(&1u16.to_le_bytes());
        image[66] = 0x29;
        image[71..82].copy_from_slice(b"NO NAME    ");
        image[82..90].copy_from_slice(b"FAT32   ");
        if self.boot_signature {
            image[510] = 0x55;
            image[511] = 0xAA;
        }
    }
}

fn write_entry(raw: &mut [u8], name: &[u8; 11], attr: u8, cluster: u32, size: u32) {
    raw[..11].copy_from_slice(name);
    raw[11] = attr;
    raw[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    raw[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    raw[28..32].copy_from_slice(&size.to_le_bytes());
}

//! FAT32 BIOS Parameter Block.

use crate::error::{FsError, FsResult};

pub const BOOT_SECTOR_SIZE: usize = 512;
const BOOT_SIG_OFFSET: usize = 510;
const BOOT_SIG: [u8; 2] = [0x55, 0xAA];

/// Sector sizes a FAT32 volume may declare.
const SECTOR_SIZES: [u16; 4] = [512, 1024, 2048, 4096];

/// Volume geometry read from sector 0, plus the derived region offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32Geometry {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
    /// First sector of the first FAT.
    pub fat_start_lba: u64,
    /// First sector of cluster 2.
    pub data_start_lba: u64,
}

fn le16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

impl Fat32Geometry {
    pub fn parse(sector: &[u8]) -> FsResult<Self> {
        if sector.len() < BOOT_SECTOR_SIZE {
            return Err(FsError::InvalidArgument("boot sector shorter than 512 bytes".into()));
        }

        let bytes_per_sector = le16(sector, 11);
        let sectors_per_cluster = sector[13];
        if bytes_per_sector == 0 || sectors_per_cluster == 0 {
            return Err(FsError::InvalidArgument(format!(
                "not a FAT32 volume: bytes/sector={} sectors/cluster={}",
                bytes_per_sector, sectors_per_cluster
            )));
        }
        if !SECTOR_SIZES.contains(&bytes_per_sector) {
            return Err(FsError::InvalidArgument(format!(
                "unsupported sector size {}",
                bytes_per_sector
            )));
        }

        let reserved_sectors = le16(sector, 14);
        let fat_count = sector[16];
        let sectors_per_fat = le32(sector, 36);
        let root_cluster = le32(sector, 44);

        let fat_start_lba = u64::from(reserved_sectors);
        let data_start_lba = fat_start_lba + u64::from(fat_count) * u64::from(sectors_per_fat);

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            sectors_per_fat,
            root_cluster,
            fat_start_lba,
            data_start_lba,
        })
    }

    pub fn has_boot_signature(sector: &[u8]) -> bool {
        sector.get(BOOT_SIG_OFFSET..BOOT_SIG_OFFSET + 2) == Some(&BOOT_SIG[..])
    }

    pub fn cluster_size(&self) -> usize {
        usize::from(self.bytes_per_sector) * usize::from(self.sectors_per_cluster)
    }

    /// First sector of a data cluster.
    pub fn cluster_to_lba(&self, cluster: u32) -> FsResult<u64> {
        let index = cluster
            .checked_sub(2)
            .ok_or_else(|| FsError::Io(format!("cluster {} is not a data cluster", cluster)))?;
        Ok(self.data_start_lba + u64::from(index) * u64::from(self.sectors_per_cluster))
    }

    /// Number of FAT entries, which bounds the length of any chain.
    pub fn max_chain_len(&self) -> u64 {
        u64::from(self.sectors_per_fat) * u64::from(self.bytes_per_sector) / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_sector() -> Vec<u8> {
        let mut s = vec![0u8; 512];
        s[11..13].copy_from_slice(&512u16.to_le_bytes());
        s[13] = 8;
        s[14..16].copy_from_slice(&32u16.to_le_bytes());
        s[16] = 2;
        s[36..40].copy_from_slice(&1000u32.to_le_bytes());
        s[44..48].copy_from_slice(&2u32.to_le_bytes());
        s
    }

    #[test]
    fn derives_region_offsets() {
        let g = Fat32Geometry::parse(&boot_sector()).unwrap();
        assert_eq!(g.fat_start_lba, 32);
        assert_eq!(g.data_start_lba, 32 + 2 * 1000);
        assert_eq!(g.cluster_size(), 4096);
        assert_eq!(g.cluster_to_lba(2).unwrap(), 2032);
        assert_eq!(g.cluster_to_lba(3).unwrap(), 2040);
        assert!(g.cluster_to_lba(1).is_err());
        assert_eq!(g.max_chain_len(), 1000 * 512 / 4);
    }

    #[test]
    fn rejects_zero_geometry() {
        let mut s = boot_sector();
        s[13] = 0;
        assert!(Fat32Geometry::parse(&s).is_err());

        let mut s = boot_sector();
        s[11] = 0;
        s[12] = 0;
        assert!(Fat32Geometry::parse(&s).is_err());
    }

    #[test]
    fn only_standard_sector_sizes() {
        for bps in [512u16, 1024, 2048, 4096] {
            let mut s = boot_sector();
            s[11..13].copy_from_slice(&bps.to_le_bytes());
            assert_eq!(Fat32Geometry::parse(&s).unwrap().bytes_per_sector, bps);
        }
        for bps in [6u16, 30, 256, 513, 8192] {
            let mut s = boot_sector();
            s[11..13].copy_from_slice(&bps.to_le_bytes());
            let err = Fat32Geometry::parse(&s).unwrap_err();
            assert_eq!(err.errno(), crate::error::Errno::EINVAL, "{} bytes/sector", bps);
        }
    }

    #[test]
    fn signature_is_optional_but_detected() {
        let mut s = boot_sector();
        assert!(!Fat32Geometry::has_boot_signature(&s));
        s[510] = 0x55;
        s[511] = 0xAA;
        assert!(Fat32Geometry::has_boot_signature(&s));
    }
}

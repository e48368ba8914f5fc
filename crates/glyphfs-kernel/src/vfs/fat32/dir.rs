//! Short (8.3) directory entries.

use crate::error::{FsError, FsResult};

pub const DIR_ENTRY_SIZE: usize = 32;

pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_LONG_NAME: u8 = 0x0F;

const ENTRY_FREE: u8 = 0xE5;
const ENTRY_END: u8 = 0x00;
/// A leading 0x05 stands for a real 0xE5 byte.
const ENTRY_KANJI_E5: u8 = 0x05;

/// Characters that may not appear in a short name.
const ILLEGAL_83: &[u8] = b"\"*+,./:;<=>?[\\]| ";

/// A decoded 32-byte directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub first_cluster: u32,
    pub size: u32,
}

/// What a raw slot in a directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// End of directory: no further entries are in use.
    End,
    /// Deleted, long-name or volume-label slot.
    Skip,
    Entry(ShortEntry),
}

impl Slot {
    pub fn parse(raw: &[u8]) -> Slot {
        match raw[0] {
            ENTRY_END => return Slot::End,
            ENTRY_FREE => return Slot::Skip,
            _ => {}
        }
        let attr = raw[11];
        if attr == ATTR_LONG_NAME || attr & ATTR_VOLUME_ID != 0 {
            return Slot::Skip;
        }

        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[..11]);
        if name[0] == ENTRY_KANJI_E5 {
            name[0] = ENTRY_FREE;
        }
        let hi = u16::from_le_bytes([raw[20], raw[21]]);
        let lo = u16::from_le_bytes([raw[26], raw[27]]);
        Slot::Entry(ShortEntry {
            name,
            attr,
            first_cluster: (u32::from(hi) << 16) | u32::from(lo),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        })
    }
}

impl ShortEntry {
    pub fn is_dir(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    /// `NAME.EXT` form for listings.
    pub fn display_name(&self) -> String {
        let base = String::from_utf8_lossy(&self.name[..8]);
        let ext = String::from_utf8_lossy(&self.name[8..]);
        let (base, ext) = (base.trim_end(), ext.trim_end());
        if ext.is_empty() {
            base.to_string()
        } else {
            format!("{}.{}", base, ext)
        }
    }
}

/// Format a file name as a space-padded 11-byte short name.
///
/// A leading `/` is ignored. The name is uppercased and split on its first
/// `.`; the base may hold 8 characters and the extension 3.
pub fn format_83_name(path: &str) -> FsResult<[u8; 11]> {
    let name = path.strip_prefix('/').unwrap_or(path);
    if name.is_empty() || !name.is_ascii() {
        return Err(FsError::InvalidArgument(format!("not an 8.3 name: {:?}", path)));
    }
    let upper = name.to_ascii_uppercase();
    let (base, ext) = upper.split_once('.').unwrap_or((upper.as_str(), ""));

    if base.len() > 8 || ext.len() > 3 {
        return Err(FsError::NameTooLong(path.to_string()));
    }
    if base.is_empty()
        || base
            .bytes()
            .chain(ext.bytes())
            .any(|b| b < 0x20 || ILLEGAL_83.contains(&b))
    {
        return Err(FsError::InvalidArgument(format!("not an 8.3 name: {:?}", path)));
    }

    let mut out = [b' '; 11];
    out[..base.len()].copy_from_slice(base.as_bytes());
    out[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
    Ok(out)
}

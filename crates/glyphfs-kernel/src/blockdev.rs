//! Block devices and the registry that names them.
//!
//! A [`BlockDevice`] is a named, fixed-geometry array of blocks. Its I/O goes
//! through a [`BlockOps`] table that owns whatever state backs the device
//! (a RAM buffer for [`Ramdisk`]). The registry hands out shared
//! [`DeviceHandle`]s; devices live as long as the last handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{FsError, FsResult};

/// Slots in a registry.
pub const MAX_BLOCK_DEVICES: usize = 8;

/// Shared handle to a registered device.
pub type DeviceHandle = Rc<BlockDevice>;

/// Operation table for a block device.
///
/// `start` and `count` are already bounds-checked and `buf` is exactly
/// `count * block_size` bytes when these are called.
pub trait BlockOps {
    /// Read `count` blocks starting at `start` into `buf`.
    fn read_blocks(&mut self, start: u64, count: u64, buf: &mut [u8]) -> FsResult<()>;

    /// Write `count` blocks starting at `start` from `buf`.
    ///
    /// Devices without a write path leave the default, which reports ENOSYS.
    fn write_blocks(&mut self, start: u64, count: u64, buf: &[u8]) -> FsResult<()> {
        let _ = (start, count, buf);
        Err(FsError::NotSupported("device has no write operation".into()))
    }

    /// Flush pending writes. Devices with nothing to flush succeed.
    fn flush(&mut self) -> FsResult<()> {
        Ok(())
    }
}

/// A named block device.
pub struct BlockDevice {
    name: String,
    block_size: usize,
    block_count: u64,
    ops: RefCell<Box<dyn BlockOps>>,
}

impl fmt::Debug for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDevice")
            .field("name", &self.name)
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .finish()
    }
}

impl BlockDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Read `count` blocks starting at `start` into the front of `buf`.
    pub fn read(&self, start: u64, buf: &mut [u8], count: u64) -> FsResult<()> {
        let len = self.check_range(start, count, buf.len())?;
        let mut ops = self.ops()?;
        ops.read_blocks(start, count, &mut buf[..len])
    }

    /// Write `count` blocks starting at `start` from the front of `buf`.
    pub fn write(&self, start: u64, buf: &[u8], count: u64) -> FsResult<()> {
        let len = self.check_range(start, count, buf.len())?;
        let mut ops = self.ops()?;
        ops.write_blocks(start, count, &buf[..len])
    }

    pub fn flush(&self) -> FsResult<()> {
        self.ops()?.flush()
    }

    fn ops(&self) -> FsResult<std::cell::RefMut<'_, Box<dyn BlockOps>>> {
        self.ops
            .try_borrow_mut()
            .map_err(|_| FsError::Busy(format!("device {} is in use", self.name)))
    }

    /// Validate a transfer and return its length in bytes.
    fn check_range(&self, start: u64, count: u64, buf_len: usize) -> FsResult<usize> {
        let end = start.checked_add(count);
        if end.is_none_or(|end| end > self.block_count) {
            return Err(FsError::InvalidArgument(format!(
                "{}: blocks {}..+{} beyond device end {}",
                self.name, start, count, self.block_count
            )));
        }
        let len = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(self.block_size))
            .ok_or_else(|| FsError::InvalidArgument(format!("{}: transfer too large", self.name)))?;
        if buf_len < len {
            return Err(FsError::InvalidArgument(format!(
                "{}: buffer of {} bytes cannot hold {} blocks",
                self.name, buf_len, count
            )));
        }
        Ok(len)
    }
}

/// RAM-backed block storage.
#[derive(Debug)]
pub struct Ramdisk {
    data: Vec<u8>,
    block_size: usize,
}

impl Ramdisk {
    /// Allocate a zeroed ramdisk of `block_size * block_count` bytes.
    pub fn new(block_size: usize, block_count: u64) -> FsResult<Self> {
        let len = usize::try_from(block_count)
            .ok()
            .and_then(|c| c.checked_mul(block_size))
            .ok_or_else(|| FsError::InvalidArgument("ramdisk size overflows".into()))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self { data, block_size })
    }

    /// Ramdisk holding a copy of `image`, zero-padded to whole blocks.
    pub fn from_image(block_size: usize, image: &[u8]) -> FsResult<Self> {
        if block_size == 0 {
            return Err(FsError::InvalidArgument("block size must be non-zero".into()));
        }
        let blocks = image.len().div_ceil(block_size).max(1);
        let mut disk = Self::new(block_size, blocks as u64)?;
        disk.data[..image.len()].copy_from_slice(image);
        Ok(disk)
    }

    pub fn block_count(&self) -> u64 {
        (self.data.len() / self.block_size) as u64
    }

    fn span(&self, start: u64, len: usize) -> FsResult<std::ops::Range<usize>> {
        let offset = usize::try_from(start)
            .ok()
            .and_then(|s| s.checked_mul(self.block_size))
            .ok_or_else(|| FsError::Io("ramdisk offset overflows".into()))?;
        let end = offset + len;
        if end > self.data.len() {
            return Err(FsError::Io("ramdisk access past end".into()));
        }
        Ok(offset..end)
    }
}

impl BlockOps for Ramdisk {
    fn read_blocks(&mut self, start: u64, _count: u64, buf: &mut [u8]) -> FsResult<()> {
        let span = self.span(start, buf.len())?;
        buf.copy_from_slice(&self.data[span]);
        Ok(())
    }

    fn write_blocks(&mut self, start: u64, _count: u64, buf: &[u8]) -> FsResult<()> {
        let span = self.span(start, buf.len())?;
        self.data[span].copy_from_slice(buf);
        Ok(())
    }
}

/// Registry of named block devices.
///
/// Holds at most [`MAX_BLOCK_DEVICES`] devices. Registration is idempotent by
/// name: registering an existing name returns the device already there.
#[derive(Default)]
pub struct BlockDeviceRegistry {
    devices: Vec<DeviceHandle>,
}

impl fmt::Debug for BlockDeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.devices.iter().map(|d| d.name())).finish()
    }
}

impl BlockDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device backed by `ops`.
    pub fn register(
        &mut self,
        name: &str,
        block_size: usize,
        block_count: u64,
        ops: Box<dyn BlockOps>,
    ) -> FsResult<DeviceHandle> {
        if name.is_empty() || block_size == 0 || block_count == 0 {
            return Err(FsError::InvalidArgument(format!(
                "device {:?}: name, block size and block count must be non-empty",
                name
            )));
        }
        if let Some(existing) = self.find(name) {
            tracing::debug!(device = name, "device already registered");
            return Ok(existing);
        }
        if self.devices.len() >= MAX_BLOCK_DEVICES {
            return Err(FsError::NoSpace(format!(
                "block device table full ({} slots)",
                MAX_BLOCK_DEVICES
            )));
        }

        let device = Rc::new(BlockDevice {
            name: name.to_string(),
            block_size,
            block_count,
            ops: RefCell::new(ops),
        });
        tracing::debug!(device = name, block_size, block_count, "registered block device");
        self.devices.push(Rc::clone(&device));
        Ok(device)
    }

    /// Look up a device by name.
    pub fn find(&self, name: &str) -> Option<DeviceHandle> {
        self.devices.iter().find(|d| d.name == name).cloned()
    }

    /// Registered devices in registration order.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Allocate and register a zeroed ramdisk.
    pub fn create_ramdisk(
        &mut self,
        name: &str,
        block_size: usize,
        block_count: u64,
    ) -> FsResult<DeviceHandle> {
        if let Some(existing) = self.find(name) {
            return Ok(existing);
        }
        if block_size == 0 || block_count == 0 {
            return Err(FsError::InvalidArgument(format!(
                "ramdisk {:?}: zero geometry",
                name
            )));
        }
        let disk = Ramdisk::new(block_size, block_count)?;
        self.register(name, block_size, block_count, Box::new(disk))
    }

    /// Register a ramdisk initialised from a disk image.
    pub fn create_ramdisk_from_image(
        &mut self,
        name: &str,
        block_size: usize,
        image: &[u8],
    ) -> FsResult<DeviceHandle> {
        if let Some(existing) = self.find(name) {
            return Ok(existing);
        }
        let disk = Ramdisk::from_image(block_size, image)?;
        let block_count = disk.block_count();
        self.register(name, block_size, block_count, Box::new(disk))
    }
}

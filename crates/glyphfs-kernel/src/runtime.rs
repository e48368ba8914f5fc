//! Runtime assembly.
//!
//! A [`Runtime`] owns one block-device registry, one VFS and the two
//! overlays. Independent runtimes share nothing.

use anyhow::{Context, Result, bail};

use crate::blockdev::BlockDeviceRegistry;
use crate::config::{DeviceConfig, DriverKind, MountConfig, RuntimeConfig};
use crate::overlay::{PxfsOverlay, UcfsOverlay};
use crate::vfs::{Fat32Volume, Ramfs, Vfs};

pub struct Runtime {
    pub registry: BlockDeviceRegistry,
    pub vfs: Vfs,
    pub ucfs: UcfsOverlay,
    pub pxfs: PxfsOverlay,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.registry)
            .field("vfs", &self.vfs)
            .field("ucfs_root", &self.ucfs.root())
            .field("pxfs_root", &self.pxfs.root())
            .finish()
    }
}

impl Runtime {
    /// Register devices, apply mounts and configure overlays, in that order.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let mut registry = BlockDeviceRegistry::new();
        for device in &config.devices {
            create_device(&mut registry, device)
                .with_context(|| format!("Failed to create device {}", device.name))?;
        }

        let mut vfs = Vfs::new();
        for mount in &config.mounts {
            apply_mount(&registry, &mut vfs, mount)
                .with_context(|| format!("Failed to mount {}", mount.path))?;
        }

        let ucfs = UcfsOverlay::with_root(&config.overlay.ucfs_root)
            .context("Invalid UCFS overlay root")?
            .with_max_path_len(config.overlay.max_path_len);
        let pxfs = PxfsOverlay::with_root(&config.overlay.pxfs_root)
            .context("Invalid PXFS overlay root")?
            .with_max_path_len(config.overlay.max_path_len);

        tracing::info!(
            devices = registry.len(),
            mounts = vfs.mounts().len(),
            "runtime ready"
        );
        Ok(Self {
            registry,
            vfs,
            ucfs,
            pxfs,
        })
    }
}

fn create_device(registry: &mut BlockDeviceRegistry, device: &DeviceConfig) -> Result<()> {
    if registry.find(&device.name).is_some() {
        bail!("device {} is declared twice", device.name);
    }

    match (&device.image, device.block_count) {
        (Some(image), count) => {
            let mut data = std::fs::read(image)
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            if let Some(count) = count {
                let capacity = usize::try_from(count)
                    .ok()
                    .and_then(|c| c.checked_mul(device.block_size))
                    .context("device size overflows")?;
                if data.len() > capacity {
                    bail!(
                        "image {} is {} bytes but the device holds {}",
                        image.display(),
                        data.len(),
                        capacity
                    );
                }
                data.resize(capacity, 0);
            }
            registry.create_ramdisk_from_image(&device.name, device.block_size, &data)?;
        }
        (None, Some(count)) => {
            registry.create_ramdisk(&device.name, device.block_size, count)?;
        }
        (None, None) => bail!("device needs block_count or image"),
    }
    Ok(())
}

fn apply_mount(registry: &BlockDeviceRegistry, vfs: &mut Vfs, mount: &MountConfig) -> Result<()> {
    match mount.driver {
        DriverKind::Ramfs => vfs.mount(&mount.path, Ramfs::new())?,
        DriverKind::Fat32 => {
            let name = mount
                .device
                .as_deref()
                .context("fat32 mount needs a device")?;
            let device = registry
                .find(name)
                .with_context(|| format!("unknown device {}", name))?;
            let volume = Fat32Volume::mount(device)
                .with_context(|| format!("{} does not hold a FAT32 volume", name))?;
            vfs.mount(&mount.path, volume)?;
        }
    }
    Ok(())
}

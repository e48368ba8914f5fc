//! Runtime configuration.
//!
//! A config file lists the ramdisks to create, what to mount where, and the
//! overlay roots:
//!
//! ```toml
//! [[devices]]
//! name = "fat0"
//! block_size = 512
//! image = "disk.img"
//!
//! [[mounts]]
//! path = "/"
//! driver = "ramfs"
//!
//! [[mounts]]
//! path = "/fat"
//! driver = "fat32"
//! device = "fat0"
//!
//! [overlay]
//! ucfs_root = "/ucfs"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::overlay::DEFAULT_MAX_PATH_LEN;

/// Everything needed to assemble a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Ramdisks to register, in order.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Mounts to apply, in order. Later mounts at the same path win.
    #[serde(default = "default_mounts")]
    pub mounts: Vec<MountConfig>,

    #[serde(default)]
    pub overlay: OverlayConfig,
}

/// A ramdisk, optionally pre-loaded from an image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,

    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Required without `image`; with one, pads the image up to this size.
    #[serde(default)]
    pub block_count: Option<u64>,

    /// Image file copied into the ramdisk at startup.
    #[serde(default)]
    pub image: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Ramfs,
    Fat32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub path: String,
    pub driver: DriverKind,

    /// Backing device, required by `fat32`.
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_ucfs_root")]
    pub ucfs_root: String,

    #[serde(default = "default_pxfs_root")]
    pub pxfs_root: String,

    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
}

fn default_block_size() -> usize {
    512
}

fn default_mounts() -> Vec<MountConfig> {
    vec![MountConfig {
        path: "/".to_string(),
        driver: DriverKind::Ramfs,
        device: None,
    }]
}

fn default_ucfs_root() -> String {
    "/ucfs".to_string()
}

fn default_pxfs_root() -> String {
    "/pxfs".to_string()
}

fn default_max_path_len() -> usize {
    DEFAULT_MAX_PATH_LEN
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            ucfs_root: default_ucfs_root(),
            pxfs_root: default_pxfs_root(),
            max_path_len: default_max_path_len(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            mounts: default_mounts(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Relative image paths are taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        if let Some(dir) = path.parent() {
            for device in &mut config.devices {
                if let Some(image) = device.image.as_mut() {
                    if image.is_relative() {
                        *image = dir.join(&*image);
                    }
                }
            }
        }
        Ok(config)
    }

    /// Add a ramdisk pre-loaded from `image` and mount it as FAT32 at `mount`.
    pub fn with_fat32_image(mut self, device: &str, image: PathBuf, mount: &str) -> Self {
        self.devices.push(DeviceConfig {
            name: device.to_string(),
            block_size: default_block_size(),
            block_count: None,
            image: Some(image),
        });
        self.mounts.push(MountConfig {
            path: mount.to_string(),
            driver: DriverKind::Fat32,
            device: Some(device.to_string()),
        });
        self
    }
}

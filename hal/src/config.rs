//! Device configuration built once at startup and handed to every component
//! that needs to know the flash layout.

use core::fmt;
use core::str::FromStr;

use crate::partition::PartitionTable;
use crate::{Address, Error, PlatformId};

/// Platform id of the boards this crate ships presets for.
pub const DEFAULT_PLATFORM_ID: PlatformId = 103;

/// Start of the OTA write window in external flash.
pub const FLASH_FW_ADDRESS: Address = 0x021000;
/// Size of the external flash addressed by the OTA window.
pub const FLASH_LENGTH: Address = 0x040000;
/// Recommended size of each OTA write.
pub const DEFAULT_CHUNK_SIZE: u16 = 512;

/// Which partition preset the device was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Modular,
    Monolithic,
}

impl Default for Layout {
    #[cfg(not(feature = "monolithic"))]
    fn default() -> Self {
        Layout::Modular
    }

    #[cfg(feature = "monolithic")]
    fn default() -> Self {
        Layout::Monolithic
    }
}

impl FromStr for Layout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modular" => Ok(Layout::Modular),
            "monolithic" => Ok(Layout::Monolithic),
            _ => Err(Error::Unsupported),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Modular => f.write_str("modular"),
            Layout::Monolithic => f.write_str("monolithic"),
        }
    }
}

/// Writable target window for OTA transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaWindow {
    pub address: Address,
    pub length: u32,
}

impl OtaWindow {
    pub const fn new(address: Address, length: u32) -> Self {
        Self { address, length }
    }
}

impl Default for OtaWindow {
    fn default() -> Self {
        Self::new(FLASH_FW_ADDRESS, FLASH_LENGTH - FLASH_FW_ADDRESS)
    }
}

/// OTA session parameters reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaConfig {
    pub window: OtaWindow,
    pub chunk_size: u16,
    /// Advisory only; 0 means no timeout. Nothing enforces it.
    pub session_timeout: u16,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            window: OtaWindow::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            session_timeout: 0,
        }
    }
}

/// Everything the validation pipeline and the OTA session need to know
/// about the device they run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub layout: Layout,
    pub platform_id: PlatformId,
    pub ota: OtaConfig,
}

impl DeviceConfig {
    pub const fn new(layout: Layout, platform_id: PlatformId, ota: OtaConfig) -> Self {
        Self {
            layout,
            platform_id,
            ota,
        }
    }

    /// Partition preset matching `layout`.
    pub const fn partition_table(&self) -> PartitionTable<'static> {
        PartitionTable::for_layout(self.layout)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(Layout::default(), DEFAULT_PLATFORM_ID, OtaConfig::default())
    }
}

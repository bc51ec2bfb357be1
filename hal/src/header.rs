//! Module header, suffix and CRC layouts.
//!
//! Header layout (little endian), at byte 0 of a partition:
//! - module_start_address: u32
//! - module_end_address: u32
//! - reserved: u8
//! - flags: u8
//! - module_version: u16
//! - platform_id: u16
//! - module_function: u8
//! - module_index: u8
//! - dependency: function u8, index u8, version u16
//! - reserved: [u8; 4]
//!
//! The suffix (`reserved: u16`, `sha256: [u8; 32]`, `size: u16`) ends exactly
//! at `module_end_address`; the big-endian CRC-32 starts there.
//!
//! Nothing read here is trustworthy until the validation pipeline accepts it.

use crate::partition::{ModuleFunction, PartitionDescriptor};
use crate::storage::FlashIo;
use crate::{Address, PlatformId, Result};

/// Size of the encoded header.
pub const HEADER_LEN: usize = 24;
/// Size of the encoded suffix.
pub const SUFFIX_LEN: usize = 36;
/// Size of the encoded CRC.
pub const CRC_LEN: usize = 4;

fn le_u16(bytes: &[u8; HEADER_LEN], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8; HEADER_LEN], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Version requirement a module declares on another module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDependency {
    pub function: ModuleFunction,
    pub index: u8,
    pub version: u16,
}

impl ModuleDependency {
    /// A dependency slot that declares nothing.
    pub const NONE: Self = Self {
        function: ModuleFunction::None,
        index: 0,
        version: 0,
    };
}

/// Decoded module header. Every field is as found in flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHeader {
    pub module_start_address: Address,
    pub module_end_address: Address,
    pub flags: u8,
    pub module_version: u16,
    pub platform_id: PlatformId,
    pub function: ModuleFunction,
    pub index: u8,
    pub dependency: ModuleDependency,
}

impl ModuleHeader {
    /// Decodes a header. Any bit pattern is accepted, including erased flash.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            module_start_address: le_u32(bytes, 0),
            module_end_address: le_u32(bytes, 4),
            flags: bytes[9],
            module_version: le_u16(bytes, 10),
            platform_id: le_u16(bytes, 12),
            function: ModuleFunction::from_code(bytes[14]),
            index: bytes[15],
            dependency: ModuleDependency {
                function: ModuleFunction::from_code(bytes[16]),
                index: bytes[17],
                version: le_u16(bytes, 18),
            },
        }
    }

    /// Encodes the header; reserved bytes are written as zero.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.module_start_address.to_le_bytes());
        out[4..8].copy_from_slice(&self.module_end_address.to_le_bytes());
        out[9] = self.flags;
        out[10..12].copy_from_slice(&self.module_version.to_le_bytes());
        out[12..14].copy_from_slice(&self.platform_id.to_le_bytes());
        out[14] = self.function.code();
        out[15] = self.index;
        out[16] = self.dependency.function.code();
        out[17] = self.dependency.index;
        out[18..20].copy_from_slice(&self.dependency.version.to_le_bytes());
        out
    }

    /// Declared module length, `end - start`. Zero when the addresses are inverted.
    pub fn module_length(&self) -> u32 {
        self.module_end_address
            .saturating_sub(self.module_start_address)
    }
}

/// Reads the header at the start of `partition`.
///
/// Returns `None` only when the bytes cannot be read; garbage decodes to a
/// garbage header.
pub fn locate_header<IO: FlashIo + ?Sized>(
    flash: &IO,
    partition: &PartitionDescriptor,
) -> Option<ModuleHeader> {
    let mut raw = [0u8; HEADER_LEN];
    match flash.read(partition.start_address, &mut raw) {
        Ok(()) => Some(ModuleHeader::parse(&raw)),
        Err(err) => {
            log::debug!(
                "header at {:#x} unreadable: {}",
                partition.start_address,
                err
            );
            None
        }
    }
}

/// Trailer placed immediately before the module CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSuffix {
    pub sha256: [u8; 32],
    pub size: u16,
}

impl ModuleSuffix {
    pub fn parse(bytes: &[u8; SUFFIX_LEN]) -> Self {
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&bytes[2..34]);
        Self {
            sha256,
            size: u16::from_le_bytes([bytes[34], bytes[35]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; SUFFIX_LEN] {
        let mut out = [0u8; SUFFIX_LEN];
        out[2..34].copy_from_slice(&self.sha256);
        out[34..36].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    /// Reads the suffix ending at `module_end`.
    pub fn locate<IO: FlashIo + ?Sized>(flash: &IO, module_end: Address) -> Result<Self> {
        let start = module_end
            .checked_sub(SUFFIX_LEN as u32)
            .ok_or(crate::Error::OutOfRange)?;
        let mut raw = [0u8; SUFFIX_LEN];
        flash.read(start, &mut raw)?;
        Ok(Self::parse(&raw))
    }
}

/// Checksum stored at `module_end_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleCrc {
    pub value: u32,
}

impl ModuleCrc {
    pub fn parse(bytes: &[u8; CRC_LEN]) -> Self {
        Self {
            value: u32::from_be_bytes(*bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; CRC_LEN] {
        self.value.to_be_bytes()
    }

    /// Reads the CRC starting at `module_end`.
    pub fn locate<IO: FlashIo + ?Sized>(flash: &IO, module_end: Address) -> Result<Self> {
        let mut raw = [0u8; CRC_LEN];
        flash.read(module_end, &mut raw)?;
        Ok(Self::parse(&raw))
    }
}

//! Static description of the flash regions ("partitions") a device is split into.
//!
//! Two board presets exist, selected once at startup through [`Layout`](crate::Layout):
//! - modular: bootloader, system part, user part and a factory-restore image.
//! - monolithic: bootloader, one monolithic firmware image and a factory-restore image.
//!
//! Both presets carry the same scratch/OTA partition, which is never part of
//! an inventory scan.

use crate::{Address, Layout};

/// Role a module plays on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFunction {
    /// No function; used for "no dependency" and for the scratch partition.
    None,
    Bootloader,
    MonoFirmware,
    SystemPart,
    UserPart,
    /// Any code not known to this build. Never matches a partition.
    Unknown(u8),
}

impl ModuleFunction {
    /// Decodes the on-flash function byte.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => ModuleFunction::None,
            2 => ModuleFunction::Bootloader,
            3 => ModuleFunction::MonoFirmware,
            4 => ModuleFunction::SystemPart,
            5 => ModuleFunction::UserPart,
            other => ModuleFunction::Unknown(other),
        }
    }

    /// Encodes the function as it is stored in a module header.
    pub const fn code(self) -> u8 {
        match self {
            ModuleFunction::None => 0,
            ModuleFunction::Bootloader => 2,
            ModuleFunction::MonoFirmware => 3,
            ModuleFunction::SystemPart => 4,
            ModuleFunction::UserPart => 5,
            ModuleFunction::Unknown(code) => code,
        }
    }
}

/// Physical store a partition lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStore {
    Main,
    Factory,
    Scratchpad,
}

impl ModuleStore {
    pub const fn code(self) -> u8 {
        match self {
            ModuleStore::Main => 0,
            ModuleStore::Factory => 1,
            ModuleStore::Scratchpad => 3,
        }
    }
}

/// One compiled-in flash region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub max_size: u32,
    /// First byte of the region.
    pub start_address: Address,
    /// Last address of the region. Range checks against it are inclusive.
    pub end_address: Address,
    pub function: ModuleFunction,
    pub index: u8,
    pub store: ModuleStore,
}

impl PartitionDescriptor {
    pub const fn new(
        max_size: u32,
        start_address: Address,
        end_address: Address,
        function: ModuleFunction,
        index: u8,
        store: ModuleStore,
    ) -> Self {
        Self {
            max_size,
            start_address,
            end_address,
            function,
            index,
            store,
        }
    }

    /// Inclusive membership test against this region.
    pub const fn contains(&self, address: Address) -> bool {
        in_range(address, self.start_address, self.end_address)
    }
}

/// Returns true when `value` lies in `[start, end]`, both ends inclusive.
#[inline]
pub const fn in_range(value: Address, start: Address, end: Address) -> bool {
    value >= start && value <= end
}

const BOOTLOADER: PartitionDescriptor = PartitionDescriptor::new(
    0x4000,
    0x3C000,
    0x40000,
    ModuleFunction::Bootloader,
    0,
    ModuleStore::Main,
);

const MODULAR: [PartitionDescriptor; 4] = [
    BOOTLOADER,
    PartitionDescriptor::new(0x1F000, 0x18000, 0x37000, ModuleFunction::SystemPart, 1, ModuleStore::Main),
    PartitionDescriptor::new(0x5000, 0x37000, 0x3C000, ModuleFunction::UserPart, 2, ModuleStore::Main),
    PartitionDescriptor::new(0x1F000, 0x1021000, 0x1040000, ModuleFunction::UserPart, 1, ModuleStore::Factory),
];

const MONOLITHIC: [PartitionDescriptor; 3] = [
    BOOTLOADER,
    PartitionDescriptor::new(0x24000, 0x18000, 0x3C000, ModuleFunction::MonoFirmware, 0, ModuleStore::Main),
    PartitionDescriptor::new(0x1F000, 0x1021000, 0x1040000, ModuleFunction::MonoFirmware, 0, ModuleStore::Factory),
];

/// Scratch region receiving incoming updates. Shared by both presets.
pub const OTA_PARTITION: PartitionDescriptor = PartitionDescriptor::new(
    0x1D000,
    0x1004000,
    0x1021000,
    ModuleFunction::None,
    0,
    ModuleStore::Scratchpad,
);

/// The active set of queryable partitions plus the scratch partition.
#[derive(Debug, Clone, Copy)]
pub struct PartitionTable<'a> {
    partitions: &'a [PartitionDescriptor],
    ota: PartitionDescriptor,
}

impl PartitionTable<'static> {
    /// Bootloader, system part, user part and factory image.
    pub const fn modular() -> Self {
        Self {
            partitions: &MODULAR,
            ota: OTA_PARTITION,
        }
    }

    /// Bootloader, monolithic firmware and factory image.
    pub const fn monolithic() -> Self {
        Self {
            partitions: &MONOLITHIC,
            ota: OTA_PARTITION,
        }
    }

    /// Preset for the given layout.
    pub const fn for_layout(layout: Layout) -> Self {
        match layout {
            Layout::Modular => Self::modular(),
            Layout::Monolithic => Self::monolithic(),
        }
    }
}

impl<'a> PartitionTable<'a> {
    /// Builds a table for a board without a preset.
    ///
    /// Duplicate `(function, index)` pairs are reported but accepted; lookups
    /// then resolve to the first entry.
    pub fn custom(partitions: &'a [PartitionDescriptor], ota: PartitionDescriptor) -> Self {
        for (i, a) in partitions.iter().enumerate() {
            if partitions[..i]
                .iter()
                .any(|b| b.function == a.function && b.index == a.index)
            {
                log::warn!(
                    "partition table has duplicate entry for {:?}/{}",
                    a.function,
                    a.index
                );
            }
        }
        Self { partitions, ota }
    }

    /// Finds the region reserved for `function`/`index`.
    pub fn find_bounds(&self, function: ModuleFunction, index: u8) -> Option<&'a PartitionDescriptor> {
        self.partitions
            .iter()
            .find(|p| p.function == function && p.index == index)
    }

    /// Queryable partitions, in scan order. The OTA partition is not included.
    pub fn partitions(&self) -> &'a [PartitionDescriptor] {
        self.partitions
    }

    /// The scratch/OTA partition.
    pub fn ota(&self) -> &PartitionDescriptor {
        &self.ota
    }
}

impl Default for PartitionTable<'static> {
    fn default() -> Self {
        Self::for_layout(Layout::default())
    }
}

//! System module inventory: one validation record per queryable partition.

use alloc::string::String;
use alloc::vec::Vec;

use crate::partition::PartitionTable;
use crate::storage::FlashIo;
use crate::validate::{Checks, ValidationRecord, Validator};
use crate::PlatformId;

/// Supplies extra diagnostic key/value pairs alongside the module records.
pub trait SystemInfoHook {
    /// Called after the records are built (`construct`) or released.
    fn add_system_info(&self, inventory: &mut Inventory, construct: bool);
}

/// Hook that reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiagnostics;

impl SystemInfoHook for NoDiagnostics {
    fn add_system_info(&self, inventory: &mut Inventory, _construct: bool) {
        inventory.key_values.clear();
    }
}

/// Snapshot of every partition's occupant.
#[derive(Debug, Default)]
pub struct Inventory {
    platform_id: PlatformId,
    records: Vec<ValidationRecord>,
    key_values: Vec<(String, String)>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans every partition when `construct` is set, otherwise releases
    /// the records built by the previous scan.
    ///
    /// User modules may skip their dependency; integrity is always checked.
    /// A bad module yields a record with fewer passed checks and never stops
    /// the scan.
    pub fn build<IO, H>(
        &mut self,
        validator: &Validator<'_, IO>,
        hook: &H,
        construct: bool,
    ) where
        IO: FlashIo + ?Sized,
        H: SystemInfoHook + ?Sized,
    {
        if construct {
            if !self.records.is_empty() {
                log::warn!(
                    "inventory rebuilt without teardown; dropping {} stale records",
                    self.records.len()
                );
            }
            self.release();
            self.platform_id = validator.platform_id();

            let partitions = validator.table().partitions();
            self.records.reserve_exact(partitions.len());
            for partition in partitions {
                self.records
                    .push(validator.fetch(partition, true, Checks::INTEGRITY));
            }
            log::info!(
                "inventory built: {} of {} modules valid",
                self.records.iter().filter(|r| r.is_valid()).count(),
                self.records.len()
            );
        } else {
            self.release();
        }
        hook.add_system_info(self, construct);
    }

    fn release(&mut self) {
        self.records = Vec::new();
        self.key_values = Vec::new();
    }

    pub fn platform_id(&self) -> PlatformId {
        self.platform_id
    }

    pub fn records(&self) -> &[ValidationRecord] {
        &self.records
    }

    pub fn key_values(&self) -> &[(String, String)] {
        &self.key_values
    }

    /// Appends a diagnostic pair; meant for [`SystemInfoHook`] implementations.
    pub fn push_key_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_values.push((key.into(), value.into()));
    }

    /// Heap capacity currently held by the records.
    pub fn allocated_records(&self) -> usize {
        self.records.capacity()
    }
}

/// Builds a fresh inventory over `table` with no extra diagnostics.
pub fn build_inventory<IO: FlashIo + ?Sized>(
    table: PartitionTable<'_>,
    flash: &IO,
    platform_id: PlatformId,
) -> Inventory {
    let validator = Validator::new(table, flash, platform_id);
    let mut inventory = Inventory::new();
    inventory.build(&validator, &NoDiagnostics, true);
    inventory
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::image::ModuleImage;
    use crate::partition::{ModuleFunction, ModuleStore, PartitionDescriptor};
    use crate::storage::MemoryFlash;
    use crate::validate::CheckStatus;

    const PLATFORM: PlatformId = 103;

    const BOOT: PartitionDescriptor =
        PartitionDescriptor::new(0x800, 0x0000, 0x07FF, ModuleFunction::Bootloader, 0, ModuleStore::Main);
    const MONO: PartitionDescriptor =
        PartitionDescriptor::new(0x800, 0x0800, 0x0FFF, ModuleFunction::MonoFirmware, 0, ModuleStore::Main);
    const FACTORY: PartitionDescriptor =
        PartitionDescriptor::new(0x800, 0x1000, 0x17FF, ModuleFunction::UserPart, 1, ModuleStore::Factory);
    const SCRATCH: PartitionDescriptor =
        PartitionDescriptor::new(0x800, 0x1800, 0x1FFF, ModuleFunction::None, 0, ModuleStore::Scratchpad);
    const TABLE: [PartitionDescriptor; 3] = [BOOT, MONO, FACTORY];

    fn write(flash: &mut MemoryFlash, img: &ModuleImage) {
        flash
            .write(img.start_address(), &img.encode().unwrap())
            .unwrap();
    }

    struct Uptime;

    impl SystemInfoHook for Uptime {
        fn add_system_info(&self, inventory: &mut Inventory, construct: bool) {
            if construct {
                inventory.push_key_value("uptime", "42");
            }
        }
    }

    #[test]
    fn one_record_per_partition_even_when_modules_are_bad() {
        let mut flash = MemoryFlash::new(0x2000);
        write(&mut flash, &ModuleImage::new(ModuleFunction::Bootloader, 0, 1, PLATFORM, 0));
        // MONO left erased, FACTORY built for another platform.
        write(
            &mut flash,
            &ModuleImage::new(ModuleFunction::UserPart, 1, 1, PLATFORM + 1, FACTORY.start_address),
        );

        let inventory = build_inventory(PartitionTable::custom(&TABLE, SCRATCH), &flash, PLATFORM);
        let records = inventory.records();
        assert_eq!(records.len(), 3);
        assert_eq!(inventory.platform_id(), PLATFORM);
        assert!(inventory.key_values().is_empty());

        assert!(records[0].is_valid());
        assert!(records[1].header().is_none());
        assert_eq!(records[2].status(Checks::PLATFORM), CheckStatus::Failed);
        assert_eq!(records[2].status(Checks::INTEGRITY), CheckStatus::Passed);

        for (record, partition) in records.iter().zip(TABLE.iter()) {
            assert_eq!(&record.bounds, partition);
            assert!(record.checked().contains(Checks::INTEGRITY));
        }
    }

    #[test]
    fn scratch_partition_is_never_scanned() {
        let flash = MemoryFlash::new(0x2000);
        let inventory = build_inventory(PartitionTable::custom(&TABLE, SCRATCH), &flash, PLATFORM);
        assert!(inventory.records().iter().all(|r| r.bounds != SCRATCH));
    }

    #[test]
    fn user_modules_get_dependency_waiver() {
        let mut flash = MemoryFlash::new(0x2000);
        write(
            &mut flash,
            &ModuleImage::new(ModuleFunction::UserPart, 1, 1, PLATFORM, FACTORY.start_address)
                .dependency(ModuleFunction::SystemPart, 1, 3),
        );

        let inventory = build_inventory(PartitionTable::custom(&TABLE, SCRATCH), &flash, PLATFORM);
        assert_eq!(inventory.records()[2].status(Checks::DEPENDENCIES), CheckStatus::Passed);
    }

    #[test]
    fn construct_teardown_cycles_do_not_leak_records() {
        let table = PartitionTable::custom(&TABLE, SCRATCH);
        let mut flash = MemoryFlash::new(0x2000);
        write(&mut flash, &ModuleImage::new(ModuleFunction::Bootloader, 0, 1, PLATFORM, 0));

        let mut inventory = Inventory::new();
        let validator = Validator::new(table, &flash, PLATFORM);
        inventory.build(&validator, &Uptime, true);
        assert_eq!(inventory.records().len(), 3);
        assert_eq!(inventory.allocated_records(), 3);
        assert_eq!(inventory.key_values().len(), 1);
        assert!(inventory.records()[0].is_valid());

        inventory.build(&validator, &Uptime, false);
        assert!(inventory.records().is_empty());
        assert_eq!(inventory.allocated_records(), 0);
        assert!(inventory.key_values().is_empty());

        // Second cycle sees the bootloader wiped.
        flash.erase(0, 0x800).unwrap();
        let validator = Validator::new(table, &flash, PLATFORM);
        inventory.build(&validator, &Uptime, true);
        assert_eq!(inventory.records().len(), 3);
        assert_eq!(inventory.allocated_records(), 3);
        assert_eq!(inventory.key_values().len(), 1);
        assert!(inventory.records()[0].header().is_none());

        inventory.build(&validator, &Uptime, false);
        assert_eq!(inventory.allocated_records(), 0);
    }

    #[test]
    fn rebuilding_without_teardown_replaces_records() {
        let table = PartitionTable::custom(&TABLE, SCRATCH);
        let flash = MemoryFlash::new(0x2000);
        let validator = Validator::new(table, &flash, PLATFORM);

        let mut inventory = Inventory::new();
        inventory.build(&validator, &NoDiagnostics, true);
        inventory.build(&validator, &NoDiagnostics, true);
        assert_eq!(inventory.records().len(), 3);
    }

    #[test]
    fn presets_scan_their_own_partition_count() {
        // Nothing mapped: every header read fails, every record is headerless.
        let flash = MemoryFlash::new(0);
        let modular = build_inventory(PartitionTable::modular(), &flash, PLATFORM);
        let monolithic = build_inventory(PartitionTable::monolithic(), &flash, PLATFORM);
        assert_eq!(modular.records().len(), 4);
        assert_eq!(monolithic.records().len(), 3);
        assert!(modular.records().iter().all(|r| r.header().is_none()));
    }
}

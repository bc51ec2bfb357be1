//! Module validation: range, platform, dependency and integrity checks over
//! the header found at the start of a partition.
//!
//! A record tracks two masks. `checked` holds every check that was requested,
//! `passed` the ones that succeeded; `passed` is always a subset of `checked`.
//! A bit missing from `checked` means "not evaluated", never "failed".

use crate::checksum::verify_crc32;
use crate::header::{locate_header, ModuleCrc, ModuleHeader, ModuleSuffix};
use crate::partition::{ModuleFunction, PartitionDescriptor, PartitionTable};
use crate::storage::FlashIo;
use crate::{Error, PlatformId};

bitflags::bitflags! {
    /// Independently combinable validation checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Checks: u16 {
        /// CRC over the module matches the stored value.
        const INTEGRITY    = 1 << 1;
        /// The declared dependency is present in a new enough version.
        const DEPENDENCIES = 1 << 2;
        /// The module end lies inside the partition its header claims.
        const RANGE        = 1 << 3;
        /// The module was built for the running platform.
        const PLATFORM     = 1 << 4;
    }
}

/// Checks every fetch performs regardless of what the caller asks for.
pub const BASELINE_CHECKS: Checks = Checks::RANGE
    .union(Checks::DEPENDENCIES)
    .union(Checks::PLATFORM);

/// Outcome of a single check in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    NotRequested,
    Failed,
    Passed,
}

/// Result of validating one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub bounds: PartitionDescriptor,
    header: Option<ModuleHeader>,
    crc: Option<ModuleCrc>,
    suffix: Option<ModuleSuffix>,
    checked: Checks,
    passed: Checks,
    rejected: bool,
}

impl ValidationRecord {
    fn new(bounds: PartitionDescriptor) -> Self {
        Self {
            bounds,
            header: None,
            crc: None,
            suffix: None,
            checked: Checks::empty(),
            passed: Checks::empty(),
            rejected: false,
        }
    }

    fn mark(&mut self, check: Checks, ok: bool) {
        if ok && self.checked.contains(check) {
            self.passed |= check;
        }
    }

    /// The module header, present only when it passed the range check.
    pub fn header(&self) -> Option<&ModuleHeader> {
        self.header.as_ref()
    }

    pub fn crc(&self) -> Option<&ModuleCrc> {
        self.crc.as_ref()
    }

    pub fn suffix(&self) -> Option<&ModuleSuffix> {
        self.suffix.as_ref()
    }

    pub fn checked(&self) -> Checks {
        self.checked
    }

    pub fn passed(&self) -> Checks {
        self.passed
    }

    /// Tri-state view of a single check.
    pub fn status(&self, check: Checks) -> CheckStatus {
        if !self.checked.contains(check) {
            CheckStatus::NotRequested
        } else if self.passed.contains(check) {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        }
    }

    /// True when a header was accepted and every requested check passed.
    pub fn is_valid(&self) -> bool {
        self.header.is_some() && self.passed == self.checked
    }

    /// Reasons this record is not valid, in check order.
    ///
    /// A headerless record reports only `NotFound` (nothing readable) or
    /// `OutOfRange` (header read but rejected).
    pub fn failures(&self) -> impl Iterator<Item = Error> + '_ {
        let headerless = self.header.is_none().then_some(if self.rejected {
            Error::OutOfRange
        } else {
            Error::NotFound
        });
        let failed = [
            (Checks::PLATFORM, Error::PlatformMismatch),
            (Checks::DEPENDENCIES, Error::DependencyUnmet),
            (Checks::INTEGRITY, Error::IntegrityMismatch),
        ]
        .into_iter()
        .filter(move |(check, _)| {
            self.header.is_some() && self.status(*check) == CheckStatus::Failed
        })
        .map(|(_, err)| err);
        headerless.into_iter().chain(failed)
    }
}

/// Runs validation against one partition table and flash device.
pub struct Validator<'a, IO: FlashIo + ?Sized> {
    table: PartitionTable<'a>,
    flash: &'a IO,
    platform_id: PlatformId,
}

impl<'a, IO: FlashIo + ?Sized> Validator<'a, IO> {
    pub fn new(table: PartitionTable<'a>, flash: &'a IO, platform_id: PlatformId) -> Self {
        Self {
            table,
            flash,
            platform_id,
        }
    }

    pub fn table(&self) -> &PartitionTable<'a> {
        &self.table
    }

    pub fn platform_id(&self) -> PlatformId {
        self.platform_id
    }

    /// Checks the dependency declared by the module in `partition`.
    ///
    /// Only one hop is followed: the dependency is accepted on the version
    /// field of its header alone. Whether that module is itself in range,
    /// intact, or has its own dependencies met is not looked at.
    pub fn validate_dependencies(
        &self,
        partition: &PartitionDescriptor,
        allow_missing_user_dependency: bool,
    ) -> bool {
        let Some(module) = locate_header(self.flash, partition) else {
            return false;
        };
        let required = module.dependency;
        if required.function == ModuleFunction::None {
            return true;
        }
        if allow_missing_user_dependency && module.function == ModuleFunction::UserPart {
            return true;
        }

        let Some(dependency_bounds) = self.table.find_bounds(required.function, required.index)
        else {
            log::debug!(
                "dependency {:?}/{} of module at {:#x} has no partition",
                required.function,
                required.index,
                partition.start_address
            );
            return false;
        };
        match locate_header(self.flash, dependency_bounds) {
            Some(dependency) => dependency.module_version >= required.version,
            None => false,
        }
    }

    /// Validates the module found at the start of `partition`.
    ///
    /// `extra_checks` adds to the baseline range, platform and dependency
    /// checks (typically [`Checks::INTEGRITY`]).
    pub fn fetch(
        &self,
        partition: &PartitionDescriptor,
        allow_missing_user_dependency: bool,
        extra_checks: Checks,
    ) -> ValidationRecord {
        let mut record = ValidationRecord::new(*partition);
        record.checked = BASELINE_CHECKS | extra_checks;

        let Some(header) = locate_header(self.flash, partition) else {
            return record;
        };

        // The header's own function/index can only resolve to a known
        // partition, so a corrupt end address is bounded by the table.
        let module_end = header.module_end_address;
        match self.table.find_bounds(header.function, header.index) {
            Some(expected) if expected.contains(module_end) => {}
            _ => {
                log::warn!(
                    "module at {:#x} rejected: {:?}/{} ending at {:#x} is outside any matching partition",
                    partition.start_address,
                    header.function,
                    header.index,
                    module_end
                );
                record.rejected = true;
                return record;
            }
        }

        record.header = Some(header);
        record.mark(Checks::RANGE, true);
        record.mark(Checks::PLATFORM, header.platform_id == self.platform_id);
        record.crc = ModuleCrc::locate(self.flash, module_end).ok();
        record.suffix = ModuleSuffix::locate(self.flash, module_end).ok();
        record.mark(
            Checks::DEPENDENCIES,
            self.validate_dependencies(partition, allow_missing_user_dependency),
        );
        if record.checked.contains(Checks::INTEGRITY) {
            record.mark(Checks::INTEGRITY, self.verify_integrity(partition, &header));
        }

        log::trace!(
            "module at {:#x}: checked {:?} passed {:?}",
            partition.start_address,
            record.checked,
            record.passed
        );
        record
    }

    /// CRC over `[partition.start_address, module_end_address)`.
    fn verify_integrity(&self, partition: &PartitionDescriptor, header: &ModuleHeader) -> bool {
        let Some(len) = header
            .module_end_address
            .checked_sub(partition.start_address)
        else {
            return false;
        };
        match verify_crc32(self.flash, partition.start_address, len) {
            Ok(ok) => ok,
            Err(err) => {
                log::warn!(
                    "integrity check at {:#x} failed to read flash: {}",
                    partition.start_address,
                    err
                );
                false
            }
        }
    }
}

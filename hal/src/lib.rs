#![cfg_attr(not(feature = "std"), no_std)]

// Module partition validation and OTA staging for flash-resident devices.

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(all(feature = "modular", feature = "monolithic"))]
compile_error!("Select only one partition layout feature at a time: modular or monolithic.");

/// Absolute flash address as seen by the device.
pub type Address = u32;

/// Platform identifier stamped into every module header.
pub type PlatformId = u16;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Error taxonomy shared by the validation pipeline and the OTA session.
///
/// Only `StorageFailure` is ever propagated out of a write path; the
/// validation-related variants describe why a check did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No trustworthy header was found.
    #[error("module header not found")]
    NotFound,
    /// An address lies outside every region it could legitimately belong to.
    #[error("address out of range")]
    OutOfRange,
    /// The module was built for another platform.
    #[error("platform mismatch")]
    PlatformMismatch,
    /// The declared dependency is missing or too old.
    #[error("dependency unmet")]
    DependencyUnmet,
    /// The stored checksum does not match the module contents.
    #[error("integrity mismatch")]
    IntegrityMismatch,
    /// The flash collaborator rejected an operation.
    #[error("storage failure: {0}")]
    StorageFailure(&'static str),
    /// The operation is not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// The operation is not supported by the current configuration.
    #[error("operation not supported")]
    Unsupported,
}

pub mod checksum;
pub mod config;
pub mod header;
pub mod health;
#[cfg(feature = "alloc")]
pub mod image;
#[cfg(feature = "alloc")]
pub mod inventory;
pub mod keys;
pub mod ota;
pub mod partition;
pub mod storage;
pub mod validate;

pub use config::{DeviceConfig, Layout, OtaConfig, OtaWindow, DEFAULT_PLATFORM_ID};
pub use header::{locate_header, ModuleCrc, ModuleHeader, ModuleSuffix};
#[cfg(feature = "alloc")]
pub use inventory::{build_inventory, Inventory, NoDiagnostics, SystemInfoHook};
pub use ota::{OtaSession, SessionState, UpdateComplete};
pub use partition::{in_range, ModuleFunction, ModuleStore, PartitionDescriptor, PartitionTable};
pub use storage::FlashIo;
pub use validate::{CheckStatus, Checks, ValidationRecord, Validator};

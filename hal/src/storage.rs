//! Flash I/O backends the validation pipeline and the OTA session read and
//! write through.
//!
//! - `MemoryFlash`: RAM-backed, erased to `0xFF`; optionally based at a
//!   non-zero absolute address.
//! - `FileFlash`: file-backed emulator for host tooling and tests.
//! - `hal_storage::HalFlash`: wraps vendor HAL routines given as function pointers.
//!
//! All addresses are absolute device addresses, not offsets into a region.
//! Electrical details (page programming, erase timing) stay in the backend.

use crate::{Address, Error, Result};
#[cfg(feature = "std")]
use std::fs::{File, OpenOptions};
#[cfg(feature = "std")]
use std::io::{Read, Seek, SeekFrom, Write};
#[cfg(feature = "std")]
use std::path::PathBuf;

/// Value read back from erased flash cells.
pub const ERASED_BYTE: u8 = 0xFF;

/// Flash access consumed by the validation pipeline and the OTA session.
pub trait FlashIo {
    /// Reads `buf.len()` bytes starting at `address`.
    fn read(&self, address: Address, buf: &mut [u8]) -> Result<()>;
    /// Programs `data` at `address`. The range must have been erased first.
    fn write(&mut self, address: Address, data: &[u8]) -> Result<()>;
    /// Erases `len` bytes starting at `address`.
    fn erase(&mut self, address: Address, len: usize) -> Result<()>;
    /// Total addressable bytes.
    fn capacity(&self) -> usize;
}

/// Resolves `[address, address + len)` against a device starting at `base`
/// with `capacity` bytes, returning the zero-based byte range.
fn span(base: Address, capacity: usize, address: Address, len: usize) -> Option<(usize, usize)> {
    let start = address.checked_sub(base)? as usize;
    let end = start.checked_add(len)?;
    if end > capacity {
        return None;
    }
    Some((start, end))
}

/// Flash held in RAM.
#[cfg(feature = "alloc")]
pub struct MemoryFlash {
    base: Address,
    storage: alloc::vec::Vec<u8>,
}

#[cfg(feature = "alloc")]
impl MemoryFlash {
    /// Erased flash covering `[0, size)`.
    pub fn new(size: usize) -> Self {
        Self::with_base(0, size)
    }

    /// Erased flash covering `[base, base + size)`.
    pub fn with_base(base: Address, size: usize) -> Self {
        Self {
            base,
            storage: alloc::vec![ERASED_BYTE; size],
        }
    }

    /// Raw view of the backing bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }
}

#[cfg(feature = "alloc")]
impl FlashIo for MemoryFlash {
    fn read(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        let (start, end) = span(self.base, self.storage.len(), address, buf.len())
            .ok_or(Error::StorageFailure("read out of bounds"))?;
        buf.copy_from_slice(&self.storage[start..end]);
        Ok(())
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<()> {
        let (start, end) = span(self.base, self.storage.len(), address, data.len())
            .ok_or(Error::StorageFailure("write out of bounds"))?;
        self.storage[start..end].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, address: Address, len: usize) -> Result<()> {
        let (start, end) = span(self.base, self.storage.len(), address, len)
            .ok_or(Error::StorageFailure("erase out of bounds"))?;
        self.storage[start..end].fill(ERASED_BYTE);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }
}

/// Flash emulated by a host file; address N is byte N of the file.
///
/// A freshly created file reads back as zeros until erased.
#[cfg(feature = "std")]
pub struct FileFlash {
    file: File,
    capacity: usize,
}

#[cfg(feature = "std")]
impl FileFlash {
    /// Opens or creates `path` and sizes it to `capacity` bytes.
    pub fn new(path: PathBuf, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|_| Error::StorageFailure("open flash file"))?;
        file.set_len(capacity as u64)
            .map_err(|_| Error::StorageFailure("size flash file"))?;
        Ok(Self { file, capacity })
    }

    /// Positions the shared handle at `address` after a bounds check.
    fn seek_to(&self, address: Address, len: usize) -> Result<&File> {
        span(0, self.capacity, address, len)
            .ok_or(Error::StorageFailure("flash file access out of bounds"))?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(u64::from(address)))
            .map_err(|_| Error::StorageFailure("seek flash file"))?;
        Ok(file)
    }
}

#[cfg(feature = "std")]
impl FlashIo for FileFlash {
    fn read(&self, address: Address, buf: &mut [u8]) -> Result<()> {
        let mut file = self.seek_to(address, buf.len())?;
        file.read_exact(buf)
            .map_err(|_| Error::StorageFailure("read flash file"))
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<()> {
        let mut file = self.seek_to(address, data.len())?;
        file.write_all(data)
            .map_err(|_| Error::StorageFailure("write flash file"))
    }

    fn erase(&mut self, address: Address, len: usize) -> Result<()> {
        let mut file = self.seek_to(address, len)?;
        let erased = [ERASED_BYTE; 4096];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(erased.len());
            file.write_all(&erased[..n])
                .map_err(|_| Error::StorageFailure("erase flash file"))?;
            remaining -= n;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Flash reached through vendor HAL routines.
#[cfg(feature = "hal-storage")]
pub mod hal_storage {
    use core::num::NonZeroUsize;

    use super::{span, FlashIo};
    use crate::{Address, Error, Result};

    /// Vendor routines, all taking absolute addresses.
    #[derive(Clone, Copy)]
    pub struct HalRoutines {
        pub read: fn(Address, &mut [u8]) -> Result<()>,
        pub write: fn(Address, &[u8]) -> Result<()>,
        pub erase: fn(Address, usize) -> Result<()>,
    }

    pub struct HalFlash {
        routines: HalRoutines,
        base: Address,
        capacity: usize,
        erase_block: Option<NonZeroUsize>,
    }

    impl HalFlash {
        /// Device at `[base, base + capacity)` whose erases must cover whole
        /// `erase_block`s, counted from `base`.
        pub const fn new(
            routines: HalRoutines,
            base: Address,
            capacity: usize,
            erase_block: NonZeroUsize,
        ) -> Self {
            Self {
                routines,
                base,
                capacity,
                erase_block: Some(erase_block),
            }
        }

        /// Leaves erase granularity to the HAL.
        pub const fn unaligned(routines: HalRoutines, base: Address, capacity: usize) -> Self {
            Self {
                routines,
                base,
                capacity,
                erase_block: None,
            }
        }

        fn offset(&self, address: Address, len: usize, what: &'static str) -> Result<usize> {
            span(self.base, self.capacity, address, len)
                .map(|(start, _)| start)
                .ok_or(Error::StorageFailure(what))
        }
    }

    impl FlashIo for HalFlash {
        fn read(&self, address: Address, buf: &mut [u8]) -> Result<()> {
            self.offset(address, buf.len(), "read out of bounds")?;
            (self.routines.read)(address, buf)
        }

        fn write(&mut self, address: Address, data: &[u8]) -> Result<()> {
            self.offset(address, data.len(), "write out of bounds")?;
            (self.routines.write)(address, data)
        }

        fn erase(&mut self, address: Address, len: usize) -> Result<()> {
            let offset = self.offset(address, len, "erase out of bounds")?;
            if let Some(block) = self.erase_block {
                if offset % block.get() != 0 || len % block.get() != 0 {
                    log::warn!("erase {:#x}+{:#x} not aligned to {} bytes", address, len, block);
                    return Err(Error::StorageFailure("erase not block aligned"));
                }
            }
            (self.routines.erase)(address, len)
        }

        fn capacity(&self) -> usize {
            self.capacity
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn memory_flash_starts_erased() {
        let flash = MemoryFlash::new(16);
        let mut buf = [0u8; 16];
        flash.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == ERASED_BYTE));
    }

    #[test]
    fn memory_flash_honours_base_address() {
        let mut flash = MemoryFlash::with_base(0x1000, 0x100);
        flash.write(0x1010, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        flash.read(0x1010, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        assert!(flash.read(0x0FFF, &mut buf).is_err());
        assert!(flash.write(0x10FE, &[0; 4]).is_err());
    }

    #[test]
    fn memory_flash_erase_resets_cells() {
        let mut flash = MemoryFlash::new(8);
        flash.write(0, &[0u8; 8]).unwrap();
        flash.erase(2, 4).unwrap();
        assert_eq!(flash.as_slice(), &[0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
    }

    #[test]
    fn span_rejects_overflowing_ranges() {
        assert_eq!(span(0, 16, 4, 4), Some((4, 8)));
        assert_eq!(span(0, 16, 12, 5), None);
        assert_eq!(span(0x100, 16, 0x10, 1), None);
        assert_eq!(span(0, usize::MAX, Address::MAX, usize::MAX), None);
    }

    #[test]
    fn file_flash_io_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut flash = FileFlash::new(dir.path().join("flash.bin"), 64).unwrap();

        flash.erase(0, 64).unwrap();
        flash.write(8, &[9, 8, 7, 6]).unwrap();

        let mut buf = [0u8; 6];
        flash.read(7, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 9, 8, 7, 6, 0xFF]);

        assert!(flash.write(62, &[0; 4]).is_err());
    }
}

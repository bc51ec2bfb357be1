//! CRC-32 over flash ranges.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::storage::FlashIo;
use crate::{Address, Error, Result};

/// Type used to store a module CRC.
pub type ModuleCrcType = u32;

const CRC: Crc<ModuleCrcType> = Crc::<ModuleCrcType>::new(&CRC_32_ISO_HDLC);

/// Bytes pulled from flash per digest update.
const READ_CHUNK: usize = 256;

/// CRC-32 of a byte slice.
pub fn crc32(bytes: &[u8]) -> ModuleCrcType {
    CRC.checksum(bytes)
}

/// Streams `[start, start + len)` through the CRC without buffering the whole range.
pub fn crc32_range<IO: FlashIo + ?Sized>(flash: &IO, start: Address, len: u32) -> Result<ModuleCrcType> {
    let mut digest = CRC.digest();
    let mut buf = [0u8; READ_CHUNK];
    let mut offset = 0u32;
    while offset < len {
        let n = (len - offset).min(READ_CHUNK as u32) as usize;
        let address = start
            .checked_add(offset)
            .ok_or(Error::OutOfRange)?;
        flash.read(address, &mut buf[..n])?;
        digest.update(&buf[..n]);
        offset += n as u32;
    }
    Ok(digest.finalize())
}

/// Checks `[start, start + len)` against the big-endian CRC stored right after it.
pub fn verify_crc32<IO: FlashIo + ?Sized>(flash: &IO, start: Address, len: u32) -> Result<bool> {
    let crc_address = start.checked_add(len).ok_or(Error::OutOfRange)?;
    let mut stored = [0u8; 4];
    flash.read(crc_address, &mut stored)?;
    let computed = crc32_range(flash, start, len)?;
    Ok(computed == ModuleCrcType::from_be_bytes(stored))
}

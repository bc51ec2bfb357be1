//! Builds flashable module images: header, body, suffix, then CRC.
//!
//! The header's `module_end_address` is derived from the encoded length, so
//! `[start, end)` covers header + body + suffix and the CRC lands at `end`.

use alloc::vec::Vec;

use crate::checksum::crc32;
use crate::header::{
    ModuleCrc, ModuleDependency, ModuleHeader, ModuleSuffix, CRC_LEN, HEADER_LEN, SUFFIX_LEN,
};
use crate::partition::ModuleFunction;
use crate::{Address, Error, PlatformId, Result};

/// Module image under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    start_address: Address,
    function: ModuleFunction,
    index: u8,
    version: u16,
    platform_id: PlatformId,
    flags: u8,
    dependency: ModuleDependency,
    body: Vec<u8>,
    sha256: [u8; 32],
}

impl ModuleImage {
    /// An image with an empty body and no dependency.
    pub fn new(
        function: ModuleFunction,
        index: u8,
        version: u16,
        platform_id: PlatformId,
        start_address: Address,
    ) -> Self {
        Self {
            start_address,
            function,
            index,
            version,
            platform_id,
            flags: 0,
            dependency: ModuleDependency::NONE,
            body: Vec::new(),
            sha256: [0; 32],
        }
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn dependency(mut self, function: ModuleFunction, index: u8, version: u16) -> Self {
        self.dependency = ModuleDependency {
            function,
            index,
            version,
        };
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Hash carried in the suffix. Stored as-is, never verified on device.
    pub fn suffix_hash(mut self, sha256: [u8; 32]) -> Self {
        self.sha256 = sha256;
        self
    }

    /// Pads the body with erased bytes so `end - start == module_len`.
    /// Leaves the body untouched when it is already at least that long.
    pub fn pad_to(mut self, module_len: u32) -> Self {
        let target = (module_len as usize).saturating_sub(HEADER_LEN + SUFFIX_LEN);
        if self.body.len() < target {
            self.body.resize(target, crate::storage::ERASED_BYTE);
        }
        self
    }

    pub fn start_address(&self) -> Address {
        self.start_address
    }

    /// Length of `[start, end)`: header, body and suffix.
    pub fn module_len(&self) -> Result<u32> {
        let len = HEADER_LEN + self.body.len() + SUFFIX_LEN;
        u32::try_from(len).map_err(|_| Error::OutOfRange)
    }

    /// The header this image encodes.
    pub fn header(&self) -> Result<ModuleHeader> {
        let end = self
            .start_address
            .checked_add(self.module_len()?)
            .ok_or(Error::OutOfRange)?;
        Ok(ModuleHeader {
            module_start_address: self.start_address,
            module_end_address: end,
            flags: self.flags,
            module_version: self.version,
            platform_id: self.platform_id,
            function: self.function,
            index: self.index,
            dependency: self.dependency,
        })
    }

    /// Header + body + suffix + big-endian CRC of everything before it.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = self.header()?;
        let suffix = ModuleSuffix {
            sha256: self.sha256,
            size: SUFFIX_LEN as u16,
        };

        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len() + SUFFIX_LEN + CRC_LEN);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&suffix.to_bytes());
        let crc = ModuleCrc { value: crc32(&out) };
        out.extend_from_slice(&crc.to_bytes());
        Ok(out)
    }
}

//! Key material provider. Key bytes are opaque here; their format and
//! where they are stored is up to the implementation.

use crate::{Error, Result};

/// Length of the server public key buffer (DER).
pub const SERVER_PUBLIC_KEY_LENGTH: usize = 294;
/// Length of the device private key buffer (DER, zero padded).
pub const DEVICE_PRIVATE_KEY_LENGTH: usize = 612;

pub trait KeyProvider {
    /// Fills `buf` with the server public key.
    fn server_public_key(&self, buf: &mut [u8; SERVER_PUBLIC_KEY_LENGTH]);

    /// Fills `buf` with the device private key and returns its length.
    fn device_private_key(&self, buf: &mut [u8; DEVICE_PRIVATE_KEY_LENGTH]) -> usize;

    /// Copies the stored claim code into `buf` and returns its length.
    fn claim_code(&self, buf: &mut [u8]) -> usize {
        if let Some(first) = buf.first_mut() {
            *first = 0;
        }
        0
    }

    fn set_claim_code(&mut self, _code: &str) -> Result<()> {
        Err(Error::Unsupported)
    }
}

/// Serves keys from caller-provided byte slices.
pub struct StaticKeys<'a> {
    server_public: &'a [u8],
    device_private: &'a [u8],
}

impl<'a> StaticKeys<'a> {
    /// Keys longer than their buffer are truncated; shorter ones are zero padded.
    pub const fn new(server_public: &'a [u8], device_private: &'a [u8]) -> Self {
        Self {
            server_public,
            device_private,
        }
    }
}

fn copy_padded(src: &[u8], dst: &mut [u8]) -> usize {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
    n
}

impl KeyProvider for StaticKeys<'_> {
    fn server_public_key(&self, buf: &mut [u8; SERVER_PUBLIC_KEY_LENGTH]) {
        copy_padded(self.server_public, buf);
    }

    fn device_private_key(&self, buf: &mut [u8; DEVICE_PRIVATE_KEY_LENGTH]) -> usize {
        copy_padded(self.device_private, buf);
        DEVICE_PRIVATE_KEY_LENGTH
    }
}

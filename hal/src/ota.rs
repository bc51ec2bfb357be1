//! Streaming OTA transfer into the update window.
//!
//! `begin` opens a window, `write` forwards chunks to flash, `end` commits.
//! Nothing here validates the written image; the next boot's inventory scan
//! does. An abandoned session leaves the window in an undetermined state.

use core::fmt;

use crate::config::OtaConfig;
use crate::storage::FlashIo;
use crate::{Address, Error, Result};

/// Outcome reported when a session is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateComplete {
    Error,
    AppliedPendingRestart,
    Applied,
}

impl fmt::Display for UpdateComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateComplete::Error => f.write_str("Error"),
            UpdateComplete::AppliedPendingRestart => f.write_str("Applied, pending restart"),
            UpdateComplete::Applied => f.write_str("Applied"),
        }
    }
}

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active { address: Address, length: u32 },
    Committed,
}

/// The device-wide OTA transfer. Only one may exist per flash device.
pub struct OtaSession<IO: FlashIo> {
    flash: IO,
    config: OtaConfig,
    state: SessionState,
    flashed: bool,
}

impl<IO: FlashIo> OtaSession<IO> {
    pub fn new(flash: IO, config: OtaConfig) -> Self {
        Self {
            flash,
            config,
            state: SessionState::Idle,
            flashed: false,
        }
    }

    /// Opens a session over `[address, address + length)` and erases it.
    ///
    /// Always reports success. An erase failure is logged, not returned; the
    /// following writes or the next boot's validation will surface it.
    pub fn begin(&mut self, address: Address, length: u32) -> bool {
        if let SessionState::Active { address: old, .. } = self.state {
            log::warn!("abandoning OTA session at {:#x} for a new one", old);
        }
        log::info!("OTA session begins at {:#x}, {} bytes", address, length);

        if let Err(err) = self.flash.erase(address, length as usize) {
            log::warn!("OTA erase of {:#x}+{:#x} failed: {}", address, length, err);
        }
        self.state = SessionState::Active { address, length };
        true
    }

    /// Programs one chunk and returns how many bytes were accepted.
    ///
    /// Chunks must fall inside the window given to [`begin`](Self::begin).
    pub fn write(&mut self, buffer: &[u8], address: Address, length: usize) -> Result<usize> {
        let SessionState::Active {
            address: start,
            length: window,
        } = self.state
        else {
            return Err(Error::InvalidState("no active OTA session"));
        };
        let data = buffer.get(..length).ok_or(Error::OutOfRange)?;

        let window_end = u64::from(start) + u64::from(window);
        let chunk_end = u64::from(address) + length as u64;
        if address < start || chunk_end > window_end {
            log::warn!(
                "OTA chunk {:#x}+{:#x} outside session window {:#x}+{:#x}",
                address,
                length,
                start,
                window
            );
            return Err(Error::OutOfRange);
        }

        self.flash.write(address, data).map_err(|err| {
            log::error!("OTA write at {:#x} failed: {}", address, err);
            match err {
                Error::StorageFailure(msg) => Error::StorageFailure(msg),
                _ => Error::StorageFailure("flash write rejected"),
            }
        })?;
        log::trace!("OTA wrote {} bytes at {:#x}", length, address);
        Ok(length)
    }

    /// Finalizes the session. The image takes effect after a restart.
    pub fn end(&mut self) -> UpdateComplete {
        match self.state {
            SessionState::Active { address, length } => {
                log::info!(
                    "OTA session at {:#x}+{:#x} committed, pending restart",
                    address,
                    length
                );
                self.state = SessionState::Committed;
                self.flashed = true;
                UpdateComplete::AppliedPendingRestart
            }
            _ => {
                log::error!("OTA end without an active session");
                UpdateComplete::Error
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start of the writable target window.
    pub fn flash_address(&self) -> Address {
        self.config.window.address
    }

    /// Size of the writable target window.
    pub fn flash_length(&self) -> u32 {
        self.config.window.length
    }

    /// Recommended bytes per [`write`](Self::write).
    pub fn chunk_size(&self) -> u16 {
        self.config.chunk_size
    }

    /// Advisory timeout reported to callers; nothing enforces it.
    pub fn session_timeout(&self) -> u16 {
        self.config.session_timeout
    }

    /// True once a session was committed and not yet acknowledged.
    pub fn flashed_status(&self) -> bool {
        self.flashed
    }

    pub fn reset_flashed_status(&mut self) {
        self.flashed = false;
        if self.state == SessionState::Committed {
            self.state = SessionState::Idle;
        }
    }

    /// Access to the underlying flash, e.g. to validate the staged image.
    pub fn flash(&self) -> &IO {
        &self.flash
    }

    /// Consumes the session and returns the flash device.
    pub fn into_inner(self) -> IO {
        self.flash
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::config::OtaWindow;
    use crate::storage::MemoryFlash;

    struct RejectingFlash;

    impl FlashIo for RejectingFlash {
        fn read(&self, _address: Address, _buf: &mut [u8]) -> Result<()> {
            Err(Error::StorageFailure("read rejected"))
        }

        fn write(&mut self, _address: Address, _data: &[u8]) -> Result<()> {
            Err(Error::StorageFailure("write rejected"))
        }

        fn erase(&mut self, _address: Address, _len: usize) -> Result<()> {
            Err(Error::StorageFailure("erase rejected"))
        }

        fn capacity(&self) -> usize {
            0
        }
    }

    fn session() -> OtaSession<MemoryFlash> {
        OtaSession::new(MemoryFlash::new(0x4000), OtaConfig::default())
    }

    #[test]
    fn begin_write_end_round_trip() {
        let mut ota = session();
        let window = (ota.flash_address(), ota.flash_length());

        assert!(ota.begin(0x1000, 0x2000));
        let buf = [0xA5u8; 512];
        assert_eq!(ota.write(&buf, 0x1000, 512), Ok(512));
        let done = ota.end();
        assert_eq!(done, UpdateComplete::AppliedPendingRestart);
        assert_eq!(done.to_string(), "Applied, pending restart");

        assert_eq!((ota.flash_address(), ota.flash_length()), window);
        assert_eq!(window, (0x21000, 0x1F000));
        assert_eq!(&ota.flash().as_slice()[0x1000..0x1200], &buf[..]);
        assert_eq!(ota.state(), SessionState::Committed);
    }

    #[test]
    fn begin_erases_the_target_window() {
        let mut flash = MemoryFlash::new(0x100);
        flash.write(0, &[0u8; 0x100]).unwrap();
        let mut ota = OtaSession::new(flash, OtaConfig::default());

        ota.begin(0x10, 0x20);
        let bytes = ota.flash().as_slice();
        assert!(bytes[0x10..0x30].iter().all(|b| *b == 0xFF));
        assert_eq!(bytes[0x0F], 0);
        assert_eq!(bytes[0x30], 0);
    }

    #[test]
    fn sequential_chunks_fill_the_window() {
        let mut ota = session();
        let image: Vec<u8> = (0..1300u32).map(|i| i as u8).collect();
        ota.begin(0x2000, image.len() as u32);

        let chunk = usize::from(ota.chunk_size());
        let mut address = 0x2000;
        for piece in image.chunks(chunk) {
            assert_eq!(ota.write(piece, address, piece.len()), Ok(piece.len()));
            address += piece.len() as u32;
        }
        ota.end();
        assert_eq!(&ota.flash().as_slice()[0x2000..0x2000 + image.len()], &image[..]);
    }

    #[test]
    fn begin_reports_success_even_when_erase_fails() {
        let mut ota = OtaSession::new(RejectingFlash, OtaConfig::default());
        assert!(ota.begin(0x1000, 0x2000));
        assert!(matches!(ota.state(), SessionState::Active { .. }));
    }

    #[test]
    fn rejected_write_is_propagated() {
        let mut ota = OtaSession::new(RejectingFlash, OtaConfig::default());
        ota.begin(0x1000, 0x2000);
        assert_eq!(
            ota.write(&[0; 16], 0x1000, 16),
            Err(Error::StorageFailure("write rejected"))
        );
    }

    #[test]
    fn writes_outside_the_session_are_refused() {
        let mut ota = session();
        assert_eq!(
            ota.write(&[0; 4], 0x1000, 4),
            Err(Error::InvalidState("no active OTA session"))
        );

        ota.begin(0x1000, 0x100);
        assert_eq!(ota.write(&[0; 4], 0x0FFE, 4), Err(Error::OutOfRange));
        assert_eq!(ota.write(&[0; 4], 0x10FD, 4), Err(Error::OutOfRange));
        assert_eq!(ota.write(&[0; 4], 0x10FC, 4), Ok(4));
        assert!(ota.write(&[0; 4], 0x1000, 8).is_err());

        ota.end();
        assert!(ota.write(&[0; 4], 0x1000, 4).is_err());
    }

    #[test]
    fn end_without_begin_is_an_error() {
        let mut ota = session();
        assert_eq!(ota.end(), UpdateComplete::Error);
        assert!(!ota.flashed_status());
    }

    #[test]
    fn flashed_status_latches_until_reset() {
        let mut ota = session();
        ota.begin(0x1000, 0x10);
        assert!(!ota.flashed_status());
        ota.end();
        assert!(ota.flashed_status());

        ota.reset_flashed_status();
        assert!(!ota.flashed_status());
        assert_eq!(ota.state(), SessionState::Idle);
    }

    #[test]
    fn restarting_a_session_abandons_the_old_one() {
        let mut ota = session();
        ota.begin(0x1000, 0x10);
        ota.begin(0x2000, 0x10);
        assert_eq!(
            ota.state(),
            SessionState::Active {
                address: 0x2000,
                length: 0x10
            }
        );
        assert_eq!(ota.write(&[1; 4], 0x1000, 4), Err(Error::OutOfRange));
    }

    #[test]
    fn hints_come_from_config() {
        let config = OtaConfig {
            window: OtaWindow::new(0x4000, 0x800),
            chunk_size: 256,
            session_timeout: 30,
        };
        let ota = OtaSession::new(MemoryFlash::new(0), config);
        assert_eq!(ota.flash_address(), 0x4000);
        assert_eq!(ota.flash_length(), 0x800);
        assert_eq!(ota.chunk_size(), 256);
        assert_eq!(ota.session_timeout(), 30);
    }
}

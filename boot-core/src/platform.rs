// SPDX-License-Identifier: MIT

//! Capability contract between the core and the board.

/// Failure of a platform I/O capability.
///
/// The core never retries failed flash I/O, so no detail beyond "failed" is
/// carried; the platform implementation is the place to log specifics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IoError;

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "platform i/o error")
    }
}

/// Everything the loader needs from the hardware.
///
/// `decrypt_reset`/`decrypt` and `kick_watchdog` have no-op defaults, so a
/// board without a stream cipher or watchdog implements nothing for them.
pub trait Platform {
    /// Monotonic millisecond tick; wraps at `u32::MAX`.
    fn now_ms(&mut self) -> u32;

    /// Pop one received byte, if any.
    fn rx_byte(&mut self) -> Option<u8>;

    /// Drop everything pending on the receive path.
    fn clear_rx(&mut self);

    /// Transmit all of `data`.
    fn tx_all(&mut self, data: &[u8]) -> Result<(), IoError>;

    fn flash_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), IoError>;

    fn flash_write(&mut self, addr: u32, data: &[u8]) -> Result<(), IoError>;

    /// Erase `[addr, addr + len)`. The caller chunks by page size and kicks
    /// the watchdog between pages.
    fn flash_erase(&mut self, addr: u32, len: u32) -> Result<(), IoError>;

    fn kick_watchdog(&mut self) {}

    /// Uncompressed public key the image signature is verified against.
    fn public_key(&self) -> &[u8; 64];

    /// Rewind the streaming decryptor to the start of the keystream.
    fn decrypt_reset(&mut self) {}

    /// Decrypt `src` into `dst[..src.len()]`, advancing the keystream.
    ///
    /// The default is a plain copy, for links carrying unencrypted images.
    fn decrypt(&mut self, src: &[u8], dst: &mut [u8]) {
        dst[..src.len()].copy_from_slice(src);
    }

    /// Quiesce peripherals before handing over to the application.
    fn deinit_for_jump(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    /// Set the stack pointer from the word at `addr`, load the reset vector
    /// at `addr + 4` and call into it. Never returns on success.
    fn jump_to(&mut self, addr: u32) -> !;
}

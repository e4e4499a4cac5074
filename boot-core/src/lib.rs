// SPDX-License-Identifier: MIT

//! Platform-independent core of the serial bootloader.
//!
//! The core owns the upgrade state machine, the application header model,
//! the validation pipelines and the cross-reset handoff region. Everything
//! the hardware must provide (time, serial bytes, flash, watchdog, the
//! final jump) comes in through the [`Platform`](platform::Platform)
//! capability trait; the cryptographic primitives come in through the
//! [`Sha256`] and [`EcdsaVerify`] traits below. The crate has no
//! dependency on any HAL and its whole test suite runs on the host.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod handoff;
pub mod image;
pub mod loader;
pub mod platform;


pub use config::Config;
pub use loader::{Loader, State};

/// Streaming SHA-256.
///
/// The image payload is hashed in chunks read back from flash, so the
/// primitive must support incremental feeding.
pub trait Sha256 {
    fn reset(&mut self);
    fn update(&mut self, data: &[u8]);
    fn finalize(&mut self) -> [u8; 32];

    fn digest(&mut self, data: &[u8]) -> [u8; 32] {
        self.reset();
        self.update(data);
        self.finalize()
    }
}

/// ECDSA signature verification on secp256k1.
pub trait EcdsaVerify {
    /// Verify `signature` over `msg` against an uncompressed 64-byte
    /// public key.
    fn verify_ecdsa(
        &self,
        msg: &[u8; 32],
        signature: &[u8; 64],
        pubkey: &[u8; 64],
    ) -> VerificationResult;
}

/// Verification result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum VerificationResult {
    // The values are arbitrary, but chosen to be different by more than one
    // bit to make glitching attacks more difficult.
    Valid = 0xcafebabe,
    Invalid = 0xdeadbeef,
}

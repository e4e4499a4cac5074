// SPDX-License-Identifier: MIT

//! Cross-reset handoff with the resident application.
//!
//! A 32-byte CRC-sealed block in a non-initialized RAM section. The loader
//! refreshes it on every reset; the application reads the boot reason and
//! clears the boot count once it considers itself healthy. Either side
//! finding a bad CRC starts over from defaults.

use boot_protocol::crc::crc8;

/// Size of the shared block.
pub const HANDOFF_SIZE: usize = 32;

/// Only layout this loader writes and accepts.
pub const LAYOUT_VERSION: u8 = 1;

const OFF_CRC: usize = 0;
const OFF_LAYOUT_VERSION: usize = 1;
const OFF_BOOT_VERSION: usize = 8;
const OFF_BOOT_REASON: usize = 12;
const OFF_BOOT_COUNT: usize = 13;

const _: () = assert!(OFF_BOOT_COUNT < HANDOFF_SIZE);

/// Why the loader is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BootReason {
    /// Nothing requested: jump into the application.
    None = 0,
    /// Stay in the loader and wait for the boot manager.
    Com = 1,
    /// Boot from an external store. Reserved, drives no behavior yet.
    ExternalFlash = 2,
}

/// Sole-owner view over the shared block.
pub struct Handoff<'a> {
    mem: &'a mut [u8; HANDOFF_SIZE],
}

impl<'a> Handoff<'a> {
    pub fn new(mem: &'a mut [u8; HANDOFF_SIZE]) -> Self {
        Handoff { mem }
    }

    /// Whether the stored CRC matches the block contents.
    pub fn is_valid(&self) -> bool {
        crc8(&self.mem[OFF_LAYOUT_VERSION..]) == self.mem[OFF_CRC]
    }

    /// Reset-time refresh.
    ///
    /// A valid block keeps its state and counts one more boot (saturating);
    /// an invalid one is reset to defaults. Either way the layout version
    /// and loader version are stamped and the CRC re-sealed. Returns whether
    /// the block was valid coming in.
    pub fn init(&mut self, boot_version: u32) -> bool {
        let valid = self.is_valid();
        if valid {
            let count = self.mem[OFF_BOOT_COUNT];
            self.mem[OFF_BOOT_COUNT] = count.saturating_add(1);
        } else {
            self.mem.fill(0);
        }
        self.mem[OFF_LAYOUT_VERSION] = LAYOUT_VERSION;
        self.mem[OFF_BOOT_VERSION..OFF_BOOT_VERSION + 4]
            .copy_from_slice(&boot_version.to_le_bytes());
        self.seal();
        valid
    }

    pub fn boot_version(&self) -> u32 {
        u32::from_le_bytes(
            self.mem[OFF_BOOT_VERSION..OFF_BOOT_VERSION + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn boot_reason(&self) -> BootReason {
        match self.mem[OFF_BOOT_REASON] {
            1 => BootReason::Com,
            2 => BootReason::ExternalFlash,
            _ => BootReason::None,
        }
    }

    pub fn boot_count(&self) -> u8 {
        self.mem[OFF_BOOT_COUNT]
    }

    pub fn set_boot_reason(&mut self, reason: BootReason) {
        self.mem[OFF_BOOT_REASON] = reason as u8;
        self.seal();
    }

    pub fn set_boot_count(&mut self, count: u8) {
        self.mem[OFF_BOOT_COUNT] = count;
        self.seal();
    }

    fn seal(&mut self) {
        self.mem[OFF_CRC] = crc8(&self.mem[OFF_LAYOUT_VERSION..]);
    }
}

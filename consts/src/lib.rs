// SPDX-License-Identifier: MIT

//! Memory map and version constants for the nRF52840 build.

#![no_std]

/// Loader version, 0x00MMmmpp, reported over INFO and stamped into the
/// handoff region.
pub const BOOT_VERSION: u32 = 0x0001_0000;

pub const FLASH_SIZE: u32 = 0x0010_0000;
pub const FLASH_PAGE: u32 = 4096;

/// The loader owns the first 64 KiB of flash.
pub const BASE_BOOTLOADER_ADDR: u32 = 0x0000_0000;
pub const BOOTLOADER_SIZE: u32 = 0x0001_0000;

/// Resident application header, directly behind the loader.
pub const APP_HEAD_ADDR: u32 = 0x0001_0000;
/// Application vector table; 256-byte aligned, right after the header.
pub const APP_START_ADDR: u32 = 0x0001_0100;
/// Largest accepted payload: the rest of flash.
pub const APP_SIZE_MAX: u32 = FLASH_SIZE - APP_START_ADDR;

pub const RAM_BASE: u32 = 0x2000_0000;
pub const RAM_SIZE: u32 = 0x0004_0000;
/// Handoff region: the last 32 bytes of RAM, kept out of the loader's and
/// the application's linker images.
pub const SHARED_MEM_ADDR: u32 = RAM_BASE + RAM_SIZE - 32;

/// Resets without the application reporting healthy before the loader
/// gives up on the image.
pub const BOOT_CNT_LIMIT: u8 = 5;

// TODO: replace with the production signing key before release.
pub const PUBLIC_KEY: [u8; 64] = [0; 64];

/// Transfer decryption key material, only used by `crypto` builds.
pub const AES_KEY: [u8; 16] = [0; 16];
pub const AES_IV: [u8; 16] = [0; 16];

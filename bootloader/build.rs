// SPDX-License-Identifier: MIT

//! Generates `memory.x` from the shared memory map so the linker script can
//! never drift from the constants the loader validates against. The flash
//! region is the loader's reserved partition; the last 32 bytes of RAM are
//! left out of the image for the handoff region.

use boot_consts::{BASE_BOOTLOADER_ADDR, BOOTLOADER_SIZE, RAM_BASE, RAM_SIZE};
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let memory_x_content = format!(
        r##"
        MEMORY
        {{
            FLASH (rx) : ORIGIN = {:#X}, LENGTH = {:#X}
            /* Top 32 bytes are the handoff region shared with the app. */
            RAM : ORIGIN = {:#X}, LENGTH = {:#X}
        }}
        "##,
        BASE_BOOTLOADER_ADDR,
        BOOTLOADER_SIZE,
        RAM_BASE,
        RAM_SIZE - 32,
    );

    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x_content.as_bytes())
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}

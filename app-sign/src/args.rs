// SPDX-License-Identifier: MIT

//! Command line arguments.

use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(name = "app-sign", about = "Insert and sign the application header")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Wrap a raw application binary in a header.
    Gen {
        /// The raw application binary.
        #[clap(short, long)]
        input: PathBuf,
        /// Path to write the wrapped image.
        #[clap(short, long)]
        output: PathBuf,
        /// Flash address the header will be written to.
        #[clap(long, value_parser = parse_u32, default_value_t = boot_consts::APP_HEAD_ADDR)]
        image_addr: u32,
        /// Software version to declare, e.g. 0x01020300.
        #[clap(long, value_parser = parse_u32)]
        sw_ver: u32,
        /// Hardware version to declare.
        #[clap(long, value_parser = parse_u32)]
        hw_ver: u32,
        /// Hex-encoded secp256k1 secret key file; the image is signed when
        /// given, CRC-protected otherwise.
        #[clap(long)]
        secret: Option<PathBuf>,
    },
    /// Dump the header of a wrapped image.
    Dump {
        /// The wrapped image.
        #[clap(short, long)]
        input: PathBuf,
    },
}

fn parse_u32(raw: &str) -> Result<u32, String> {
    let raw = raw.trim();
    let (digits, radix) = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (raw, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

// SPDX-License-Identifier: MIT

//! Post-build tool: wraps a raw application binary in the 256-byte header
//! the bootloader validates, filling in the payload CRC-32 or an ECDSA
//! signature over its SHA-256.

use {
    boot_core::image::{HeaderError, ImageHeader, HEADER_SIZE},
    boot_protocol::crc::crc32,
    colored::Colorize,
    sha2::Digest,
    std::path::Path,
};

mod args;


fn main() -> std::process::ExitCode {
    let args = <args::Args as clap::Parser>::parse();
    match run(args.command, &mut std::io::stdout().lock()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".bold().red());
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(command: args::Command, stdout: &mut impl std::io::Write) -> Result<(), Error> {
    match command {
        args::Command::Gen {
            input,
            output,
            image_addr,
            sw_ver,
            hw_ver,
            secret,
        } => gen(&input, &output, image_addr, sw_ver, hw_ver, secret.as_deref(), stdout),
        args::Command::Dump { input } => dump(&input, stdout),
    }
}

fn gen(
    input: &Path,
    output: &Path,
    image_addr: u32,
    sw_ver: u32,
    hw_ver: u32,
    secret: Option<&Path>,
    stdout: &mut impl std::io::Write,
) -> Result<(), Error> {
    let mut payload = std::fs::read(input).map_err(Error::ReadInput)?;
    // Pad to the flash write granularity; the declared size, CRC and hash
    // all cover the padded payload.
    while payload.len() % 4 != 0 {
        payload.push(0xFF);
    }
    let size = u32::try_from(payload.len()).map_err(|_| Error::PayloadTooLong)?;

    let mut header = ImageHeader::new(image_addr, size, sw_ver, hw_ver);
    match secret {
        Some(path) => {
            let key = read_secret_key(path)?;
            let hash: [u8; 32] = sha2::Sha256::digest(&payload).into();
            let secp = secp256k1::Secp256k1::new();
            let signature = secp
                .sign_ecdsa(&secp256k1::Message::from_digest(hash), &key)
                .serialize_compact();
            header.set_signature(hash, signature);

            // The key the loader must hold, uncompressed, without the
            // 0x04 tag byte.
            let pubkey = key.public_key(&secp).serialize_uncompressed();
            writeln!(stdout, "{:10} {}", "pubkey".bold(), hex::encode(&pubkey[1..]))
                .map_err(Error::Stdout)?;
        }
        None => header.set_image_crc(crc32(&payload)),
    }

    let mut image = vec![0u8; HEADER_SIZE + payload.len()];
    let head: &mut [u8; HEADER_SIZE] = (&mut image[..HEADER_SIZE]).try_into().unwrap();
    header.serialize(head);
    image[HEADER_SIZE..].copy_from_slice(&payload);
    std::fs::write(output, &image).map_err(Error::WriteOutput)?;

    writeln!(
        stdout,
        "{:10} {} ({})",
        "wrote".bold(),
        output.display(),
        humansize::format_size(image.len() as u64, humansize::BINARY),
    )
    .map_err(Error::Stdout)?;
    Ok(())
}

fn dump(input: &Path, stdout: &mut impl std::io::Write) -> Result<(), Error> {
    let data = std::fs::read(input).map_err(Error::ReadInput)?;
    let head: &[u8; HEADER_SIZE] = data
        .get(..HEADER_SIZE)
        .ok_or(Error::NoHeader)?
        .try_into()
        .unwrap();
    let header = ImageHeader::parse(head).map_err(Error::Header)?;

    let mut line = |name: &str, value: String| {
        writeln!(stdout, "{:10} {value}", name.bold()).map_err(Error::Stdout)
    };
    line(
        "type",
        match header.image_type() {
            Some(t) => format!("{t:?}"),
            None => "unknown".into(),
        },
    )?;
    line(
        "integrity",
        match header.signature_type() {
            Some(t) => format!("{t:?}"),
            None => "unknown".into(),
        },
    )?;
    line("addr", format!("{:#010x}", header.image_addr()))?;
    line(
        "size",
        format!(
            "{} ({})",
            humansize::format_size(header.image_size() as u64, humansize::BINARY),
            header.image_size(),
        ),
    )?;
    line("crc", format!("{:#010x}", header.image_crc()))?;
    line("sw_ver", format!("{:#010x}", header.sw_ver()))?;
    line("hw_ver", format!("{:#010x}", header.hw_ver()))?;
    line("hash", hex::encode(header.hash()))?;
    line("signature", hex::encode(&header.signature()[..32]))?;
    line("", hex::encode(&header.signature()[32..]))?;
    Ok(())
}

fn read_secret_key(path: &Path) -> Result<secp256k1::SecretKey, Error> {
    let text = std::fs::read_to_string(path).map_err(Error::ReadSecret)?;
    let bytes = hex::decode(text.trim()).map_err(|_| Error::BadSecretHex)?;
    secp256k1::SecretKey::from_slice(&bytes).map_err(|_| Error::BadSecretKey)
}

#[derive(Debug)]
enum Error {
    ReadInput(std::io::Error),
    WriteOutput(std::io::Error),
    ReadSecret(std::io::Error),
    BadSecretHex,
    BadSecretKey,
    PayloadTooLong,
    NoHeader,
    Header(HeaderError),
    Stdout(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadInput(e) => write!(f, "cannot read input file: {e}"),
            Self::WriteOutput(e) => write!(f, "cannot write output file: {e}"),
            Self::ReadSecret(e) => write!(f, "cannot read secret key file: {e}"),
            Self::BadSecretHex => write!(f, "secret key file is not hex"),
            Self::BadSecretKey => write!(f, "secret key is not a valid secp256k1 key"),
            Self::PayloadTooLong => write!(f, "input does not fit a 32-bit image size"),
            Self::NoHeader => write!(f, "input is shorter than one header"),
            Self::Header(e) => write!(f, "bad header: {e}"),
            Self::Stdout(e) => write!(f, "cannot write to stdout: {e}"),
        }
    }
}

// SPDX-License-Identifier: MIT

//! Application image header and the validation pipelines.
//!
//! The 256-byte header sits at a fixed flash address in front of the image
//! payload. Byte 0 is a CRC-8 over the rest of the header; everything else
//! is little-endian at a fixed offset. Pre-validation judges a header
//! received over the wire before anything is erased; post-validation judges
//! the resident header plus the freshly written payload right before the
//! loader is willing to jump.

use boot_protocol::crc::{crc8, CRC32};
use boot_protocol::Status;

use crate::config::Config;
use crate::platform::Platform;
use crate::{EcdsaVerify, Sha256, VerificationResult};

/// Size of the application header on flash.
pub const HEADER_SIZE: usize = 256;

/// Only accepted header layout version.
pub const HEADER_VERSION: u8 = 1;

// Field offsets. Byte 0 is the CRC and is excluded from it.
const OFF_CRC: usize = 0;
const OFF_HDR_VERSION: usize = 1;
const OFF_IMAGE_TYPE: usize = 2;
const OFF_SIGNATURE_TYPE: usize = 3;
const OFF_IMAGE_ADDR: usize = 16;
const OFF_IMAGE_SIZE: usize = 20;
const OFF_IMAGE_CRC: usize = 24;
const OFF_SW_VER: usize = 28;
const OFF_HW_VER: usize = 32;
const OFF_SIGNATURE: usize = 36;
const OFF_HASH: usize = 100;

const _: () = assert!(OFF_HASH + 32 <= HEADER_SIZE);

/// Image kind carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ImageType {
    App = 0x01,
}

/// Integrity scheme declared by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SignatureType {
    /// Payload covered by the CRC-32 in `image_crc`.
    None = 0x00,
    /// Payload covered by the ECDSA signature over its SHA-256.
    Ecdsa = 0x01,
}

/// Errors from [`ImageHeader::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderError {
    /// Stored CRC does not match the header bytes.
    Crc,
}

impl core::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Crc => write!(f, "header crc mismatch"),
        }
    }
}

/// Decoded application header.
///
/// Unknown type and signature bytes survive a parse/serialize round trip;
/// rejecting them is validation's job, not the codec's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    hdr_version: u8,
    image_type: u8,
    signature_type: u8,
    image_addr: u32,
    image_size: u32,
    image_crc: u32,
    sw_ver: u32,
    hw_ver: u32,
    signature: [u8; 64],
    hash: [u8; 32],
}

impl ImageHeader {
    /// A fresh, unsigned application header.
    pub fn new(image_addr: u32, image_size: u32, sw_ver: u32, hw_ver: u32) -> Self {
        ImageHeader {
            hdr_version: HEADER_VERSION,
            image_type: ImageType::App as u8,
            signature_type: SignatureType::None as u8,
            image_addr,
            image_size,
            image_crc: 0,
            sw_ver,
            hw_ver,
            signature: [0; 64],
            hash: [0; 32],
        }
    }

    /// Parse a header buffer, enforcing its CRC.
    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Result<Self, HeaderError> {
        if crc8(&buf[OFF_HDR_VERSION..]) != buf[OFF_CRC] {
            return Err(HeaderError::Crc);
        }

        let word = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let mut signature = [0; 64];
        signature.copy_from_slice(&buf[OFF_SIGNATURE..OFF_SIGNATURE + 64]);
        let mut hash = [0; 32];
        hash.copy_from_slice(&buf[OFF_HASH..OFF_HASH + 32]);

        Ok(ImageHeader {
            hdr_version: buf[OFF_HDR_VERSION],
            image_type: buf[OFF_IMAGE_TYPE],
            signature_type: buf[OFF_SIGNATURE_TYPE],
            image_addr: word(OFF_IMAGE_ADDR),
            image_size: word(OFF_IMAGE_SIZE),
            image_crc: word(OFF_IMAGE_CRC),
            sw_ver: word(OFF_SW_VER),
            hw_ver: word(OFF_HW_VER),
            signature,
            hash,
        })
    }

    /// Serialize the header, filling in its CRC. Exactly [`HEADER_SIZE`]
    /// bytes are written.
    pub fn serialize(&self, buf: &mut [u8; HEADER_SIZE]) {
        buf.fill(0);
        buf[OFF_HDR_VERSION] = self.hdr_version;
        buf[OFF_IMAGE_TYPE] = self.image_type;
        buf[OFF_SIGNATURE_TYPE] = self.signature_type;
        buf[OFF_IMAGE_ADDR..OFF_IMAGE_ADDR + 4].copy_from_slice(&self.image_addr.to_le_bytes());
        buf[OFF_IMAGE_SIZE..OFF_IMAGE_SIZE + 4].copy_from_slice(&self.image_size.to_le_bytes());
        buf[OFF_IMAGE_CRC..OFF_IMAGE_CRC + 4].copy_from_slice(&self.image_crc.to_le_bytes());
        buf[OFF_SW_VER..OFF_SW_VER + 4].copy_from_slice(&self.sw_ver.to_le_bytes());
        buf[OFF_HW_VER..OFF_HW_VER + 4].copy_from_slice(&self.hw_ver.to_le_bytes());
        buf[OFF_SIGNATURE..OFF_SIGNATURE + 64].copy_from_slice(&self.signature);
        buf[OFF_HASH..OFF_HASH + 32].copy_from_slice(&self.hash);
        buf[OFF_CRC] = crc8(&buf[OFF_HDR_VERSION..]);
    }

    pub fn hdr_version(&self) -> u8 {
        self.hdr_version
    }

    pub fn image_type(&self) -> Option<ImageType> {
        match self.image_type {
            0x01 => Some(ImageType::App),
            _ => None,
        }
    }

    pub fn signature_type(&self) -> Option<SignatureType> {
        match self.signature_type {
            0x00 => Some(SignatureType::None),
            0x01 => Some(SignatureType::Ecdsa),
            _ => None,
        }
    }

    pub fn image_addr(&self) -> u32 {
        self.image_addr
    }

    /// Payload size in bytes, header excluded.
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn image_crc(&self) -> u32 {
        self.image_crc
    }

    pub fn sw_ver(&self) -> u32 {
        self.sw_ver
    }

    pub fn hw_ver(&self) -> u32 {
        self.hw_ver
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Record the payload CRC-32 for an unsigned image.
    pub fn set_image_crc(&mut self, crc: u32) {
        self.image_crc = crc;
        self.signature_type = SignatureType::None as u8;
    }

    /// Attach the payload hash and its ECDSA signature.
    pub fn set_signature(&mut self, hash: [u8; 32], signature: [u8; 64]) {
        self.hash = hash;
        self.signature = signature;
        self.signature_type = SignatureType::Ecdsa as u8;
    }
}

/// Read and CRC-check the resident header.
pub fn read_resident_header<P: Platform>(platform: &mut P, cfg: &Config) -> Option<ImageHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    platform.flash_read(cfg.app_head_addr, &mut buf).ok()?;
    ImageHeader::parse(&buf).ok()
}

/// Judge a header received in a PREPARE payload, before any erase.
///
/// Every predicate runs; the failures OR into one status byte.
pub fn pre_validate(
    header: &ImageHeader,
    resident: Option<&ImageHeader>,
    cfg: &Config,
    pubkey: &[u8; 64],
    ecdsa: &impl EcdsaVerify,
) -> Status {
    let mut status = Status::OK;

    if header.hdr_version() != HEADER_VERSION {
        status |= Status::VALIDATION;
    }
    if header.image_type() != Some(ImageType::App) {
        status |= Status::VALIDATION;
    }
    // An arbitrary image_addr would let the manager aim the erase anywhere,
    // the loader itself included.
    if header.image_addr() != cfg.app_head_addr {
        status |= Status::VALIDATION;
    }
    if let Some(max) = cfg.app_size_max {
        if header.image_size() > max {
            status |= Status::FW_SIZE;
        }
    }
    if let Some(limit) = cfg.sw_ver_limit {
        if header.sw_ver() > limit {
            status |= Status::FW_VER;
        }
    }
    if !cfg.allow_downgrade {
        if let Some(resident) = resident {
            if header.sw_ver() <= resident.sw_ver() {
                status |= Status::FW_VER;
            }
        }
    }
    if let Some(limit) = cfg.hw_ver_limit {
        if header.hw_ver() > limit {
            status |= Status::HW_VER;
        }
    }
    match header.signature_type() {
        Some(SignatureType::Ecdsa) => {
            // Only binds the declared hash/signature pair; the payload is
            // re-verified against it after writing.
            if ecdsa.verify_ecdsa(header.hash(), header.signature(), pubkey)
                != VerificationResult::Valid
            {
                status |= Status::SIGNATURE;
            }
        }
        Some(SignatureType::None) => {
            if cfg.require_signature {
                status |= Status::SIGNATURE;
            }
        }
        None => status |= Status::VALIDATION,
    }

    status
}

/// Judge the resident header and the written payload before jumping.
pub fn post_validate<P: Platform>(
    platform: &mut P,
    sha: &mut impl Sha256,
    ecdsa: &impl EcdsaVerify,
    cfg: &Config,
) -> Status {
    let Some(header) = read_resident_header(platform, cfg) else {
        return Status::VALIDATION;
    };

    let payload_addr = cfg.app_head_addr + HEADER_SIZE as u32;
    match header.signature_type() {
        Some(SignatureType::Ecdsa) => {
            sha.reset();
            if hash_flash(platform, sha, payload_addr, header.image_size()).is_err() {
                return Status::VALIDATION;
            }
            let digest = sha.finalize();
            let pubkey = *platform.public_key();
            if ecdsa.verify_ecdsa(&digest, header.signature(), &pubkey)
                != VerificationResult::Valid
            {
                return Status::SIGNATURE;
            }
            Status::OK
        }
        Some(SignatureType::None) => {
            match crc32_flash(platform, payload_addr, header.image_size()) {
                Ok(crc) if crc == header.image_crc() => Status::OK,
                _ => Status::VALIDATION,
            }
        }
        None => Status::VALIDATION,
    }
}

fn hash_flash<P: Platform>(
    platform: &mut P,
    sha: &mut impl Sha256,
    addr: u32,
    len: u32,
) -> Result<(), crate::platform::IoError> {
    let mut buf = [0u8; HEADER_SIZE];
    let mut off = 0;
    while off < len {
        let chunk = (len - off).min(buf.len() as u32) as usize;
        platform.flash_read(addr + off, &mut buf[..chunk])?;
        sha.update(&buf[..chunk]);
        off += chunk as u32;
    }
    Ok(())
}

fn crc32_flash<P: Platform>(
    platform: &mut P,
    addr: u32,
    len: u32,
) -> Result<u32, crate::platform::IoError> {
    let mut digest = CRC32.digest();
    let mut buf = [0u8; HEADER_SIZE];
    let mut off = 0;
    while off < len {
        let chunk = (len - off).min(buf.len() as u32) as usize;
        platform.flash_read(addr + off, &mut buf[..chunk])?;
        digest.update(&buf[..chunk]);
        off += chunk as u32;
    }
    Ok(digest.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_protocol::crc::crc32;

    fn sample() -> ImageHeader {
        let mut header = ImageHeader::new(0x0001_0000, 2048, 0x0100_0000, 0x0100_0000);
        header.set_image_crc(0xDEAD_BEEF);
        header
    }

    #[test]
    fn serialize_parse_round_trip() {
        let header = sample();
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf);
        let parsed = ImageHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn layout_is_pinned() {
        let mut header = sample();
        header.set_signature([0xAB; 32], [0xCD; 64]);
        let mut buf = [0u8; HEADER_SIZE];
        header.serialize(&mut buf);

        assert_eq!(buf[1], HEADER_VERSION);
        assert_eq!(buf[2], 0x01); // APP
        assert_eq!(buf[3], 0x01); // ECDSA
        assert_eq!(&buf[4..16], &[0; 12]);
        assert_eq!(buf[16..20], 0x0001_0000u32.to_le_bytes());
        assert_eq!(buf[20..24], 2048u32.to_le_bytes());
        assert_eq!(buf[24..28], 0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(buf[28..32], 0x0100_0000u32.to_le_bytes());
        assert_eq!(buf[32..36], 0x0100_0000u32.to_le_bytes());
        assert_eq!(&buf[36..100], &[0xCD; 64][..]);
        assert_eq!(&buf[100..132], &[0xAB; 32][..]);
        assert!(buf[132..].iter().all(|&b| b == 0));
        // The CRC at byte 0 covers everything behind it.
        assert_eq!(buf[0], crc8(&buf[1..]));
    }

    #[test]
    fn flipped_bit_fails_the_crc() {
        let mut buf = [0u8; HEADER_SIZE];
        sample().serialize(&mut buf);
        buf[OFF_SW_VER] ^= 0x80;
        assert_eq!(ImageHeader::parse(&buf), Err(HeaderError::Crc));
    }

    #[test]
    fn unknown_type_bytes_round_trip() {
        let mut buf = [0u8; HEADER_SIZE];
        sample().serialize(&mut buf);
        buf[OFF_IMAGE_TYPE] = 0x7E;
        buf[OFF_SIGNATURE_TYPE] = 0x7F;
        buf[OFF_CRC] = crc8(&buf[OFF_HDR_VERSION..]);

        let parsed = ImageHeader::parse(&buf).unwrap();
        assert_eq!(parsed.image_type(), None);
        assert_eq!(parsed.signature_type(), None);

        let mut out = [0u8; HEADER_SIZE];
        parsed.serialize(&mut out);
        assert_eq!(out, buf);
    }

    #[test]
    fn image_crc_helper_matches_reference() {
        let payload = [0x42u8; 100];
        let mut header = ImageHeader::new(0, payload.len() as u32, 1, 1);
        header.set_image_crc(crc32(&payload));
        assert_eq!(header.image_crc(), crc32(&payload));
        assert_eq!(header.signature_type(), Some(SignatureType::None));
    }
}

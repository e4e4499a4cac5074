// SPDX-License-Identifier: MIT

//! Integrity primitives.
//!
//! CRC-8 covers message headers, the application header and the handoff
//! region; CRC-32 covers the image payload when it carries no signature.

use crc::{Algorithm, Crc};

/// CRC-8, polynomial 0x07, custom seed, MSB first, no reflection.
pub const CRC8_ALG: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xB6,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x59,
    residue: 0x00,
};

/// CRC-32, polynomial 0x04C11DB7, custom seed, MSB first, no reflection.
pub const CRC32_ALG: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0x1010_1010,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x6C0F_0892,
    residue: 0x0000_0000,
};

pub const CRC8: Crc<u8> = Crc::<u8>::new(&CRC8_ALG);
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC32_ALG);

/// One-shot CRC-8 over `data`.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// One-shot CRC-32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference values computed with an independent bit-by-bit model.

    #[test]
    fn crc8_check_value() {
        assert_eq!(crc8(b"123456789"), 0x59);
    }

    #[test]
    fn crc8_of_nothing_is_the_seed() {
        assert_eq!(crc8(&[]), 0xB6);
    }

    #[test]
    fn crc8_single_bytes() {
        assert_eq!(crc8(&[0x00]), 0x0B);
        assert_eq!(crc8(&[0xB2]), 0x1C);
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0x6C0F_0892);
    }

    #[test]
    fn crc32_ascending_bytes() {
        let data: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(crc32(&data), 0x352E_DE2E);
    }

    #[test]
    fn crc32_streaming_matches_one_shot() {
        let data: [u8; 16] = core::array::from_fn(|i| i as u8);
        let mut digest = CRC32.digest();
        digest.update(&data[..7]);
        digest.update(&data[7..]);
        assert_eq!(digest.finalize(), crc32(&data));
    }
}

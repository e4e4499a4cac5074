// SPDX-License-Identifier: MIT

//! Target-side cryptographic primitives behind the core's traits.

use boot_core::{EcdsaVerify, Sha256, VerificationResult};
use micro_ecc_sys::{uECC_secp256k1, uECC_valid_public_key, uECC_verify};
use sha2::Digest;

pub struct Sha(sha2::Sha256);

impl Sha {
    pub fn new() -> Self {
        Sha(sha2::Sha256::new())
    }
}

impl Sha256 for Sha {
    fn reset(&mut self) {
        self.0 = sha2::Sha256::new();
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finalize(&mut self) -> [u8; 32] {
        self.0.finalize_reset().into()
    }
}

pub struct Ecc;

impl EcdsaVerify for Ecc {
    fn verify_ecdsa(
        &self,
        msg: &[u8; 32],
        signature: &[u8; 64],
        pubkey: &[u8; 64],
    ) -> VerificationResult {
        const UECC_SUCCESS: i32 = 1;

        let valid = unsafe { uECC_valid_public_key(pubkey.as_ptr(), uECC_secp256k1()) };
        if valid != UECC_SUCCESS {
            return VerificationResult::Invalid;
        }

        let res = unsafe {
            uECC_verify(
                pubkey.as_ptr(),
                msg.as_ptr(),
                msg.len() as u32,
                signature.as_ptr(),
                uECC_secp256k1(),
            )
        };

        // Read the result back through a volatile pointer so a single
        // glitched branch cannot fake a pass.
        let res_ptr = &res as *const i32;
        if unsafe { res_ptr.read_volatile() } == UECC_SUCCESS {
            VerificationResult::Valid
        } else {
            VerificationResult::Invalid
        }
    }
}

#[cfg(feature = "crypto")]
mod decrypt {
    use aes::Aes128;
    use boot_consts::{AES_IV, AES_KEY};
    use ctr::cipher::{KeyIvInit, StreamCipher};
    use ctr::Ctr128BE;

    /// AES-CTR keystream over the whole transfer; PREPARE restarts it via
    /// the loader's IDLE entry.
    pub struct Decryptor {
        cipher: Ctr128BE<Aes128>,
    }

    impl Decryptor {
        pub fn new() -> Self {
            Decryptor {
                cipher: Ctr128BE::<Aes128>::new(&AES_KEY.into(), &AES_IV.into()),
            }
        }

        pub fn reset(&mut self) {
            self.cipher = Ctr128BE::<Aes128>::new(&AES_KEY.into(), &AES_IV.into());
        }

        pub fn decrypt(&mut self, src: &[u8], dst: &mut [u8]) {
            let dst = &mut dst[..src.len()];
            dst.copy_from_slice(src);
            self.cipher.apply_keystream(dst);
        }
    }
}

#[cfg(feature = "crypto")]
pub use decrypt::Decryptor;

// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! HMAC-SHA256 and the counter-mode KDF used by hashed ElGamal.
//!
//! Key blocks follow NIST SP 800-108 counter mode: the message is
//! `be32(index) || data || be32(length_bits)`. A zero length with a zero
//! index selects plain HMAC, which is how the MAC step is keyed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const HMAC_OUTPUT_LEN: usize = 32;

/// Plain `HMAC-SHA256(key, data)`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HMAC_OUTPUT_LEN] {
    // HMAC-SHA256 accepts keys of any length.
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// One derived key block.
///
/// `length_bits` is the total bit length of the keystream being derived and
/// `index` the block counter; block 0 is reserved for the MAC key.
pub fn compute(key: &[u8], data: &[u8], length_bits: u32, index: u32) -> [u8; HMAC_OUTPUT_LEN] {
    if length_bits == 0 && index == 0 {
        return hmac_sha256(key, data);
    }
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(key).unwrap();
    mac.update(&index.to_be_bytes());
    mac.update(data);
    mac.update(&length_bits.to_be_bytes());
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn hmac_rfc4231_case_2() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let out = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        let expected = [
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn blocks_are_distinct() {
        let k = [7u8; 32];
        let b1 = compute(&k, b"seed", 512, 1);
        let b2 = compute(&k, b"seed", 512, 2);
        let mac_key = compute(&k, b"seed", 512, 0);
        assert_ne!(b1, b2);
        assert_ne!(b1, mac_key);
    }

    #[test]
    fn zero_length_zero_index_is_plain_hmac() {
        let k = [9u8; 32];
        assert_eq!(compute(&k, b"data", 0, 0), hmac_sha256(&k, b"data"));
    }
}

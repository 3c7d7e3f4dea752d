// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The Fiat-Shamir hash oracle.
//!
//! [`hash_elems`] feeds a SHA-256 stream with a `|`-delimited sequence of
//! canonical string forms and reduces the digest into `[0, Q)`. Every proof
//! challenge in the system derives from this transcript, so the
//! serialization here must stay byte-identical across implementations:
//! hex for group elements and byte strings, decimal for integers, `null`
//! for empty or zero values, and a recursive hash for nested lists.

use sha2::{Digest, Sha256};

use util::base16;

use crate::constants::CONTEXT_Q;
use crate::group::{ElementModP, ElementModQ, MAX_Q_SIZE};

/// Anything that can fold itself into the hash oracle as a single value.
pub trait CryptoHashable {
    fn crypto_hash(&self) -> ElementModQ;
}

/// One item of a [`hash_elems`] transcript.
pub enum HashInput<'a> {
    Null,
    U64(u64),
    Str(&'a str),
    Bytes(&'a [u8]),
    P(&'a ElementModP),
    Q(&'a ElementModQ),
    Hashable(&'a dyn CryptoHashable),
    List(Vec<HashInput<'a>>),
}

impl From<u64> for HashInput<'_> {
    fn from(v: u64) -> Self {
        HashInput::U64(v)
    }
}

impl<'a> From<&'a str> for HashInput<'a> {
    fn from(v: &'a str) -> Self {
        HashInput::Str(v)
    }
}

impl<'a> From<&'a String> for HashInput<'a> {
    fn from(v: &'a String) -> Self {
        HashInput::Str(v)
    }
}

impl<'a> From<&'a [u8]> for HashInput<'a> {
    fn from(v: &'a [u8]) -> Self {
        HashInput::Bytes(v)
    }
}

impl<'a> From<&'a Vec<u8>> for HashInput<'a> {
    fn from(v: &'a Vec<u8>) -> Self {
        HashInput::Bytes(v)
    }
}

impl<'a> From<&'a ElementModP> for HashInput<'a> {
    fn from(v: &'a ElementModP) -> Self {
        HashInput::P(v)
    }
}

impl<'a> From<&'a ElementModQ> for HashInput<'a> {
    fn from(v: &'a ElementModQ) -> Self {
        HashInput::Q(v)
    }
}

impl<'a> From<Vec<HashInput<'a>>> for HashInput<'a> {
    fn from(v: Vec<HashInput<'a>>) -> Self {
        HashInput::List(v)
    }
}

const DELIMITER: &[u8] = b"|";
const NULL_STRING: &str = "null";

fn hash_string(item: &HashInput) -> String {
    match item {
        HashInput::Null => NULL_STRING.to_string(),
        HashInput::U64(0) => NULL_STRING.to_string(),
        HashInput::U64(v) => v.to_string(),
        HashInput::Str("") => NULL_STRING.to_string(),
        HashInput::Str(s) => (*s).to_string(),
        HashInput::Bytes(b) => base16::bytes_to_hex(b),
        HashInput::P(p) => p.to_hex(),
        HashInput::Q(q) => q.to_hex(),
        HashInput::Hashable(h) => h.crypto_hash().to_hex(),
        HashInput::List(items) => {
            if items.is_empty() {
                NULL_STRING.to_string()
            } else {
                hash_elems(items).to_hex()
            }
        }
    }
}

/// Hashes a heterogeneous sequence into an exponent in `[0, Q)`.
pub fn hash_elems(items: &[HashInput]) -> ElementModQ {
    let mut hasher = Sha256::new();
    hasher.update(DELIMITER);
    if items.is_empty() {
        hasher.update(NULL_STRING.as_bytes());
        hasher.update(DELIMITER);
    } else {
        for item in items {
            hasher.update(hash_string(item).as_bytes());
            hasher.update(DELIMITER);
        }
    }

    let digest = hasher.finalize();
    debug_assert!(digest.len() == MAX_Q_SIZE);
    // Raw digests in [Q, 2^256) must map back into [0, Q).
    let raw = ElementModQ::from_bytes_be_unchecked(&digest);
    ElementModQ::from_limb_vec(CONTEXT_Q.reduce(raw.limbs()))
}

/// Two-character ASCII prefixes that domain-separate the hash contexts.
/// Collisions between contexts are impossible because every prefix is
/// distinct and is always the leading transcript item of its context.
pub struct HashPrefix;

impl HashPrefix {
    /// Parameter base hash.
    pub const PARAMETER_HASH: &'static str = "00";
    /// Manifest digest.
    pub const MANIFEST_HASH: &'static str = "01";
    /// Election (crypto) base hash.
    pub const BASE_HASH: &'static str = "02";
    /// Ballot selection encryption proof.
    pub const SELECTION_PROOF: &'static str = "04";
    /// Ballot contest data (hashed ElGamal session key).
    pub const CONTEST_DATA_SECRET: &'static str = "05";
    /// Ballot selection decryption proof.
    pub const SELECTION_DECRYPTION_PROOF: &'static str = "06";
    /// Guardian key proof.
    pub const GUARDIAN_KEY_PROOF: &'static str = "10";
    /// Guardian key-share encryption proof.
    pub const GUARDIAN_KEY_SHARE_PROOF: &'static str = "11";
    /// Election extended base hash.
    pub const EXTENDED_BASE_HASH: &'static str = "12";
    /// Selection nonce derivation.
    pub const SELECTION_NONCE: &'static str = "20";
    /// Contest (range) proof.
    pub const CONTEST_PROOF: &'static str = "21";
    /// Contest hash.
    pub const CONTEST_HASH: &'static str = "23";
    /// Ballot code.
    pub const BALLOT_CODE: &'static str = "24";
    /// Contest data secret key.
    pub const CONTEST_DATA_SECRET_KEY: &'static str = "25";
}

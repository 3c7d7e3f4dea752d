// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Exponential ElGamal and hashed ElGamal.
//!
//! Base-K encoding (EG 2.0) is primary: a vote `m` under nonce `r` becomes
//! `(g^r, K^(m+r))`. The legacy base-g encoding (`g^m * K^r`) remains
//! reachable through [`elgamal_encrypt_with_base`] for 1.0 compatibility.
//! Hashed ElGamal layers an HMAC-keyed XOR stream with MAC integrity over
//! the ElGamal pad, for arbitrary-length payloads such as write-in data.

use serde::{Deserialize, Serialize};
use tracing::trace;
use zeroize::Zeroize;

use crate::constants::TWO_MOD_Q;
use crate::discrete_log::DiscreteLog;
use crate::errors::{EgError, EgResult};
use crate::group::{
    ElementModP, ElementModQ, add_mod_q, div_mod_p, g_pow_p, mul_mod_p, pow_mod_p, sub_from_q,
};
use crate::hash::{CryptoHashable, HashInput, hash_elems};
use crate::kdf;
use crate::precompute::{PrecomputeBufferContext, PrecomputedEncryption};

/// Ciphertext blocks and MACs are 32 bytes.
pub const HASHED_CIPHERTEXT_BLOCK_LENGTH: usize = 32;
const HASHED_CIPHERTEXT_BLOCK_LENGTH_IN_BITS: u32 = (HASHED_CIPHERTEXT_BLOCK_LENGTH * 8) as u32;

/// Upper bound on the padded-data capacity of a hashed-ElGamal message.
pub const HASHED_CIPHERTEXT_MAX_PADDED_DATA_SIZE: usize = 512;

//-------------------------------------------------------------------------------------------------|

/// An ElGamal secret/public key pair. `K = g^s mod p`, with `K` flagged as a
/// fixed base for the exponent tables.
pub struct ElGamalKeyPair {
    secret_key: ElementModQ,
    public_key: ElementModP,
}

impl ElGamalKeyPair {
    /// Derives the pair from a secret in `[2, Q)`.
    pub fn from_secret(secret_key: &ElementModQ) -> EgResult<Self> {
        if secret_key < &*TWO_MOD_Q {
            return Err(EgError::SecretKeyOutOfRange);
        }
        let mut public_key = g_pow_p(secret_key);
        public_key.set_is_fixed_base(true);
        Ok(Self {
            secret_key: secret_key.clone(),
            public_key,
        })
    }

    pub fn secret_key(&self) -> &ElementModQ {
        &self.secret_key
    }

    pub fn public_key(&self) -> &ElementModP {
        &self.public_key
    }
}

impl Drop for ElGamalKeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

//-------------------------------------------------------------------------------------------------|

/// An ElGamal ciphertext `(pad, data)`. Both components lie in the order-`Q`
/// subgroup for any honestly produced encryption.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElGamalCiphertext {
    pub pad: ElementModP,
    pub data: ElementModP,
}

impl ElGamalCiphertext {
    pub fn new(pad: ElementModP, data: ElementModP) -> Self {
        Self { pad, data }
    }

    /// The neutral element of homomorphic addition.
    pub fn one() -> Self {
        Self::new(ElementModP::from_u64(1), ElementModP::from_u64(1))
    }

    /// Component-wise modular product with another ciphertext; the sum of
    /// the plaintexts under the homomorphism.
    pub fn add(&self, other: &ElGamalCiphertext) -> ElGamalCiphertext {
        ElGamalCiphertext::new(
            mul_mod_p(&self.pad, &other.pad),
            mul_mod_p(&self.data, &other.data),
        )
    }

    /// Decrypts with a known blinding product (`data * product` then
    /// discrete log against `base`).
    pub fn decrypt_known_product(
        &self,
        product: &ElementModP,
        base: &ElementModP,
    ) -> EgResult<u64> {
        let result = mul_mod_p(&self.data, product);
        DiscreteLog::find(&result, base)
    }

    /// Decrypts with the election secret key.
    pub fn decrypt_with_secret(&self, secret_key: &ElementModQ, base: &ElementModP) -> EgResult<u64> {
        let difference = sub_from_q(secret_key);
        let product = pow_mod_p(&self.pad, &difference);
        self.decrypt_known_product(&product, base)
    }

    /// Decrypts a base-K encryption with the nonce it was created under.
    pub fn decrypt_with_nonce(&self, public_key: &ElementModP, nonce: &ElementModQ) -> EgResult<u64> {
        let difference = sub_from_q(nonce);
        let product = pow_mod_p(public_key, &difference);
        self.decrypt_known_product(&product, public_key)
    }

    /// Nonce decryption against an explicit encryption base. Dispatches to
    /// the base-K path when the base is the public key, otherwise inverts
    /// the legacy base-g encoding.
    pub fn decrypt_with_nonce_and_base(
        &self,
        public_key: &ElementModP,
        nonce: &ElementModQ,
        base: &ElementModP,
    ) -> EgResult<u64> {
        if public_key == base {
            return self.decrypt_with_nonce(public_key, nonce);
        }
        let product = pow_mod_p(public_key, nonce);
        let result = div_mod_p(&self.data, &product)?;
        DiscreteLog::find(&result, base)
    }

    /// A share of the decryption: `pad^s mod p`.
    pub fn partial_decrypt(&self, secret_key: &ElementModQ) -> ElementModP {
        pow_mod_p(&self.pad, secret_key)
    }

    /// Scales the ciphertext by a factor: an encryption of `x` becomes an
    /// encryption of `factor * x`.
    pub fn scale(&self, factor: &ElementModQ) -> ElGamalCiphertext {
        ElGamalCiphertext::new(
            pow_mod_p(&self.pad, factor),
            pow_mod_p(&self.data, factor),
        )
    }
}

impl CryptoHashable for ElGamalCiphertext {
    fn crypto_hash(&self) -> ElementModQ {
        hash_elems(&[(&self.pad).into(), (&self.data).into()])
    }
}

//-------------------------------------------------------------------------------------------------|

/// Base-K encryption of `m` under `nonce`: `(g^r, K^(m+r))`.
pub fn elgamal_encrypt(
    m: u64,
    nonce: &ElementModQ,
    public_key: &ElementModP,
) -> EgResult<ElGamalCiphertext> {
    if nonce.is_zero() {
        return Err(EgError::ZeroNonce);
    }

    let pad = g_pow_p(nonce);
    let exponent = match m {
        0 => nonce.clone(),
        1 => add_mod_q(nonce, &ElementModQ::from_u64(1)),
        _ => add_mod_q(nonce, &ElementModQ::from_u64(m)),
    };
    let data = pow_mod_p(public_key, &exponent);

    trace!("elgamal: base-K encryption");
    Ok(ElGamalCiphertext::new(pad, data))
}

/// Encryption against an explicit base: `(g^r, base^m * K^r)`. Collapses to
/// the base-K form when `base == K`.
pub fn elgamal_encrypt_with_base(
    m: u64,
    nonce: &ElementModQ,
    public_key: &ElementModP,
    encryption_base: &ElementModP,
) -> EgResult<ElGamalCiphertext> {
    if public_key == encryption_base {
        return elgamal_encrypt(m, nonce, public_key);
    }
    if nonce.is_zero() {
        return Err(EgError::ZeroNonce);
    }

    let pad = g_pow_p(nonce);
    let blinding_factor = pow_mod_p(public_key, nonce);
    Ok(elgamal_encrypt_with_pad(
        m,
        pad,
        &blinding_factor,
        encryption_base,
    ))
}

/// Assembles a ciphertext from an existing pad and blinding factor.
pub(crate) fn elgamal_encrypt_with_pad(
    m: u64,
    pad: ElementModP,
    blinding_factor: &ElementModP,
    encryption_base: &ElementModP,
) -> ElGamalCiphertext {
    let data = match m {
        0 => blinding_factor.clone(),
        1 => mul_mod_p(encryption_base, blinding_factor),
        _ => {
            let message = pow_mod_p(encryption_base, &ElementModQ::from_u64(m));
            mul_mod_p(&message, blinding_factor)
        }
    };
    ElGamalCiphertext::new(pad, data)
}

/// Base-K encryption from a precomputed triple; the nonce is the triple's
/// secret.
pub fn elgamal_encrypt_precomputed(
    m: u64,
    public_key: &ElementModP,
    precomputed: &PrecomputedEncryption,
) -> ElGamalCiphertext {
    elgamal_encrypt_with_pad(
        m,
        precomputed.pad().clone(),
        precomputed.blinding_factor(),
        public_key,
    )
}

/// Homomorphic sum over a nonempty sequence of ciphertexts.
pub fn elgamal_add<'a>(
    ciphertexts: impl IntoIterator<Item = &'a ElGamalCiphertext>,
) -> EgResult<ElGamalCiphertext> {
    let mut iter = ciphertexts.into_iter();
    let Some(first) = iter.next() else {
        return Err(EgError::ContestHasNoSelections);
    };
    let mut acc = first.clone();
    for ct in iter {
        acc = acc.add(ct);
    }
    Ok(acc)
}

//-------------------------------------------------------------------------------------------------|

/// A hashed-ElGamal ciphertext: the ElGamal pad, an XOR-encrypted byte
/// payload whose length is a multiple of 32, and a 32-byte MAC.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashedElGamalCiphertext {
    pub pad: ElementModP,
    #[serde(with = "serde_bytes_hex")]
    pub data: Vec<u8>,
    #[serde(with = "serde_bytes_hex")]
    pub mac: Vec<u8>,
}

mod serde_bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&util::base16::bytes_to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let hex = String::deserialize(d)?;
        util::base16::hex_to_fixed_width_bytes(&hex, hex.len() / 2)
            .map_err(serde::de::Error::custom)
    }
}

impl CryptoHashable for HashedElGamalCiphertext {
    fn crypto_hash(&self) -> ElementModQ {
        hash_elems(&[(&self.pad).into(), (&self.data).into(), (&self.mac).into()])
    }
}

impl HashedElGamalCiphertext {
    /// Inverts [`hashed_elgamal_encrypt`], rejecting MAC mismatches and,
    /// when `expect_padding` is set, malformed padding.
    pub fn decrypt(
        &self,
        public_key: &ElementModP,
        secret_key: &ElementModQ,
        hash_prefix: &str,
        seed: &ElementModQ,
        expect_padding: bool,
    ) -> EgResult<Vec<u8>> {
        let ciphertext_len = self.data.len();
        if ciphertext_len == 0 || ciphertext_len % HASHED_CIPHERTEXT_BLOCK_LENGTH != 0 {
            return Err(EgError::HashedElGamalBadCiphertextLength(ciphertext_len));
        }
        let number_of_blocks = (ciphertext_len / HASHED_CIPHERTEXT_BLOCK_LENGTH) as u32;

        let beta = pow_mod_p(&self.pad, secret_key);
        let mut session_key = session_key(hash_prefix, seed, public_key, &self.pad, &beta);

        // Verify the MAC before any plaintext is produced.
        let mac = compute_mac(&session_key, seed, number_of_blocks, &self.pad, &self.data);
        if mac != self.mac {
            session_key.zeroize();
            return Err(EgError::HashedElGamalMacMismatch);
        }

        let mut plaintext_with_padding = Vec::with_capacity(ciphertext_len);
        for i in 0..number_of_blocks {
            let mut xor_key = kdf::compute(
                &session_key,
                &seed.to_bytes_be(),
                number_of_blocks * HASHED_CIPHERTEXT_BLOCK_LENGTH_IN_BITS,
                i + 1,
            );
            let offset = (i as usize) * HASHED_CIPHERTEXT_BLOCK_LENGTH;
            for j in 0..HASHED_CIPHERTEXT_BLOCK_LENGTH {
                plaintext_with_padding.push(self.data[offset + j] ^ xor_key[j]);
            }
            xor_key.zeroize();
        }
        session_key.zeroize();

        if !expect_padding {
            return Ok(plaintext_with_padding);
        }

        let pad_len =
            u16::from_be_bytes([plaintext_with_padding[0], plaintext_with_padding[1]]) as usize;
        if pad_len > plaintext_with_padding.len() - 2 {
            return Err(EgError::HashedElGamalBadPadding);
        }
        let content_end = plaintext_with_padding.len() - pad_len;
        if plaintext_with_padding[content_end..].iter().any(|&b| b != 0) {
            return Err(EgError::HashedElGamalBadPadding);
        }
        Ok(plaintext_with_padding[2..content_end].to_vec())
    }

    /// A share of the decryption: `pad^s mod p`.
    pub fn partial_decrypt(&self, secret_key: &ElementModQ) -> ElementModP {
        pow_mod_p(&self.pad, secret_key)
    }
}

/// Session key `H(prefix, seed, K, alpha, beta)` as HMAC key bytes.
fn session_key(
    hash_prefix: &str,
    seed: &ElementModQ,
    public_key: &ElementModP,
    alpha: &ElementModP,
    beta: &ElementModP,
) -> [u8; 32] {
    let key = hash_elems(&[
        HashInput::Str(hash_prefix),
        seed.into(),
        public_key.into(),
        alpha.into(),
        beta.into(),
    ]);
    let mut out = [0u8; 32];
    out.copy_from_slice(&key.to_bytes_be());
    out
}

fn compute_mac(
    session_key: &[u8; 32],
    seed: &ElementModQ,
    number_of_blocks: u32,
    pad: &ElementModP,
    ciphertext: &[u8],
) -> Vec<u8> {
    let mut mac_key = kdf::compute(
        session_key,
        &seed.to_bytes_be(),
        number_of_blocks * HASHED_CIPHERTEXT_BLOCK_LENGTH_IN_BITS,
        0,
    );
    let mut pad_and_ciphertext = pad.to_bytes_be();
    pad_and_ciphertext.extend_from_slice(ciphertext);
    let mac = kdf::compute(&mac_key, &pad_and_ciphertext, 0, 0);
    mac_key.zeroize();
    mac.to_vec()
}

/// Lays out `[pad_len_be : 2][message][0x00 ...]` filled to a 32-byte
/// boundary at least `max_len` bytes of capacity. Oversized messages are
/// truncated to the capacity when allowed, with a zero pad-length field.
fn format_message(message: &[u8], max_len: usize, allow_truncation: bool) -> EgResult<Vec<u8>> {
    if max_len == 0 || max_len > HASHED_CIPHERTEXT_MAX_PADDED_DATA_SIZE {
        return Err(EgError::HashedElGamalInvalidMaxLen(max_len));
    }
    let total = (max_len + 2).div_ceil(HASHED_CIPHERTEXT_BLOCK_LENGTH)
        * HASHED_CIPHERTEXT_BLOCK_LENGTH;
    let capacity = total - 2;

    let content = if message.len() > capacity {
        if !allow_truncation {
            return Err(EgError::HashedElGamalMessageTooLong {
                len: message.len(),
                max_len,
            });
        }
        &message[..capacity]
    } else {
        message
    };

    let pad_len = capacity - content.len();
    let mut formatted = Vec::with_capacity(total);
    formatted.extend_from_slice(&(pad_len as u16).to_be_bytes());
    formatted.extend_from_slice(content);
    formatted.resize(total, 0);
    Ok(formatted)
}

/// Hashed-ElGamal encryption of an already block-aligned message.
fn hashed_elgamal_encrypt_aligned(
    message: &[u8],
    nonce: &ElementModQ,
    hash_prefix: &str,
    public_key: &ElementModP,
    seed: &ElementModQ,
    use_precompute: bool,
) -> EgResult<HashedElGamalCiphertext> {
    if message.is_empty() || message.len() % HASHED_CIPHERTEXT_BLOCK_LENGTH != 0 {
        return Err(EgError::HashedElGamalBadCiphertextLength(message.len()));
    }

    let mut pads = None;
    if use_precompute {
        if let Some(triple) = PrecomputeBufferContext::pop_triple() {
            pads = Some((triple.pad().clone(), triple.blinding_factor().clone()));
        }
    }
    let (alpha, beta) = match pads {
        Some(pair) => pair,
        None => (g_pow_p(nonce), pow_mod_p(public_key, nonce)),
    };

    let mut session_key = session_key(hash_prefix, seed, public_key, &alpha, &beta);

    let number_of_blocks = (message.len() / HASHED_CIPHERTEXT_BLOCK_LENGTH) as u32;
    let mut ciphertext = Vec::with_capacity(message.len());
    for i in 0..number_of_blocks {
        let mut xor_key = kdf::compute(
            &session_key,
            &seed.to_bytes_be(),
            number_of_blocks * HASHED_CIPHERTEXT_BLOCK_LENGTH_IN_BITS,
            i + 1,
        );
        let offset = (i as usize) * HASHED_CIPHERTEXT_BLOCK_LENGTH;
        for j in 0..HASHED_CIPHERTEXT_BLOCK_LENGTH {
            ciphertext.push(message[offset + j] ^ xor_key[j]);
        }
        xor_key.zeroize();
    }

    let mac = compute_mac(&session_key, seed, number_of_blocks, &alpha, &ciphertext);
    session_key.zeroize();

    Ok(HashedElGamalCiphertext {
        pad: alpha,
        data: ciphertext,
        mac,
    })
}

/// Hashed-ElGamal encryption of an arbitrary byte payload.
pub fn hashed_elgamal_encrypt(
    message: &[u8],
    nonce: &ElementModQ,
    hash_prefix: &str,
    public_key: &ElementModP,
    seed: &ElementModQ,
    max_len: usize,
    allow_truncation: bool,
    use_precompute: bool,
) -> EgResult<HashedElGamalCiphertext> {
    let formatted = format_message(message, max_len, allow_truncation)?;
    hashed_elgamal_encrypt_aligned(
        &formatted,
        nonce,
        hash_prefix,
        public_key,
        seed,
        use_precompute,
    )
}

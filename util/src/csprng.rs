// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Cryptographically secure random bytes via HMAC-DRBG-SHA256.
//!
//! Each call to [`random_bytes`] instantiates a fresh generator from the OS
//! entropy source, mixes in a clock-derived personalization string and a
//! secondary entropy draw as the DRBG nonce, produces the requested bytes,
//! and discards the state. No reseed contract is exposed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

const OUT_LEN: usize = 32;

/// Errors from the entropy layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CsprngError {
    /// The OS entropy source failed or returned short.
    #[error("out of entropy")]
    OutOfEntropy,
}

/// HMAC-DRBG-SHA256 (NIST SP 800-90A) over explicit seed material.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Csprng {
    k: [u8; OUT_LEN],
    v: [u8; OUT_LEN],
}

impl Csprng {
    /// Instantiates from entropy, nonce, and personalization.
    pub fn instantiate(entropy: &[u8], nonce: &[u8], personalization: &[u8]) -> Self {
        let mut drbg = Self {
            k: [0u8; OUT_LEN],
            v: [1u8; OUT_LEN],
        };
        drbg.update(&[entropy, nonce, personalization]);
        drbg
    }

    fn hmac(key: &[u8], parts: &[&[u8]]) -> [u8; OUT_LEN] {
        // A 32-byte key can never be rejected by HMAC.
        #[allow(clippy::unwrap_used)]
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        for part in parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().into()
    }

    fn update(&mut self, provided: &[&[u8]]) {
        let has_input = provided.iter().any(|p| !p.is_empty());

        for sep in [[0x00u8], [0x01u8]] {
            let v = self.v;
            let mut parts: Vec<&[u8]> = Vec::with_capacity(provided.len() + 2);
            parts.push(&v);
            parts.push(&sep);
            parts.extend_from_slice(provided);
            self.k = Self::hmac(&self.k, &parts);
            let v = self.v;
            self.v = Self::hmac(&self.k, &[&v]);

            if !has_input {
                break;
            }
        }
    }

    /// Generates `out.len()` bytes, mixing in optional additional input.
    pub fn generate(&mut self, out: &mut [u8], additional_input: &[u8]) {
        if !additional_input.is_empty() {
            self.update(&[additional_input]);
        }
        let mut produced = 0;
        while produced < out.len() {
            let v = self.v;
            self.v = Self::hmac(&self.k, &[&v]);
            let take = (out.len() - produced).min(OUT_LEN);
            out[produced..produced + take].copy_from_slice(&self.v[..take]);
            produced += take;
        }
        self.update(&[additional_input]);
    }
}

fn os_entropy(count: usize) -> Result<Vec<u8>, CsprngError> {
    let mut buf = vec![0u8; count];
    getrandom::fill(&mut buf).map_err(|_| CsprngError::OutOfEntropy)?;
    Ok(buf)
}

fn clock_personalization() -> Vec<u8> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", now.as_secs(), now.subsec_nanos()).into_bytes()
}

/// Draws `size` random bytes from an ephemeral, freshly seeded generator.
pub fn random_bytes(size: usize) -> Result<Vec<u8>, CsprngError> {
    let mut entropy = os_entropy(size.max(OUT_LEN) * 2)?;
    let mut nonce = os_entropy(size.max(OUT_LEN))?;
    let personalization = clock_personalization();

    let mut drbg = Csprng::instantiate(&entropy, &nonce, &personalization);
    entropy.zeroize();
    nonce.zeroize();

    let mut additional = os_entropy(size.max(OUT_LEN))?;
    let mut out = vec![0u8; size];
    drbg.generate(&mut out, &additional);
    additional.zeroize();
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn produces_requested_sizes() {
        for size in [1usize, 31, 32, 33, 64, 256] {
            let bytes = random_bytes(size).unwrap();
            assert_eq!(bytes.len(), size);
        }
    }

    #[test]
    fn distinct_draws() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn deterministic_given_seed_material() {
        let mut g1 = Csprng::instantiate(b"entropy", b"nonce", b"pers");
        let mut g2 = Csprng::instantiate(b"entropy", b"nonce", b"pers");
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];
        g1.generate(&mut a, &[]);
        g2.generate(&mut b, &[]);
        assert_eq!(a, b);

        let mut g3 = Csprng::instantiate(b"entropy", b"other-nonce", b"pers");
        let mut c = [0u8; 48];
        g3.generate(&mut c, &[]);
        assert_ne!(a, c);
    }
}

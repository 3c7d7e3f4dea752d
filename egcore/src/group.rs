// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Semantic wrappers for values mod `P` (group elements) and mod `Q`
//! (exponents), plus the modular arithmetic free functions used throughout
//! the crate.
//!
//! All arithmetic is total: operations accept unreduced inputs (anything
//! representable at the fixed width) and always produce a reduced element.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use util::base16;
use util::limb;

use crate::constants::{CONTEXT_P, CONTEXT_Q, G, ONE_MOD_P, P, Q};
use crate::errors::{EgError, EgResult};
use crate::lookup_table;

/// Limb count of an [`ElementModP`].
pub const MAX_P_LEN: usize = 64;
/// Limb count of an [`ElementModQ`].
pub const MAX_Q_LEN: usize = 4;
/// Canonical byte length of an [`ElementModP`].
pub const MAX_P_SIZE: usize = 512;
/// Canonical byte length of an [`ElementModQ`].
pub const MAX_Q_SIZE: usize = 32;

static_assertions::const_assert_eq!(MAX_P_LEN * 8, MAX_P_SIZE);
static_assertions::const_assert_eq!(MAX_Q_LEN * 8, MAX_Q_SIZE);

/// A nonnegative integer below the 4096-bit prime `P`.
///
/// The `is_fixed_base` flag marks the value as a candidate for the
/// precomputed exponent tables; it is advisory and ignored by equality.
#[derive(Clone)]
pub struct ElementModP {
    data: [u64; MAX_P_LEN],
    is_fixed_base: bool,
}

/// A nonnegative integer below the 256-bit prime `Q`.
#[derive(Clone)]
pub struct ElementModQ {
    data: [u64; MAX_Q_LEN],
}

macro_rules! element_common {
    ($ty:ident, $len:expr, $size:expr, $name:literal, $modulus:expr) => {
        impl $ty {
            /// Constructs from little-endian limbs, verifying the value is
            /// below the modulus.
            pub fn new(data: [u64; $len]) -> EgResult<Self> {
                let e = Self::new_unchecked(data);
                if limb::cmp(&e.data, $modulus.limbs()) != Ordering::Less {
                    return Err(EgError::ElementOutOfRange($name));
                }
                Ok(e)
            }

            /// Decodes a fixed-width big-endian byte string, verifying the
            /// value is below the modulus.
            pub fn from_bytes_be(bytes: &[u8]) -> EgResult<Self> {
                let e = Self::from_bytes_be_unchecked_checked_len(bytes)?;
                if limb::cmp(&e.data, $modulus.limbs()) != Ordering::Less {
                    return Err(EgError::ElementOutOfRange($name));
                }
                Ok(e)
            }

            fn from_bytes_be_unchecked_checked_len(bytes: &[u8]) -> EgResult<Self> {
                if bytes.len() != $size {
                    return Err(EgError::ByteLengthMismatch {
                        expected: $size,
                        actual: bytes.len(),
                    });
                }
                Ok(Self::from_bytes_be_unchecked(bytes))
            }

            /// Parses canonical (or shorter) hex, verifying the bound.
            pub fn from_hex(hex: &str) -> EgResult<Self> {
                let bytes = base16::hex_to_fixed_width_bytes(hex, $size)
                    .map_err(|e| EgError::MalformedHex(e.to_string()))?;
                Self::from_bytes_be(&bytes)
            }

            pub fn from_u64(v: u64) -> Self {
                let mut data = [0u64; $len];
                data[0] = v;
                Self::new_unchecked(data)
            }

            pub(crate) fn from_limb_vec(v: Vec<u64>) -> Self {
                let mut data = [0u64; $len];
                data.copy_from_slice(&v);
                Self::new_unchecked(data)
            }

            pub(crate) fn limbs(&self) -> &[u64] {
                &self.data
            }

            /// Big-endian, fixed-length, zero-padded encoding.
            pub fn to_bytes_be(&self) -> Vec<u8> {
                limb::to_be_bytes(&self.data)
            }

            /// Canonical uppercase hex, zero-padded to full width.
            pub fn to_hex(&self) -> String {
                base16::bytes_to_hex(&self.to_bytes_be())
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.data == other.data
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                limb::cmp(&self.data, &other.data)
            }
        }

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.data.hash(state);
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Zeroize for $ty {
            fn zeroize(&mut self) {
                self.data.zeroize();
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let hex = String::deserialize(d)?;
                Self::from_hex(&hex).map_err(serde::de::Error::custom)
            }
        }
    };
}

element_common!(ElementModP, MAX_P_LEN, MAX_P_SIZE, "P", P);
element_common!(ElementModQ, MAX_Q_LEN, MAX_Q_SIZE, "Q", Q);

impl ElementModP {
    /// Constructs without the bound check. Used for raw digests and constant
    /// tables; arithmetic reduces such values on first use.
    pub fn new_unchecked(data: [u64; MAX_P_LEN]) -> Self {
        Self {
            data,
            is_fixed_base: false,
        }
    }

    /// Decodes a fixed-width big-endian byte string without the bound check.
    pub fn from_bytes_be_unchecked(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() == MAX_P_SIZE);
        let mut data = [0u64; MAX_P_LEN];
        limb::from_be_bytes(bytes, &mut data);
        Self::new_unchecked(data)
    }

    /// Strict interval check `0 < self < P`.
    pub fn is_in_bounds(&self) -> bool {
        !limb::is_zero(&self.data) && limb::cmp(&self.data, P.limbs()) == Ordering::Less
    }

    /// `self` is in bounds and lies in the order-`Q` subgroup
    /// (`self^Q mod P == 1`).
    pub fn is_valid_residue(&self) -> bool {
        self.is_in_bounds() && pow_mod_p(self, &Q) == *ONE_MOD_P
    }

    pub fn is_fixed_base(&self) -> bool {
        self.is_fixed_base
    }

    /// Marks the element as a candidate for precomputed exponent tables.
    pub fn set_is_fixed_base(&mut self, fixed: bool) {
        self.is_fixed_base = fixed;
    }
}

impl ElementModQ {
    pub fn new_unchecked(data: [u64; MAX_Q_LEN]) -> Self {
        Self { data }
    }

    pub fn from_bytes_be_unchecked(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() == MAX_Q_SIZE);
        let mut data = [0u64; MAX_Q_LEN];
        limb::from_be_bytes(bytes, &mut data);
        Self::new_unchecked(data)
    }

    /// Strict interval check `0 < self < Q`.
    pub fn is_in_bounds(&self) -> bool {
        !limb::is_zero(&self.data) && limb::cmp(&self.data, Q.limbs()) == Ordering::Less
    }

    pub fn is_zero(&self) -> bool {
        limb::is_zero(&self.data)
    }

    /// Zero-extends into the 4096-bit width.
    pub fn to_element_mod_p(&self) -> ElementModP {
        let mut data = [0u64; MAX_P_LEN];
        data[..MAX_Q_LEN].copy_from_slice(&self.data);
        ElementModP::new_unchecked(data)
    }
}

//-------------------------------------------------------------------------------------------------|
// Arithmetic mod P

pub fn add_mod_p(lhs: &ElementModP, rhs: &ElementModP) -> ElementModP {
    ElementModP::from_limb_vec(CONTEXT_P.add_mod(lhs.limbs(), rhs.limbs()))
}

pub fn mul_mod_p(lhs: &ElementModP, rhs: &ElementModP) -> ElementModP {
    ElementModP::from_limb_vec(CONTEXT_P.mul_mod(lhs.limbs(), rhs.limbs()))
}

/// Product of one or more elements mod `P`.
pub fn mul_mod_p_iter<'a>(elems: impl IntoIterator<Item = &'a ElementModP>) -> ElementModP {
    let mut product = ElementModP::from_u64(1);
    for e in elems {
        product = mul_mod_p(&product, e);
    }
    product
}

/// `numerator * denominator^(-1) mod P`.
pub fn div_mod_p(numerator: &ElementModP, denominator: &ElementModP) -> EgResult<ElementModP> {
    let inverse = CONTEXT_P.inv_mod_prime(denominator.limbs())?;
    Ok(mul_mod_p(numerator, &ElementModP::from_limb_vec(inverse)))
}

/// `base^exponent mod P`. Returns one when the exponent is zero; routes
/// through the per-base lookup table when `base` is flagged fixed.
pub fn pow_mod_p(base: &ElementModP, exponent: &ElementModQ) -> ElementModP {
    if exponent.is_zero() {
        return ElementModP::from_u64(1);
    }
    if base.is_fixed_base() {
        return lookup_table::pow_mod_p(base, exponent);
    }
    // The exponent width is a nonzero constant, so the primitive cannot fail.
    #[allow(clippy::unwrap_used)]
    let v = CONTEXT_P
        .pow_mod(base.limbs(), exponent.limbs(), MAX_Q_SIZE * 8, false)
        .unwrap();
    ElementModP::from_limb_vec(v)
}

/// `base^exponent mod P` without fixed-base dispatch. Used to cross-check
/// the lookup tables.
#[cfg(test)]
pub(crate) fn pow_mod_p_direct(base: &ElementModP, exponent: &ElementModQ) -> ElementModP {
    if exponent.is_zero() {
        return ElementModP::from_u64(1);
    }
    #[allow(clippy::unwrap_used)]
    let v = CONTEXT_P
        .pow_mod(base.limbs(), exponent.limbs(), MAX_Q_SIZE * 8, false)
        .unwrap();
    ElementModP::from_limb_vec(v)
}

/// `g^exponent mod P`.
pub fn g_pow_p(exponent: &ElementModQ) -> ElementModP {
    pow_mod_p(&G, exponent)
}

//-------------------------------------------------------------------------------------------------|
// Arithmetic mod Q

pub fn add_mod_q(lhs: &ElementModQ, rhs: &ElementModQ) -> ElementModQ {
    ElementModQ::from_limb_vec(CONTEXT_Q.add_mod(lhs.limbs(), rhs.limbs()))
}

/// Sum of one or more elements mod `Q`. Fails on an empty sequence.
pub fn add_mod_q_iter<'a>(
    elems: impl IntoIterator<Item = &'a ElementModQ>,
) -> EgResult<ElementModQ> {
    let mut iter = elems.into_iter();
    let Some(first) = iter.next() else {
        return Err(EgError::ContestHasNoSelections);
    };
    let mut sum = first.clone();
    for e in iter {
        sum = add_mod_q(&sum, e);
    }
    Ok(sum)
}

pub fn sub_mod_q(lhs: &ElementModQ, rhs: &ElementModQ) -> ElementModQ {
    ElementModQ::from_limb_vec(CONTEXT_Q.sub_mod(lhs.limbs(), rhs.limbs()))
}

pub fn mul_mod_q(lhs: &ElementModQ, rhs: &ElementModQ) -> ElementModQ {
    ElementModQ::from_limb_vec(CONTEXT_Q.mul_mod(lhs.limbs(), rhs.limbs()))
}

/// `numerator * denominator^(-1) mod Q`.
pub fn div_mod_q(numerator: &ElementModQ, denominator: &ElementModQ) -> EgResult<ElementModQ> {
    let inverse = CONTEXT_Q.inv_mod_prime(denominator.limbs())?;
    Ok(mul_mod_q(numerator, &ElementModQ::from_limb_vec(inverse)))
}

pub fn pow_mod_q(base: &ElementModQ, exponent: &ElementModQ) -> ElementModQ {
    if exponent.is_zero() {
        return ElementModQ::from_u64(1);
    }
    #[allow(clippy::unwrap_used)]
    let v = CONTEXT_Q
        .pow_mod(base.limbs(), exponent.limbs(), MAX_Q_SIZE * 8, false)
        .unwrap();
    ElementModQ::from_limb_vec(v)
}

/// `(Q - a) mod Q`, the additive inverse of the exponent.
pub fn sub_from_q(a: &ElementModQ) -> ElementModQ {
    sub_mod_q(&ElementModQ::from_u64(0), a)
}

/// `(a + b * c) mod Q`.
pub fn a_plus_bc_mod_q(a: &ElementModQ, b: &ElementModQ, c: &ElementModQ) -> ElementModQ {
    add_mod_q(a, &mul_mod_q(b, c))
}

/// `(a - b * c) mod Q`.
pub fn a_minus_bc_mod_q(a: &ElementModQ, b: &ElementModQ, c: &ElementModQ) -> ElementModQ {
    sub_mod_q(a, &mul_mod_q(b, c))
}

//-------------------------------------------------------------------------------------------------|
// Random elements

/// A uniformly random exponent in `[0, Q)` from the OS-seeded generator.
pub fn rand_q() -> EgResult<ElementModQ> {
    let bytes = util::csprng::random_bytes(MAX_Q_SIZE)?;
    let raw = ElementModQ::from_bytes_be_unchecked(&bytes);
    Ok(ElementModQ::from_limb_vec(CONTEXT_Q.reduce(raw.limbs())))
}

/// A uniformly random value in `[0, P)` from the OS-seeded generator.
pub fn rand_p() -> EgResult<ElementModP> {
    let bytes = util::csprng::random_bytes(MAX_P_SIZE)?;
    let raw = ElementModP::from_bytes_be_unchecked(&bytes);
    Ok(ElementModP::from_limb_vec(CONTEXT_P.reduce(raw.limbs())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::constants::{ONE_MOD_Q, TWO_MOD_Q, ZERO_MOD_Q};

    #[test]
    fn q_arithmetic_stays_reduced() {
        let a = ElementModQ::from_u64(5);
        let b = ElementModQ::from_u64(9);
        assert_eq!(add_mod_q(&a, &b), ElementModQ::from_u64(14));
        assert_eq!(sub_mod_q(&a, &b), sub_from_q(&ElementModQ::from_u64(4)));
        assert_eq!(mul_mod_q(&a, &b), ElementModQ::from_u64(45));
        let sum = add_mod_q(&sub_from_q(&ONE_MOD_Q), &TWO_MOD_Q);
        assert_eq!(sum, *ONE_MOD_Q);
    }

    #[test]
    fn add_mod_q_reduces_unreduced_inputs() {
        // Raw digests land in [Q, 2^256); addition must still reduce.
        let raw = ElementModQ::new_unchecked([u64::MAX; MAX_Q_LEN]);
        let reduced = add_mod_q(&raw, &ZERO_MOD_Q);
        assert!(limb::cmp(reduced.limbs(), Q.limbs()) == Ordering::Less);
    }

    #[test]
    fn pow_zero_exponent_is_one() {
        let base = ElementModP::from_u64(123456789);
        assert_eq!(pow_mod_p(&base, &ZERO_MOD_Q), ElementModP::from_u64(1));
        assert_eq!(
            pow_mod_q(&ElementModQ::from_u64(7), &ZERO_MOD_Q),
            ElementModQ::from_u64(1)
        );
    }

    #[test]
    fn g_pow_p_is_in_subgroup() {
        let e = ElementModQ::from_u64(3);
        let g3 = g_pow_p(&e);
        assert!(g3.is_valid_residue());
        // g^3 == g * g * g
        let gg = mul_mod_p(&G, &G);
        assert_eq!(g3, mul_mod_p(&gg, &G));
    }

    #[test]
    fn div_undoes_mul() {
        let a = ElementModP::from_u64(987654321);
        let b = ElementModP::from_u64(1234567);
        let prod = mul_mod_p(&a, &b);
        assert_eq!(div_mod_p(&prod, &b).unwrap(), a);

        let x = ElementModQ::from_u64(1048573);
        let y = ElementModQ::from_u64(65537);
        assert_eq!(div_mod_q(&mul_mod_q(&x, &y), &y).unwrap(), x);
    }

    #[test]
    fn bytes_and_hex_roundtrip() {
        let e = ElementModQ::from_u64(0xDEAD_BEEF);
        assert_eq!(ElementModQ::from_bytes_be(&e.to_bytes_be()).unwrap(), e);
        assert_eq!(ElementModQ::from_hex(&e.to_hex()).unwrap(), e);
        assert_eq!(e.to_hex().len(), MAX_Q_SIZE * 2);

        let p = ElementModP::from_u64(42);
        assert_eq!(ElementModP::from_bytes_be(&p.to_bytes_be()).unwrap(), p);
        assert_eq!(ElementModP::from_hex(&p.to_hex()).unwrap(), p);
        assert_eq!(p.to_hex().len(), MAX_P_SIZE * 2);
    }

    #[test]
    fn bounds_checks() {
        assert!(!ElementModQ::from_u64(0).is_in_bounds());
        assert!(ElementModQ::from_u64(1).is_in_bounds());
        let too_big = [u64::MAX; MAX_Q_LEN];
        assert!(ElementModQ::new(too_big).is_err());
        assert!(ElementModQ::from_bytes_be(&[0u8; 16]).is_err());
    }

    #[test]
    fn q_to_p_zero_extends() {
        let q = ElementModQ::from_u64(77);
        let p = q.to_element_mod_p();
        assert_eq!(p, ElementModP::from_u64(77));
    }

    #[test]
    fn rand_q_is_in_range() {
        let a = rand_q().unwrap();
        let b = rand_q().unwrap();
        assert_ne!(a, b);
        assert!(limb::cmp(a.limbs(), Q.limbs()) == Ordering::Less);
    }

    #[test]
    fn serde_hex_roundtrip() {
        let e = ElementModQ::from_u64(513);
        let json = serde_json::to_string(&e).unwrap();
        let back: ElementModQ = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }
}

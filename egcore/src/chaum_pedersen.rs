// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Chaum-Pedersen proofs under the Fiat-Shamir transform.
//!
//! Four shapes: disjunctive (a selection encrypts 0 or 1), ranged (a contest
//! accumulation encrypts a value in `0..=L`), constant (a ciphertext
//! encrypts a known constant), and the generic form used for decryption
//! shares. Every proof has a deterministic constructor (randomness drawn
//! from a [`Nonces`] stream, so a ballot is reproducible from its root
//! nonce) and a non-deterministic one (randomness from the OS); the
//! disjunctive proof additionally accepts precomputed commitments.

use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::elgamal::ElGamalCiphertext;
use crate::errors::{EgError, EgResult, ValidationResult};
use crate::group::{
    ElementModP, ElementModQ, a_minus_bc_mod_q, a_plus_bc_mod_q, add_mod_q, g_pow_p, mul_mod_p,
    mul_mod_q, pow_mod_p, rand_q, sub_mod_q,
};
use crate::hash::{HashInput, HashPrefix, hash_elems};
use crate::nonces::Nonces;
use crate::precompute::{
    PrecomputeBufferContext, PrecomputedEncryption, PrecomputedFakeDisjunctiveCommitments,
    PrecomputedSelection,
};

//-------------------------------------------------------------------------------------------------|
// Disjunctive proof

/// Witnesses that an ElGamal ciphertext under nonce `R` encrypts 0 or 1,
/// without revealing which.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisjunctiveChaumPedersenProof {
    /// `a0`
    pub proof_zero_pad: ElementModP,
    /// `b0`
    pub proof_zero_data: ElementModP,
    /// `a1`
    pub proof_one_pad: ElementModP,
    /// `b1`
    pub proof_one_data: ElementModP,
    /// `c0`
    pub proof_zero_challenge: ElementModQ,
    /// `c1`
    pub proof_one_challenge: ElementModQ,
    /// `c`
    pub challenge: ElementModQ,
    /// `v0`
    pub proof_zero_response: ElementModQ,
    /// `v1`
    pub proof_one_response: ElementModQ,
}

/// `c = H(04 ; Q' ; K, alpha, beta, a0, b0, a1, b1)`
fn disjunctive_challenge(
    q_hat: &ElementModQ,
    k: &ElementModP,
    message: &ElGamalCiphertext,
    a0: &ElementModP,
    b0: &ElementModP,
    a1: &ElementModP,
    b1: &ElementModP,
) -> ElementModQ {
    hash_elems(&[
        HashPrefix::SELECTION_PROOF.into(),
        q_hat.into(),
        k.into(),
        (&message.pad).into(),
        (&message.data).into(),
        a0.into(),
        b0.into(),
        a1.into(),
        b1.into(),
    ])
}

impl DisjunctiveChaumPedersenProof {
    /// Non-deterministic constructor; draws its proof seed from the OS.
    pub fn make(
        message: &ElGamalCiphertext,
        r: &ElementModQ,
        k: &ElementModP,
        q_hat: &ElementModQ,
        plaintext: u64,
    ) -> EgResult<Self> {
        trace!("disjunctive proof: making proof without seed");
        let seed = rand_q()?;
        Self::make_with_seed(message, r, k, q_hat, &seed, plaintext)
    }

    /// Deterministic constructor; all randomness derives from `seed`.
    pub fn make_with_seed(
        message: &ElGamalCiphertext,
        r: &ElementModQ,
        k: &ElementModP,
        q_hat: &ElementModQ,
        seed: &ElementModQ,
        plaintext: u64,
    ) -> EgResult<Self> {
        match plaintext {
            0 => Ok(Self::make_zero(message, r, k, q_hat, seed)),
            1 => Ok(Self::make_one(message, r, k, q_hat, seed)),
            other => Err(EgError::PlaintextOutOfRange(other)),
        }
    }

    /// Constructor over precomputed commitments; no online exponentiations.
    pub fn make_with_precomputed(
        message: &ElGamalCiphertext,
        precomputed: &PrecomputedSelection,
        k: &ElementModP,
        q_hat: &ElementModQ,
        plaintext: u64,
    ) -> EgResult<Self> {
        let r = precomputed.partial_encryption().secret();
        Self::make_with_commitments(
            message,
            r,
            precomputed.real_commitment(),
            precomputed.fake_commitment(),
            k,
            q_hat,
            plaintext,
        )
    }

    pub fn make_with_commitments(
        message: &ElGamalCiphertext,
        r: &ElementModQ,
        real: &PrecomputedEncryption,
        fake: &PrecomputedFakeDisjunctiveCommitments,
        k: &ElementModP,
        q_hat: &ElementModQ,
        plaintext: u64,
    ) -> EgResult<Self> {
        match plaintext {
            0 => {
                // (a0, b0) = (g^u0, K^u0), (a1, b1) = (g^u1, K^(u1-w))
                let (u0, u1, w) = (real.secret(), fake.secret1(), fake.secret2());
                let a0 = real.pad().clone();
                let b0 = real.blinding_factor().clone();
                let a1 = fake.pad().clone();
                let b1 = fake.data_zero().clone();

                let c = disjunctive_challenge(q_hat, k, message, &a0, &b0, &a1, &b1);
                let c0 = sub_mod_q(&c, w);
                let v0 = a_minus_bc_mod_q(u0, &c0, r);
                let c1 = w.clone();
                let v1 = a_minus_bc_mod_q(u1, w, r);
                Ok(Self {
                    proof_zero_pad: a0,
                    proof_zero_data: b0,
                    proof_one_pad: a1,
                    proof_one_data: b1,
                    proof_zero_challenge: c0,
                    proof_one_challenge: c1,
                    challenge: c,
                    proof_zero_response: v0,
                    proof_one_response: v1,
                })
            }
            1 => {
                // (a0, b0) = (g^u0, K^(w+u0)), (a1, b1) = (g^u1, K^u1)
                let (u0, u1, w) = (fake.secret1(), real.secret(), fake.secret2());
                let a0 = fake.pad().clone();
                let b0 = fake.data_one().clone();
                let a1 = real.pad().clone();
                let b1 = real.blinding_factor().clone();

                let c = disjunctive_challenge(q_hat, k, message, &a0, &b0, &a1, &b1);
                let c0 = w.clone();
                let c1 = sub_mod_q(&c, w);
                let v0 = a_minus_bc_mod_q(u0, w, r);
                let v1 = a_minus_bc_mod_q(u1, &c1, r);
                Ok(Self {
                    proof_zero_pad: a0,
                    proof_zero_data: b0,
                    proof_one_pad: a1,
                    proof_one_data: b1,
                    proof_zero_challenge: c0,
                    proof_one_challenge: c1,
                    challenge: c,
                    proof_zero_response: v0,
                    proof_one_response: v1,
                })
            }
            other => Err(EgError::PlaintextOutOfRange(other)),
        }
    }

    fn make_zero(
        message: &ElGamalCiphertext,
        r: &ElementModQ,
        k: &ElementModP,
        q_hat: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        // NIZKP for plaintext 0:
        // (a0, b0) = (g^u0, K^u0)
        // (a1, b1) = (g^u1, K^(u1-w))   <- fake branch
        let nonces = Nonces::with_header(seed, "disjoint-chaum-pedersen-proof");
        let u0 = nonces.get(0);
        let u1 = nonces.get(1);
        let w = nonces.get(2);

        let a0 = g_pow_p(&u0);
        let b0 = pow_mod_p(k, &u0);
        let a1 = g_pow_p(&u1);
        let b1 = pow_mod_p(k, &sub_mod_q(&u1, &w));

        let c = disjunctive_challenge(q_hat, k, message, &a0, &b0, &a1, &b1);

        // c1 = w, so no separate value is assigned for it.
        let c0 = sub_mod_q(&c, &w);
        let v0 = a_minus_bc_mod_q(&u0, &c0, r);
        let v1 = a_minus_bc_mod_q(&u1, &w, r);

        Self {
            proof_zero_pad: a0,
            proof_zero_data: b0,
            proof_one_pad: a1,
            proof_one_data: b1,
            proof_zero_challenge: c0,
            proof_one_challenge: w,
            challenge: c,
            proof_zero_response: v0,
            proof_one_response: v1,
        }
    }

    fn make_one(
        message: &ElGamalCiphertext,
        r: &ElementModQ,
        k: &ElementModP,
        q_hat: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        // NIZKP for plaintext 1:
        // (a0, b0) = (g^u0, K^(w+u0))   <- fake branch
        // (a1, b1) = (g^u1, K^u1)
        let nonces = Nonces::with_header(seed, "disjoint-chaum-pedersen-proof");
        let u0 = nonces.get(0);
        let u1 = nonces.get(1);
        let w = nonces.get(2);

        let a0 = g_pow_p(&u0);
        let b0 = pow_mod_p(k, &add_mod_q(&w, &u0));
        let a1 = g_pow_p(&u1);
        let b1 = pow_mod_p(k, &u1);

        let c = disjunctive_challenge(q_hat, k, message, &a0, &b0, &a1, &b1);

        // c0 = w
        let c1 = sub_mod_q(&c, &w);
        let v0 = a_minus_bc_mod_q(&u0, &w, r);
        let v1 = a_minus_bc_mod_q(&u1, &c1, r);

        Self {
            proof_zero_pad: a0,
            proof_zero_data: b0,
            proof_one_pad: a1,
            proof_one_data: b1,
            proof_zero_challenge: w,
            proof_one_challenge: c1,
            challenge: c,
            proof_zero_response: v0,
            proof_one_response: v1,
        }
    }

    /// Full validity check, reporting every failed sub-predicate.
    pub fn validate(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        q_hat: &ElementModQ,
    ) -> ValidationResult {
        let alpha = &message.pad;
        let beta = &message.data;
        let a0 = &self.proof_zero_pad;
        let b0 = &self.proof_zero_data;
        let a1 = &self.proof_one_pad;
        let b1 = &self.proof_one_data;
        let c0 = &self.proof_zero_challenge;
        let c1 = &self.proof_one_challenge;
        let c = &self.challenge;
        let v0 = &self.proof_zero_response;
        let v1 = &self.proof_one_response;

        let consistent_c = add_mod_q(c0, c1) == *c
            && *c == disjunctive_challenge(q_hat, k, message, a0, b0, a1, b1);

        // a0 = g^v0 * alpha^c0, a1 = g^v1 * alpha^c1
        let consistent_gv0 = *a0 == mul_mod_p(&g_pow_p(v0), &pow_mod_p(alpha, c0));
        let consistent_gv1 = *a1 == mul_mod_p(&g_pow_p(v1), &pow_mod_p(alpha, c1));

        // b0 = K^v0 * beta^c0, b1 = K^(v1-c1) * beta^c1
        let consistent_kv0 = *b0 == mul_mod_p(&pow_mod_p(k, v0), &pow_mod_p(beta, c0));
        let w1 = sub_mod_q(v1, c1);
        let consistent_kw1 = *b1 == mul_mod_p(&pow_mod_p(k, &w1), &pow_mod_p(beta, c1));

        let result = ValidationResult::from_checks(&[
            ("in_bounds_alpha", alpha.is_valid_residue()),
            ("in_bounds_beta", beta.is_valid_residue()),
            ("in_bounds_a0", a0.is_valid_residue()),
            ("in_bounds_b0", b0.is_valid_residue()),
            ("in_bounds_a1", a1.is_valid_residue()),
            ("in_bounds_b1", b1.is_valid_residue()),
            ("in_bounds_c0", c0.is_in_bounds()),
            ("in_bounds_c1", c1.is_in_bounds()),
            ("in_bounds_v0", v0.is_in_bounds()),
            ("in_bounds_v1", v1.is_in_bounds()),
            ("consistent_c", consistent_c),
            ("consistent_gv0", consistent_gv0),
            ("consistent_gv1", consistent_gv1),
            ("consistent_kv0", consistent_kv0),
            ("consistent_kw1", consistent_kw1),
        ]);
        if !result.is_valid {
            info!(failed = ?result.failed, "invalid disjunctive Chaum-Pedersen proof");
        }
        result
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        q_hat: &ElementModQ,
    ) -> bool {
        self.validate(message, k, q_hat).is_valid
    }
}

//-------------------------------------------------------------------------------------------------|
// Ranged proof

/// One branch of a [`RangedChaumPedersenProof`]: `(c_j, v_j)`. The branch
/// commitments are recomputed during validation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangedProofBranch {
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

/// Witnesses `0 <= m <= L` for a contest accumulation `(A, B)` with
/// aggregate nonce `R`. Structurally a disjunction over `L + 1` branches.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangedChaumPedersenProof {
    /// `L`
    pub range_limit: u64,
    /// Overall challenge `c`.
    pub challenge: ElementModQ,
    /// Branches `0..=L`.
    pub branches: Vec<RangedProofBranch>,
}

/// `c = H(prefix ; Q' ; K, A, B, a_0..a_L, b_0..b_L)`
fn ranged_challenge(
    hash_prefix: &str,
    q_hat: &ElementModQ,
    k: &ElementModP,
    message: &ElGamalCiphertext,
    a: &[ElementModP],
    b: &[ElementModP],
) -> ElementModQ {
    let mut items: Vec<HashInput> = Vec::with_capacity(5 + a.len() + b.len());
    items.push(hash_prefix.into());
    items.push(q_hat.into());
    items.push(k.into());
    items.push((&message.pad).into());
    items.push((&message.data).into());
    for a_j in a {
        items.push(a_j.into());
    }
    for b_j in b {
        items.push(b_j.into());
    }
    hash_elems(&items)
}

impl RangedChaumPedersenProof {
    /// Non-deterministic constructor. When `use_precompute` is set and the
    /// buffer has a triple, the real branch's commitment comes from it.
    pub fn make(
        message: &ElGamalCiphertext,
        aggregate_nonce: &ElementModQ,
        selected: u64,
        range_limit: u64,
        k: &ElementModP,
        q_hat: &ElementModQ,
        hash_prefix: &str,
        use_precompute: bool,
    ) -> EgResult<Self> {
        if selected > range_limit {
            return Err(EgError::RangeProofOutOfRange {
                witnessed: selected,
                limit: range_limit,
            });
        }
        let branches = (range_limit + 1) as usize;
        let mut u = Vec::with_capacity(branches);
        let mut c = Vec::with_capacity(branches);
        for _ in 0..branches {
            u.push(rand_q()?);
            c.push(rand_q()?);
        }
        let mut real_commitment = None;
        if use_precompute {
            if let Some(triple) = PrecomputeBufferContext::pop_triple() {
                // t = u at the real branch, so (g^u, K^u) is exactly a triple.
                u[selected as usize] = triple.secret().clone();
                real_commitment = Some((triple.pad().clone(), triple.blinding_factor().clone()));
            }
        }
        Ok(Self::make_inner(
            message,
            aggregate_nonce,
            selected,
            range_limit,
            k,
            q_hat,
            hash_prefix,
            u,
            c,
            real_commitment,
        ))
    }

    /// Deterministic constructor; commitments and fake challenges derive
    /// from `seed`.
    pub fn make_with_seed(
        message: &ElGamalCiphertext,
        aggregate_nonce: &ElementModQ,
        selected: u64,
        range_limit: u64,
        k: &ElementModP,
        q_hat: &ElementModQ,
        hash_prefix: &str,
        seed: &ElementModQ,
    ) -> EgResult<Self> {
        if selected > range_limit {
            return Err(EgError::RangeProofOutOfRange {
                witnessed: selected,
                limit: range_limit,
            });
        }
        let branches = (range_limit + 1) as usize;
        let nonces = Nonces::with_header(seed, "ranged-chaum-pedersen-proof");
        let u: Vec<ElementModQ> = (0..branches as u64).map(|j| nonces.get(j)).collect();
        let c: Vec<ElementModQ> = (0..branches as u64)
            .map(|j| nonces.get(branches as u64 + j))
            .collect();
        Ok(Self::make_inner(
            message,
            aggregate_nonce,
            selected,
            range_limit,
            k,
            q_hat,
            hash_prefix,
            u,
            c,
            None,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn make_inner(
        message: &ElGamalCiphertext,
        aggregate_nonce: &ElementModQ,
        selected: u64,
        range_limit: u64,
        k: &ElementModP,
        q_hat: &ElementModQ,
        hash_prefix: &str,
        u: Vec<ElementModQ>,
        mut c: Vec<ElementModQ>,
        real_commitment: Option<(ElementModP, ElementModP)>,
    ) -> Self {
        let branches = (range_limit + 1) as usize;
        let l = selected as usize;
        let l_scalar = ElementModQ::from_u64(selected);

        // a_j = g^u_j; b_j = K^(u_j + c_j * (l - j)), which is K^u_l at the
        // real branch.
        let mut a = Vec::with_capacity(branches);
        let mut b = Vec::with_capacity(branches);
        for j in 0..branches {
            if j == l {
                if let Some((pad, blinding_factor)) = &real_commitment {
                    a.push(pad.clone());
                    b.push(blinding_factor.clone());
                    continue;
                }
            }
            a.push(g_pow_p(&u[j]));
            let t_j = if j == l {
                u[j].clone()
            } else {
                let delta = sub_mod_q(&l_scalar, &ElementModQ::from_u64(j as u64));
                a_plus_bc_mod_q(&u[j], &c[j], &delta)
            };
            b.push(pow_mod_p(k, &t_j));
        }

        let challenge = ranged_challenge(hash_prefix, q_hat, k, message, &a, &b);

        // c_l = c - sum of the fake challenges.
        let mut c_real = challenge.clone();
        for (j, c_j) in c.iter().enumerate() {
            if j != l {
                c_real = sub_mod_q(&c_real, c_j);
            }
        }
        c[l] = c_real;

        let branches_out = (0..branches)
            .map(|j| RangedProofBranch {
                challenge: c[j].clone(),
                response: a_minus_bc_mod_q(&u[j], &c[j], aggregate_nonce),
            })
            .collect();

        Self {
            range_limit,
            challenge,
            branches: branches_out,
        }
    }

    /// Full validity check, reporting every failed sub-predicate.
    pub fn validate(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        q_hat: &ElementModQ,
        hash_prefix: &str,
    ) -> ValidationResult {
        let mut checks: Vec<(&'static str, bool)> = vec![
            ("in_bounds_alpha", message.pad.is_valid_residue()),
            ("in_bounds_beta", message.data.is_valid_residue()),
            (
                "branch_count",
                self.branches.len() == (self.range_limit + 1) as usize,
            ),
        ];
        if self.branches.len() != (self.range_limit + 1) as usize {
            let result = ValidationResult::from_checks(&checks);
            info!(failed = ?result.failed, "invalid ranged Chaum-Pedersen proof");
            return result;
        }

        // Recompute a_j = g^v_j * A^c_j and b_j = K^(v_j - j*c_j) * B^c_j.
        let mut a = Vec::with_capacity(self.branches.len());
        let mut b = Vec::with_capacity(self.branches.len());
        for (j, branch) in self.branches.iter().enumerate() {
            let c_j = &branch.challenge;
            let v_j = &branch.response;
            a.push(mul_mod_p(&g_pow_p(v_j), &pow_mod_p(&message.pad, c_j)));
            let w_j = sub_mod_q(v_j, &mul_mod_q(&ElementModQ::from_u64(j as u64), c_j));
            b.push(mul_mod_p(&pow_mod_p(k, &w_j), &pow_mod_p(&message.data, c_j)));

            checks.push(("in_bounds_branch_challenge", c_j.is_in_bounds()));
            checks.push(("in_bounds_branch_response", v_j.is_in_bounds()));
        }

        let recomputed = ranged_challenge(hash_prefix, q_hat, k, message, &a, &b);
        checks.push(("consistent_c", self.challenge == recomputed));

        let mut challenge_sum = ElementModQ::from_u64(0);
        for branch in &self.branches {
            challenge_sum = add_mod_q(&challenge_sum, &branch.challenge);
        }
        checks.push(("consistent_challenge_sum", challenge_sum == self.challenge));

        let result = ValidationResult::from_checks(&checks);
        if !result.is_valid {
            info!(failed = ?result.failed, "invalid ranged Chaum-Pedersen proof");
        }
        result
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        q_hat: &ElementModQ,
        hash_prefix: &str,
    ) -> bool {
        self.validate(message, k, q_hat, hash_prefix).is_valid
    }
}

//-------------------------------------------------------------------------------------------------|
// Constant proof

/// Witnesses that a ciphertext encrypts a constant `L` known to the
/// verifier. Verifies the base-g (1.0 compatible) data encoding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstantChaumPedersenProof {
    /// `a`
    pub pad: ElementModP,
    /// `b`
    pub data: ElementModP,
    /// `c`
    pub challenge: ElementModQ,
    /// `v`
    pub response: ElementModQ,
    /// `L`
    pub constant: u64,
}

/// `c = H(Q' ; alpha, beta, a, b)`
fn constant_challenge(
    hash_header: &ElementModQ,
    message: &ElGamalCiphertext,
    a: &ElementModP,
    b: &ElementModP,
) -> ElementModQ {
    hash_elems(&[
        hash_header.into(),
        (&message.pad).into(),
        (&message.data).into(),
        a.into(),
        b.into(),
    ])
}

impl ConstantChaumPedersenProof {
    /// Builds the proof. The deterministic path derives its commitment nonce
    /// from `seed`; with `use_precompute` a buffered triple replaces it (and
    /// the seed no longer determines the proof).
    pub fn make(
        message: &ElGamalCiphertext,
        r: &ElementModQ,
        k: &ElementModP,
        seed: &ElementModQ,
        hash_header: &ElementModQ,
        constant: u64,
        use_precompute: bool,
    ) -> Self {
        let mut commitment = None;
        if use_precompute {
            trace!("constant proof: precomputed values make the seed non-deterministic");
            if let Some(triple) = PrecomputeBufferContext::pop_triple() {
                commitment = Some((
                    triple.secret().clone(),
                    triple.pad().clone(),
                    triple.blinding_factor().clone(),
                ));
            }
        }
        let (u, a, b) = match commitment {
            Some(parts) => parts,
            None => {
                let nonces = Nonces::with_header(seed, "constant-chaum-pedersen-proof");
                let u = nonces.get(0);
                let a = g_pow_p(&u);
                let b = pow_mod_p(k, &u);
                (u, a, b)
            }
        };

        let c = constant_challenge(hash_header, message, &a, &b);
        let v = a_plus_bc_mod_q(&u, &c, r);

        Self {
            pad: a,
            data: b,
            challenge: c,
            response: v,
            constant,
        }
    }

    pub fn validate(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        q_hat: &ElementModQ,
    ) -> ValidationResult {
        let alpha = &message.pad;
        let beta = &message.data;
        let a = &self.pad;
        let b = &self.data;
        let c = &self.challenge;
        let v = &self.response;

        let consistent_c = *c == constant_challenge(q_hat, message, a, b);

        // g^v = a * alpha^c
        let consistent_gv = g_pow_p(v) == mul_mod_p(a, &pow_mod_p(alpha, c));

        // g^(c*L) * K^v = b * beta^c
        let c_l = mul_mod_q(c, &ElementModQ::from_u64(self.constant));
        let consistent_kv =
            mul_mod_p(&g_pow_p(&c_l), &pow_mod_p(k, v)) == mul_mod_p(b, &pow_mod_p(beta, c));

        let result = ValidationResult::from_checks(&[
            ("in_bounds_alpha", alpha.is_valid_residue()),
            ("in_bounds_beta", beta.is_valid_residue()),
            ("in_bounds_a", a.is_valid_residue()),
            ("in_bounds_b", b.is_valid_residue()),
            ("in_bounds_c", c.is_in_bounds()),
            ("in_bounds_v", v.is_in_bounds()),
            ("consistent_c", consistent_c),
            ("consistent_gv", consistent_gv),
            ("consistent_kv", consistent_kv),
        ]);
        if !result.is_valid {
            info!(failed = ?result.failed, "invalid constant Chaum-Pedersen proof");
        }
        result
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        q_hat: &ElementModQ,
    ) -> bool {
        self.validate(message, k, q_hat).is_valid
    }
}

//-------------------------------------------------------------------------------------------------|
// Generic proof

/// Witnesses knowledge of `s` with `K = g^s` and `M = A^s` for a ciphertext
/// `(A, B)`; the form each guardian publishes alongside its decryption
/// share.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChaumPedersenProof {
    /// `a`
    pub pad: ElementModP,
    /// `b`
    pub data: ElementModP,
    /// `c`
    pub challenge: ElementModQ,
    /// `v`
    pub response: ElementModQ,
}

/// `c = H(06 ; Q' ; K, A, B, a, b, M)`
fn generic_challenge(
    q_hat: &ElementModQ,
    k: &ElementModP,
    message: &ElGamalCiphertext,
    a: &ElementModP,
    b: &ElementModP,
    m: &ElementModP,
) -> ElementModQ {
    hash_elems(&[
        HashPrefix::SELECTION_DECRYPTION_PROOF.into(),
        q_hat.into(),
        k.into(),
        (&message.pad).into(),
        (&message.data).into(),
        a.into(),
        b.into(),
        m.into(),
    ])
}

impl ChaumPedersenProof {
    /// Non-deterministic constructor.
    pub fn make(
        message: &ElGamalCiphertext,
        s: &ElementModQ,
        m: &ElementModP,
        k: &ElementModP,
        q_hat: &ElementModQ,
    ) -> EgResult<Self> {
        let seed = rand_q()?;
        Ok(Self::make_with_seed(message, s, m, k, q_hat, &seed))
    }

    /// Deterministic constructor.
    pub fn make_with_seed(
        message: &ElGamalCiphertext,
        s: &ElementModQ,
        m: &ElementModP,
        k: &ElementModP,
        q_hat: &ElementModQ,
        seed: &ElementModQ,
    ) -> Self {
        let nonces = Nonces::with_header(seed, "chaum-pedersen-proof");
        let u = nonces.get(0);
        let a = g_pow_p(&u);
        let b = pow_mod_p(&message.pad, &u);
        let c = generic_challenge(q_hat, k, message, &a, &b, m);
        let v = a_minus_bc_mod_q(&u, &c, s);
        Self {
            pad: a,
            data: b,
            challenge: c,
            response: v,
        }
    }

    /// Checks the share `m` is consistent with the public commitment:
    /// `a = g^v * K^c` and `b = A^v * M^c`.
    pub fn validate(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        m: &ElementModP,
        q_hat: &ElementModQ,
    ) -> ValidationResult {
        let a = &self.pad;
        let b = &self.data;
        let c = &self.challenge;
        let v = &self.response;

        let consistent_c = *c == generic_challenge(q_hat, k, message, a, b, m);
        let consistent_gv = *a == mul_mod_p(&g_pow_p(v), &pow_mod_p(k, c));
        let consistent_av = *b == mul_mod_p(&pow_mod_p(&message.pad, v), &pow_mod_p(m, c));

        let result = ValidationResult::from_checks(&[
            ("in_bounds_alpha", message.pad.is_valid_residue()),
            ("in_bounds_beta", message.data.is_valid_residue()),
            ("in_bounds_a", a.is_valid_residue()),
            ("in_bounds_b", b.is_valid_residue()),
            ("in_bounds_c", c.is_in_bounds()),
            ("in_bounds_v", v.is_in_bounds()),
            ("consistent_c", consistent_c),
            ("consistent_gv", consistent_gv),
            ("consistent_av", consistent_av),
        ]);
        if !result.is_valid {
            info!(failed = ?result.failed, "invalid Chaum-Pedersen proof");
        }
        result
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        k: &ElementModP,
        m: &ElementModP,
        q_hat: &ElementModQ,
    ) -> bool {
        self.validate(message, k, m, q_hat).is_valid
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::constants::G;
    use crate::elgamal::{ElGamalKeyPair, elgamal_encrypt, elgamal_encrypt_with_base};

    fn keypair() -> ElGamalKeyPair {
        ElGamalKeyPair::from_secret(&ElementModQ::from_u64(2)).unwrap()
    }

    fn q_hat() -> ElementModQ {
        ElementModQ::from_u64(3)
    }

    // Scenario: plaintext 0 with nonce 1 and K = g^2 validates; mutating the
    // challenge must cause rejection.
    #[test]
    fn disjunctive_proof_roundtrip_zero() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(1);
        let message = elgamal_encrypt(0, &nonce, k).unwrap();
        let seed = ElementModQ::from_u64(99);

        let mut proof =
            DisjunctiveChaumPedersenProof::make_with_seed(&message, &nonce, k, &q_hat(), &seed, 0)
                .unwrap();
        assert!(proof.is_valid(&message, k, &q_hat()));

        proof.challenge = add_mod_q(&proof.challenge, &ElementModQ::from_u64(1));
        let result = proof.validate(&message, k, &q_hat());
        assert!(!result.is_valid);
        assert!(result.failed.contains(&"consistent_c"));
    }

    #[test]
    fn disjunctive_proof_roundtrip_one() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(5);
        let message = elgamal_encrypt(1, &nonce, k).unwrap();

        let proof =
            DisjunctiveChaumPedersenProof::make(&message, &nonce, k, &q_hat(), 1).unwrap();
        assert!(proof.is_valid(&message, k, &q_hat()));
    }

    #[test]
    fn disjunctive_proof_rejects_other_plaintexts() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(5);
        let message = elgamal_encrypt(2, &nonce, k).unwrap();
        assert!(matches!(
            DisjunctiveChaumPedersenProof::make(&message, &nonce, k, &q_hat(), 2),
            Err(EgError::PlaintextOutOfRange(2))
        ));
    }

    #[test]
    fn disjunctive_proof_is_deterministic_for_a_seed() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(7);
        let message = elgamal_encrypt(1, &nonce, k).unwrap();
        let seed = ElementModQ::from_u64(1234);

        let a =
            DisjunctiveChaumPedersenProof::make_with_seed(&message, &nonce, k, &q_hat(), &seed, 1)
                .unwrap();
        let b =
            DisjunctiveChaumPedersenProof::make_with_seed(&message, &nonce, k, &q_hat(), &seed, 1)
                .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn disjunctive_proof_from_precomputed_commitments() {
        let pair = keypair();
        let k = pair.public_key();
        for plaintext in [0u64, 1] {
            let precomputed = PrecomputedSelection::generate(k).unwrap();
            let nonce = precomputed.partial_encryption().secret().clone();
            let message = elgamal_encrypt(plaintext, &nonce, k).unwrap();
            let proof = DisjunctiveChaumPedersenProof::make_with_precomputed(
                &message,
                &precomputed,
                k,
                &q_hat(),
                plaintext,
            )
            .unwrap();
            assert!(proof.is_valid(&message, k, &q_hat()));
        }
    }

    #[test]
    fn ranged_proof_accepts_every_witness_in_range() {
        let pair = keypair();
        let k = pair.public_key();
        let limit = 2u64;
        for m in 0..=limit {
            let nonce = ElementModQ::from_u64(17 + m);
            let message = elgamal_encrypt(m, &nonce, k).unwrap();
            let proof = RangedChaumPedersenProof::make_with_seed(
                &message,
                &nonce,
                m,
                limit,
                k,
                &q_hat(),
                HashPrefix::CONTEST_PROOF,
                &ElementModQ::from_u64(555),
            )
            .unwrap();
            assert!(proof.is_valid(&message, k, &q_hat(), HashPrefix::CONTEST_PROOF));
        }
    }

    #[test]
    fn ranged_proof_rejects_witness_beyond_limit() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(21);
        let message = elgamal_encrypt(3, &nonce, k).unwrap();
        assert!(matches!(
            RangedChaumPedersenProof::make_with_seed(
                &message,
                &nonce,
                3,
                2,
                k,
                &q_hat(),
                HashPrefix::CONTEST_PROOF,
                &ElementModQ::from_u64(555),
            ),
            Err(EgError::RangeProofOutOfRange { .. })
        ));
    }

    #[test]
    fn ranged_proof_rejects_mismatched_ciphertext() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(23);
        let message = elgamal_encrypt(1, &nonce, k).unwrap();
        let proof = RangedChaumPedersenProof::make_with_seed(
            &message,
            &nonce,
            1,
            1,
            k,
            &q_hat(),
            HashPrefix::CONTEST_PROOF,
            &ElementModQ::from_u64(777),
        )
        .unwrap();

        // Validating against a different ciphertext must fail Fiat-Shamir.
        let other = elgamal_encrypt(1, &ElementModQ::from_u64(24), k).unwrap();
        assert!(!proof.is_valid(&other, k, &q_hat(), HashPrefix::CONTEST_PROOF));
    }

    #[test]
    fn constant_proof_roundtrip() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(29);
        // The constant proof verifies the base-g (1.0 compatible) encoding.
        let message = elgamal_encrypt_with_base(2, &nonce, k, &G).unwrap();
        let proof = ConstantChaumPedersenProof::make(
            &message,
            &nonce,
            k,
            &ElementModQ::from_u64(88),
            &q_hat(),
            2,
            false,
        );
        assert!(proof.is_valid(&message, k, &q_hat()));

        let mut tampered = proof.clone();
        tampered.constant = 3;
        assert!(!tampered.is_valid(&message, k, &q_hat()));
    }

    #[test]
    fn generic_proof_verifies_a_share() {
        let pair = keypair();
        let k = pair.public_key();
        let nonce = ElementModQ::from_u64(37);
        let message = elgamal_encrypt(1, &nonce, k).unwrap();
        let m = message.partial_decrypt(pair.secret_key());

        let proof = ChaumPedersenProof::make_with_seed(
            &message,
            pair.secret_key(),
            &m,
            k,
            &q_hat(),
            &ElementModQ::from_u64(4242),
        );
        assert!(proof.is_valid(&message, k, &m, &q_hat()));

        // A share for a different secret must not verify.
        let wrong = message.partial_decrypt(&ElementModQ::from_u64(3));
        assert!(!proof.is_valid(&message, k, &wrong, &q_hat()));
    }
}

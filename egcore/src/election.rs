// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The ciphertext election context: the public key `K`, the commitment and
//! manifest hashes, and the derived hash chain ending in the extended base
//! hash `Q'` that domain-separates every Fiat-Shamir challenge of the
//! election.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::PARAMETER_BASE_HASH;
use crate::group::{ElementModP, ElementModQ};
use crate::hash::{HashPrefix, hash_elems};

/// Behavior switches a deployment may set on the context.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextConfiguration {
    /// Whether overvoted contests normalize to all-zero selections instead
    /// of failing the ballot.
    pub allow_overvotes: bool,
    /// Upper bound on ballots a device may encrypt in one session, enforced
    /// by the encryption mediator.
    pub max_number_of_ballots: u64,
}

impl Default for ContextConfiguration {
    fn default() -> Self {
        Self {
            allow_overvotes: true,
            max_number_of_ballots: 1_000_000,
        }
    }
}

/// The immutable cryptographic context shared by every encryption in an
/// election.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiphertextElectionContext {
    pub number_of_guardians: u64,
    pub quorum: u64,
    /// The joint election public key `K`, flagged fixed-base.
    elgamal_public_key: ElementModP,
    pub commitment_hash: ElementModQ,
    pub manifest_hash: ElementModQ,
    pub parameter_hash: ElementModQ,
    pub crypto_base_hash: ElementModQ,
    pub crypto_extended_base_hash: ElementModQ,
    pub configuration: ContextConfiguration,
    pub extended_data: BTreeMap<String, String>,
}

impl CiphertextElectionContext {
    /// Derives the context hash chain from the election inputs.
    pub fn make(
        number_of_guardians: u64,
        quorum: u64,
        mut elgamal_public_key: ElementModP,
        commitment_hash: ElementModQ,
        manifest_hash: ElementModQ,
    ) -> Self {
        Self::make_with(
            number_of_guardians,
            quorum,
            {
                elgamal_public_key.set_is_fixed_base(true);
                elgamal_public_key
            },
            commitment_hash,
            manifest_hash,
            ContextConfiguration::default(),
            BTreeMap::new(),
        )
    }

    pub fn make_with(
        number_of_guardians: u64,
        quorum: u64,
        mut elgamal_public_key: ElementModP,
        commitment_hash: ElementModQ,
        manifest_hash: ElementModQ,
        configuration: ContextConfiguration,
        extended_data: BTreeMap<String, String>,
    ) -> Self {
        // HM = H(HP ; 01 ; manifest)
        let manifest_digest = hash_elems(&[
            (&*PARAMETER_BASE_HASH).into(),
            HashPrefix::MANIFEST_HASH.into(),
            (&manifest_hash).into(),
        ]);

        // HB = H(HP ; 02 ; HM, n, k)
        let crypto_base_hash = hash_elems(&[
            (&*PARAMETER_BASE_HASH).into(),
            HashPrefix::BASE_HASH.into(),
            (&manifest_digest).into(),
            number_of_guardians.into(),
            quorum.into(),
        ]);

        // HE = H(HB ; 12 ; K, commitments)
        let crypto_extended_base_hash = hash_elems(&[
            (&crypto_base_hash).into(),
            HashPrefix::EXTENDED_BASE_HASH.into(),
            (&elgamal_public_key).into(),
            (&commitment_hash).into(),
        ]);

        // Exponentiations against K go through the lookup tables.
        elgamal_public_key.set_is_fixed_base(true);

        Self {
            number_of_guardians,
            quorum,
            elgamal_public_key,
            commitment_hash,
            manifest_hash,
            parameter_hash: PARAMETER_BASE_HASH.clone(),
            crypto_base_hash,
            crypto_extended_base_hash,
            configuration,
            extended_data,
        }
    }

    pub fn elgamal_public_key(&self) -> &ElementModP {
        &self.elgamal_public_key
    }

    pub fn crypto_extended_base_hash(&self) -> &ElementModQ {
        &self.crypto_extended_base_hash
    }
}

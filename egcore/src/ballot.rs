// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Plaintext and ciphertext ballots.
//!
//! A ciphertext ballot exclusively owns its contests, each contest its
//! selections, each selection its ciphertext and proof; nonces live inside
//! the entity that derived them and are erased together when the ballot
//! reaches a terminal state.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::chaum_pedersen::{DisjunctiveChaumPedersenProof, RangedChaumPedersenProof};
use crate::election::CiphertextElectionContext;
use crate::elgamal::{ElGamalCiphertext, HashedElGamalCiphertext, elgamal_add};
use crate::errors::{EgError, EgResult};
use crate::group::{ElementModP, ElementModQ, add_mod_q};
use crate::hash::{CryptoHashable, HashInput, HashPrefix, hash_elems};
use crate::precompute::PrecomputedSelection;

//-------------------------------------------------------------------------------------------------|
// Plaintext model

/// A voter's mark for one selectable option.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextBallotSelection {
    pub object_id: String,
    /// 0 or 1 for the core encryption path.
    pub vote: u64,
    #[serde(default)]
    pub is_placeholder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_data: Option<String>,
}

impl PlaintextBallotSelection {
    pub fn new(object_id: &str, vote: u64) -> Self {
        Self {
            object_id: object_id.to_string(),
            vote,
            is_placeholder: false,
            write_in: None,
            extended_data: None,
        }
    }

    pub fn with_write_in(object_id: &str, vote: u64, write_in: &str) -> Self {
        Self {
            write_in: Some(write_in.to_string()),
            ..Self::new(object_id, vote)
        }
    }

    /// The selection is well formed for the given description.
    pub fn is_valid(&self, expected_object_id: &str) -> bool {
        if self.object_id != expected_object_id {
            info!(
                expected = expected_object_id,
                actual = %self.object_id,
                "plaintext selection object id mismatch"
            );
            return false;
        }
        if self.vote > 1 {
            info!(vote = self.vote, "plaintext selection vote out of range");
            return false;
        }
        true
    }
}

/// Outcome of checking a plaintext contest against its description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContestValidationState {
    Valid,
    /// More votes than the contest allows; normalizable when overvotes are
    /// permitted.
    Overvote,
    InvalidObjectId,
    TooManySelections,
    InvalidSelection,
}

/// A voter's marks for one contest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextBallotContest {
    pub object_id: String,
    pub selections: Vec<PlaintextBallotSelection>,
}

impl PlaintextBallotContest {
    pub fn new(object_id: &str, selections: Vec<PlaintextBallotSelection>) -> Self {
        Self {
            object_id: object_id.to_string(),
            selections,
        }
    }

    /// Total affirmative votes in the contest.
    pub fn selected_count(&self) -> u64 {
        self.selections.iter().map(|s| s.vote).sum()
    }

    pub fn validate(
        &self,
        expected_object_id: &str,
        expected_number_selections: usize,
        votes_allowed: u64,
    ) -> ContestValidationState {
        if self.object_id != expected_object_id {
            return ContestValidationState::InvalidObjectId;
        }
        if self.selections.len() > expected_number_selections {
            return ContestValidationState::TooManySelections;
        }
        if self.selections.iter().any(|s| s.vote > 1) {
            return ContestValidationState::InvalidSelection;
        }
        if self.selected_count() > votes_allowed {
            return ContestValidationState::Overvote;
        }
        ContestValidationState::Valid
    }
}

/// A voter's ballot in the clear.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaintextBallot {
    pub object_id: String,
    pub style_id: String,
    pub contests: Vec<PlaintextBallotContest>,
}

impl PlaintextBallot {
    pub fn new(object_id: &str, style_id: &str, contests: Vec<PlaintextBallotContest>) -> Self {
        Self {
            object_id: object_id.to_string(),
            style_id: style_id.to_string(),
            contests,
        }
    }
}

//-------------------------------------------------------------------------------------------------|
// Ciphertext model

/// An encrypted selection with its proof of being a 0-or-1 vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiphertextBallotSelection {
    pub object_id: String,
    pub sequence_order: u64,
    /// Hash of the selection description this encrypts.
    pub description_hash: ElementModQ,
    pub ciphertext: ElGamalCiphertext,
    pub is_placeholder: bool,
    /// The encryption nonce; erased once the ballot is submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<ElementModQ>,
    pub crypto_hash: ElementModQ,
    pub proof: DisjunctiveChaumPedersenProof,
    /// Optional auxiliary ciphertext (1.0-era extended data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_data: Option<ElGamalCiphertext>,
}

impl CiphertextBallotSelection {
    /// Constructs with a deterministic proof derived from the encryption
    /// nonce, so the selection is reconstructible from the ballot's root
    /// nonce.
    pub fn make_with_nonce(
        object_id: &str,
        sequence_order: u64,
        description_hash: ElementModQ,
        ciphertext: ElGamalCiphertext,
        context: &CiphertextElectionContext,
        plaintext: u64,
        is_placeholder: bool,
        nonce: ElementModQ,
    ) -> EgResult<Self> {
        let proof = DisjunctiveChaumPedersenProof::make_with_seed(
            &ciphertext,
            &nonce,
            context.elgamal_public_key(),
            context.crypto_extended_base_hash(),
            &nonce,
            plaintext,
        )?;
        let crypto_hash = ciphertext.crypto_hash();
        Ok(Self {
            object_id: object_id.to_string(),
            sequence_order,
            description_hash,
            ciphertext,
            is_placeholder,
            nonce: Some(nonce),
            crypto_hash,
            proof,
            extended_data: None,
        })
    }

    /// Constructs from precomputed values; no online exponentiations.
    pub fn make_with_precomputed(
        object_id: &str,
        sequence_order: u64,
        description_hash: ElementModQ,
        ciphertext: ElGamalCiphertext,
        context: &CiphertextElectionContext,
        precomputed: &PrecomputedSelection,
        plaintext: u64,
        is_placeholder: bool,
    ) -> EgResult<Self> {
        let proof = DisjunctiveChaumPedersenProof::make_with_precomputed(
            &ciphertext,
            precomputed,
            context.elgamal_public_key(),
            context.crypto_extended_base_hash(),
            plaintext,
        )?;
        let crypto_hash = ciphertext.crypto_hash();
        Ok(Self {
            object_id: object_id.to_string(),
            sequence_order,
            description_hash,
            ciphertext,
            is_placeholder,
            // The nonce used is the one baked into the precomputed values.
            nonce: Some(precomputed.partial_encryption().secret().clone()),
            crypto_hash,
            proof,
            extended_data: None,
        })
    }

    /// Constructs around a caller-supplied proof, which is validated here
    /// because nothing downstream guarantees it will be.
    pub fn make_with_proof(
        object_id: &str,
        sequence_order: u64,
        description_hash: ElementModQ,
        ciphertext: ElGamalCiphertext,
        context: &CiphertextElectionContext,
        proof: DisjunctiveChaumPedersenProof,
        nonce: Option<ElementModQ>,
    ) -> EgResult<Self> {
        if !proof.is_valid(
            &ciphertext,
            context.elgamal_public_key(),
            context.crypto_extended_base_hash(),
        ) {
            return Err(EgError::ProofConstructionFailed(object_id.to_string()));
        }
        let crypto_hash = ciphertext.crypto_hash();
        Ok(Self {
            object_id: object_id.to_string(),
            sequence_order,
            description_hash,
            ciphertext,
            is_placeholder: false,
            nonce,
            crypto_hash,
            proof,
            extended_data: None,
        })
    }

    /// Verifies this encryption against the seed (description hash) it
    /// claims, the public key, and the extended base hash.
    pub fn is_valid_encryption(
        &self,
        encryption_seed: &ElementModQ,
        elgamal_public_key: &ElementModP,
        crypto_extended_base_hash: &ElementModQ,
    ) -> bool {
        if *encryption_seed != self.description_hash {
            info!(
                object_id = %self.object_id,
                "ciphertext selection mismatching description hash"
            );
            return false;
        }
        let recalculated = self.ciphertext.crypto_hash();
        if self.crypto_hash != recalculated {
            info!(
                object_id = %self.object_id,
                "ciphertext selection mismatching crypto hash"
            );
            return false;
        }
        self.proof
            .is_valid(&self.ciphertext, elgamal_public_key, crypto_extended_base_hash)
    }

    fn erase_nonce(&mut self) {
        if let Some(nonce) = self.nonce.as_mut() {
            nonce.zeroize();
        }
        self.nonce = None;
    }
}

impl CryptoHashable for CiphertextBallotSelection {
    fn crypto_hash(&self) -> ElementModQ {
        self.crypto_hash.clone()
    }
}

/// An encrypted contest: the selections, their homomorphic accumulation,
/// the range proof over the accumulated count, and the encrypted extended
/// data (write-ins, overvote records).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiphertextBallotContest {
    pub object_id: String,
    pub sequence_order: u64,
    /// Hash of the contest description this encrypts.
    pub description_hash: ElementModQ,
    pub selections: Vec<CiphertextBallotSelection>,
    /// The contest nonce; erased once the ballot is submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<ElementModQ>,
    pub ciphertext_accumulation: ElGamalCiphertext,
    pub crypto_hash: ElementModQ,
    pub proof: RangedChaumPedersenProof,
    pub extended_data: HashedElGamalCiphertext,
}

impl CiphertextBallotContest {
    /// Assembles the contest, computing the accumulation, the crypto hash,
    /// and a deterministic range proof witnessed by the aggregate nonce.
    /// The proof is validated before the contest is returned; a bad proof is
    /// fatal for the encryption.
    #[allow(clippy::too_many_arguments)]
    pub fn make(
        object_id: &str,
        sequence_order: u64,
        description_hash: ElementModQ,
        mut selections: Vec<CiphertextBallotSelection>,
        context: &CiphertextElectionContext,
        proof_seed: &ElementModQ,
        number_selected: u64,
        number_elected: u64,
        nonce: Option<ElementModQ>,
        extended_data: HashedElGamalCiphertext,
    ) -> EgResult<Self> {
        // Keep the selections in description order.
        selections.sort_by_key(|s| s.sequence_order);

        let crypto_hash = Self::make_crypto_hash(
            context.elgamal_public_key(),
            context.crypto_extended_base_hash(),
            sequence_order,
            &selections,
        )?;

        let accumulation = Self::elgamal_accumulate(&selections)?;
        let aggregate = Self::aggregate_nonce(&selections)
            .ok_or_else(|| EgError::ProofConstructionFailed(object_id.to_string()))?;

        let proof = RangedChaumPedersenProof::make_with_seed(
            &accumulation,
            &aggregate,
            number_selected,
            number_elected,
            context.elgamal_public_key(),
            context.crypto_extended_base_hash(),
            HashPrefix::CONTEST_PROOF,
            proof_seed,
        )?;

        // A caller cannot observe an invalid proof downstream (e.g. when a
        // record round-trips through serialization), so check here.
        let validation = proof.validate(
            &accumulation,
            context.elgamal_public_key(),
            context.crypto_extended_base_hash(),
            HashPrefix::CONTEST_PROOF,
        );
        if !validation.is_valid {
            return Err(EgError::ProofConstructionFailed(object_id.to_string()));
        }

        Ok(Self {
            object_id: object_id.to_string(),
            sequence_order,
            description_hash,
            selections,
            nonce,
            ciphertext_accumulation: accumulation,
            crypto_hash,
            proof,
            extended_data,
        })
    }

    /// `H(Q' ; 20 ; seed, sequence_order)`, the per-contest nonce.
    pub fn contest_nonce(
        context: &CiphertextElectionContext,
        sequence_order: u64,
        nonce_seed: &ElementModQ,
    ) -> ElementModQ {
        hash_elems(&[
            context.crypto_extended_base_hash().into(),
            HashPrefix::SELECTION_NONCE.into(),
            nonce_seed.into(),
            sequence_order.into(),
        ])
    }

    /// Sum of the selection nonces, if every selection still has one.
    pub fn aggregate_nonce(selections: &[CiphertextBallotSelection]) -> Option<ElementModQ> {
        let mut sum = ElementModQ::from_u64(0);
        for selection in selections {
            sum = add_mod_q(&sum, selection.nonce.as_ref()?);
        }
        Some(sum)
    }

    /// Component-wise product of the selection ciphertexts.
    pub fn elgamal_accumulate(
        selections: &[CiphertextBallotSelection],
    ) -> EgResult<ElGamalCiphertext> {
        elgamal_add(selections.iter().map(|s| &s.ciphertext))
    }

    /// `H(Q' ; 23 ; sequence_order, K, selection crypto hashes...)`
    pub fn make_crypto_hash(
        elgamal_public_key: &ElementModP,
        crypto_extended_base_hash: &ElementModQ,
        sequence_order: u64,
        selections: &[CiphertextBallotSelection],
    ) -> EgResult<ElementModQ> {
        if selections.is_empty() {
            return Err(EgError::ContestHasNoSelections);
        }
        let mut items: Vec<HashInput> = vec![
            crypto_extended_base_hash.into(),
            HashPrefix::CONTEST_HASH.into(),
            sequence_order.into(),
            elgamal_public_key.into(),
        ];
        for selection in selections {
            items.push((&selection.crypto_hash).into());
        }
        Ok(hash_elems(&items))
    }

    /// Verifies the contest: hash consistency, accumulation consistency,
    /// and the range proof. Selection proofs are checked separately.
    pub fn is_valid_encryption(
        &self,
        encryption_seed: &ElementModQ,
        elgamal_public_key: &ElementModP,
        crypto_extended_base_hash: &ElementModQ,
    ) -> bool {
        let consistent_seed = *encryption_seed == self.description_hash;
        if !consistent_seed {
            debug!(object_id = %self.object_id, "contest mismatching description hash");
        }

        let consistent_crypto_hash = match Self::make_crypto_hash(
            elgamal_public_key,
            crypto_extended_base_hash,
            self.sequence_order,
            &self.selections,
        ) {
            Ok(recalculated) => {
                let ok = recalculated == self.crypto_hash;
                if !ok {
                    debug!(object_id = %self.object_id, "contest mismatching crypto hash");
                }
                ok
            }
            Err(_) => false,
        };

        let (consistent_accumulation, valid_proof) = match Self::elgamal_accumulate(&self.selections)
        {
            Ok(computed) => {
                let consistent = computed == self.ciphertext_accumulation;
                if !consistent {
                    debug!(
                        object_id = %self.object_id,
                        "contest ciphertext does not equal the accumulation"
                    );
                }
                let valid = self
                    .proof
                    .validate(
                        &computed,
                        elgamal_public_key,
                        crypto_extended_base_hash,
                        HashPrefix::CONTEST_PROOF,
                    )
                    .is_valid;
                (consistent, valid)
            }
            Err(_) => (false, false),
        };

        let success =
            consistent_seed && consistent_crypto_hash && consistent_accumulation && valid_proof;
        if !success {
            info!(
                object_id = %self.object_id,
                consistent_seed,
                consistent_crypto_hash,
                consistent_accumulation,
                valid_proof,
                "contest failed is_valid_encryption"
            );
        }
        success
    }

    fn erase_nonces(&mut self) {
        for selection in &mut self.selections {
            selection.erase_nonce();
        }
        if let Some(nonce) = self.nonce.as_mut() {
            nonce.zeroize();
        }
        self.nonce = None;
    }
}

impl CryptoHashable for CiphertextBallotContest {
    fn crypto_hash(&self) -> ElementModQ {
        self.crypto_hash.clone()
    }
}

/// Where a ballot sits in its lifecycle. Terminal states are mutually
/// exclusive; once reached, no further transition is legal.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BallotBoxState {
    #[default]
    Unknown,
    Cast,
    Spoiled,
    Challenged,
}

impl BallotBoxState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BallotBoxState::Unknown)
    }
}

/// An encrypted ballot: the contests, the hash chain anchor (ballot code),
/// and the nonce tree that makes it reproducible until it is submitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiphertextBallot {
    pub object_id: String,
    pub style_id: String,
    pub manifest_hash: ElementModQ,
    pub ballot_code_seed: ElementModQ,
    pub contests: Vec<CiphertextBallotContest>,
    pub ballot_code: ElementModQ,
    pub timestamp: u64,
    /// The root nonce; erased once the ballot is submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<ElementModQ>,
    pub crypto_hash: ElementModQ,
    pub state: BallotBoxState,
}

impl CiphertextBallot {
    #[allow(clippy::too_many_arguments)]
    pub fn make(
        object_id: &str,
        style_id: &str,
        manifest_hash: ElementModQ,
        context: &CiphertextElectionContext,
        contests: Vec<CiphertextBallotContest>,
        nonce: Option<ElementModQ>,
        timestamp: u64,
        ballot_code_seed: ElementModQ,
        aux: &str,
    ) -> EgResult<Self> {
        if contests.is_empty() {
            return Err(EgError::BallotHasNoContests);
        }

        let crypto_hash =
            Self::make_crypto_hash(context.crypto_extended_base_hash(), &contests, aux)?;
        let timestamp = if timestamp == 0 {
            system_timestamp()
        } else {
            timestamp
        };
        // The ballot code and the crypto hash are one and the same value.
        let ballot_code = crypto_hash.clone();

        Ok(Self {
            object_id: object_id.to_string(),
            style_id: style_id.to_string(),
            manifest_hash,
            ballot_code_seed,
            contests,
            ballot_code,
            timestamp,
            nonce,
            crypto_hash,
            state: BallotBoxState::Unknown,
        })
    }

    /// `H(manifest_hash, object_id, nonce)`, the seed every other nonce on
    /// the ballot derives from.
    pub fn nonce_seed(
        manifest_hash: &ElementModQ,
        object_id: &str,
        nonce: &ElementModQ,
    ) -> ElementModQ {
        hash_elems(&[manifest_hash.into(), object_id.into(), nonce.into()])
    }

    /// `H(Q' ; 24 ; aux, contest crypto hashes...)`
    pub fn make_crypto_hash(
        crypto_extended_base_hash: &ElementModQ,
        contests: &[CiphertextBallotContest],
        aux: &str,
    ) -> EgResult<ElementModQ> {
        if contests.is_empty() {
            return Err(EgError::BallotHasNoContests);
        }
        let mut items: Vec<HashInput> = vec![
            crypto_extended_base_hash.into(),
            HashPrefix::BALLOT_CODE.into(),
            aux.into(),
        ];
        for contest in contests {
            items.push((&contest.crypto_hash).into());
        }
        Ok(hash_elems(&items))
    }

    /// Recursively verifies every selection and contest proof plus the
    /// ballot-level hashes. Logs each failing component; does not raise.
    pub fn is_valid_encryption(
        &self,
        manifest_hash: &ElementModQ,
        elgamal_public_key: &ElementModP,
        crypto_extended_base_hash: &ElementModQ,
        aux: &str,
    ) -> bool {
        if *manifest_hash != self.manifest_hash {
            info!(object_id = %self.object_id, "ballot mismatching manifest hash");
            return false;
        }

        match Self::make_crypto_hash(crypto_extended_base_hash, &self.contests, aux) {
            Ok(recalculated) if recalculated == self.crypto_hash => {}
            _ => {
                info!(object_id = %self.object_id, "ballot mismatching crypto hash");
                return false;
            }
        }

        let mut is_valid = true;
        for contest in &self.contests {
            for selection in &contest.selections {
                let ok = selection.is_valid_encryption(
                    &selection.description_hash,
                    elgamal_public_key,
                    crypto_extended_base_hash,
                );
                if !ok {
                    info!(
                        contest = %contest.object_id,
                        selection = %selection.object_id,
                        "ballot has invalid selection proof"
                    );
                    is_valid = false;
                }
            }
            let ok = contest.is_valid_encryption(
                &contest.description_hash,
                elgamal_public_key,
                crypto_extended_base_hash,
            );
            if !ok {
                info!(contest = %contest.object_id, "ballot has invalid contest proof");
                is_valid = false;
            }
        }
        is_valid
    }

    /// Marks the ballot cast and erases every nonce in the tree.
    pub fn cast(&mut self) -> EgResult<()> {
        self.transition(BallotBoxState::Cast)
    }

    /// Marks the ballot spoiled and erases every nonce in the tree.
    pub fn spoil(&mut self) -> EgResult<()> {
        self.transition(BallotBoxState::Spoiled)
    }

    /// Marks the ballot challenged and erases every nonce in the tree.
    pub fn challenge(&mut self) -> EgResult<()> {
        self.transition(BallotBoxState::Challenged)
    }

    fn transition(&mut self, to: BallotBoxState) -> EgResult<()> {
        if self.state.is_terminal() {
            return Err(EgError::IllegalBallotStateTransition(self.state.to_string()));
        }
        for contest in &mut self.contests {
            contest.erase_nonces();
        }
        if let Some(nonce) = self.nonce.as_mut() {
            nonce.zeroize();
        }
        self.nonce = None;
        self.state = to;
        Ok(())
    }
}

impl CryptoHashable for CiphertextBallot {
    fn crypto_hash(&self) -> ElementModQ {
        self.crypto_hash.clone()
    }
}

/// A ciphertext ballot whose state is terminal and whose nonce tree has
/// been erased.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmittedBallot(CiphertextBallot);

impl SubmittedBallot {
    /// Submits the ballot in the given terminal state, applying the
    /// transition if it has not happened yet.
    pub fn from_ballot(mut ballot: CiphertextBallot, state: BallotBoxState) -> EgResult<Self> {
        if !state.is_terminal() {
            return Err(EgError::IllegalBallotStateTransition(state.to_string()));
        }
        if ballot.state != state {
            ballot.transition(state)?;
        }
        Ok(Self(ballot))
    }

    pub fn ballot(&self) -> &CiphertextBallot {
        &self.0
    }
}

pub(crate) fn system_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

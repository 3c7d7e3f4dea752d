// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The ballot encryption pipeline.
//!
//! `encrypt_ballot` normalizes the voter's selections against the manifest,
//! derives the nonce tree from a single root nonce, encrypts every
//! selection and contest, and assembles the ciphertext ballot whose ballot
//! code anchors it into the election's hash chain. [`EncryptionMediator`]
//! wraps the pipeline for a device, chaining each ballot's code into the
//! next ballot's seed.

use serde_json::json;
use tracing::{debug, info, trace};

use crate::ballot::{
    CiphertextBallot, CiphertextBallotContest, CiphertextBallotSelection, ContestValidationState,
    PlaintextBallot, PlaintextBallotContest, PlaintextBallotSelection, system_timestamp,
};
use crate::election::CiphertextElectionContext;
use crate::elgamal::{elgamal_encrypt, elgamal_encrypt_precomputed, hashed_elgamal_encrypt};
use crate::errors::{EgError, EgResult};
use crate::group::{ElementModQ, rand_q};
use crate::hash::{CryptoHashable, HashPrefix, hash_elems};
use crate::manifest::{
    ContestDescriptionWithPlaceholders, InternalManifest, SelectionDescription,
};
use crate::precompute::PrecomputeBufferContext;

/// Capacity of the encrypted extended-data payload, in bytes.
const EXTENDED_DATA_MAX_LEN: usize = 512;

//-------------------------------------------------------------------------------------------------|
// Encryption device and mediator

/// The physical device performing encryptions; its hash seeds the ballot
/// code chain.
#[derive(Clone, Debug)]
pub struct EncryptionDevice {
    pub device_uuid: u64,
    pub session_uuid: u64,
    pub launch_code: u64,
    pub location: String,
}

impl EncryptionDevice {
    pub fn new(device_uuid: u64, session_uuid: u64, launch_code: u64, location: &str) -> Self {
        trace!(device_uuid, location, "encryption device created");
        Self {
            device_uuid,
            session_uuid,
            launch_code,
            location: location.to_string(),
        }
    }

    /// `H(deviceUuid, sessionUuid, launchCode, location)`
    pub fn hash(&self) -> ElementModQ {
        hash_elems(&[
            self.device_uuid.into(),
            self.session_uuid.into(),
            self.launch_code.into(),
            (&self.location).into(),
        ])
    }

    pub fn timestamp(&self) -> u64 {
        system_timestamp()
    }
}

/// Encrypts ballots for one device, chaining each encrypted ballot's code
/// into the seed of the next. The chain makes gaps in the election record
/// provable, though the chaining itself is a convenience of the mediator,
/// not a requirement on individual encryptions.
pub struct EncryptionMediator<'a> {
    manifest: &'a InternalManifest,
    context: &'a CiphertextElectionContext,
    device: &'a EncryptionDevice,
    ballot_code_seed: Option<ElementModQ>,
    ballots_encrypted: u64,
}

impl<'a> EncryptionMediator<'a> {
    pub fn new(
        manifest: &'a InternalManifest,
        context: &'a CiphertextElectionContext,
        device: &'a EncryptionDevice,
    ) -> EgResult<Self> {
        if manifest.manifest_hash != context.manifest_hash {
            return Err(EgError::ManifestContextHashMismatch {
                manifest: manifest.manifest_hash.to_hex(),
                context: context.manifest_hash.to_hex(),
            });
        }
        Ok(Self {
            manifest,
            context,
            device,
            ballot_code_seed: None,
            ballots_encrypted: 0,
        })
    }

    /// Ballots encrypted by this mediator so far.
    pub fn ballots_encrypted(&self) -> u64 {
        self.ballots_encrypted
    }

    /// Encrypts a ballot and rolls the chain seed forward to its code.
    pub fn encrypt(
        &mut self,
        ballot: &PlaintextBallot,
        verify_proofs: bool,
        use_precompute: bool,
    ) -> EgResult<CiphertextBallot> {
        trace!(object_id = %ballot.object_id, "mediator encrypt");
        let limit = self.context.configuration.max_number_of_ballots;
        if self.ballots_encrypted >= limit {
            return Err(EgError::BallotLimitExceeded(limit));
        }

        let seed = match &self.ballot_code_seed {
            Some(seed) => seed.clone(),
            None => {
                let device_hash = self.device.hash();
                trace!("mediator: ballot code seed instantiated from device hash");
                device_hash
            }
        };

        let encrypted = encrypt_ballot(
            ballot,
            self.manifest,
            self.context,
            &seed,
            None,
            self.device.timestamp(),
            verify_proofs,
            use_precompute,
            self.context.configuration.allow_overvotes,
        )?;

        self.ballot_code_seed = Some(encrypted.ballot_code.clone());
        self.ballots_encrypted += 1;
        Ok(encrypted)
    }
}

//-------------------------------------------------------------------------------------------------|
// Normalization helpers

fn selection_from(
    description: &SelectionDescription,
    is_placeholder: bool,
    is_affirmative: bool,
) -> PlaintextBallotSelection {
    PlaintextBallotSelection {
        object_id: description.object_id.clone(),
        vote: u64::from(is_affirmative),
        is_placeholder,
        write_in: None,
        extended_data: None,
    }
}

/// A contest with every selection explicitly false.
fn contest_from(description: &ContestDescriptionWithPlaceholders) -> PlaintextBallotContest {
    let selections = description
        .contest
        .selections
        .iter()
        .map(|sd| selection_from(sd, false, false))
        .collect();
    PlaintextBallotContest::new(&description.contest.object_id, selections)
}

/// Adopts the provided selections and emplaces any the voter omitted as
/// explicit false votes, so consumers may pass only the marked options.
fn emplace_missing_selections(
    contest: &PlaintextBallotContest,
    description: &ContestDescriptionWithPlaceholders,
) -> PlaintextBallotContest {
    let selections = description
        .contest
        .selections
        .iter()
        .map(|sd| {
            contest
                .selections
                .iter()
                .find(|s| s.object_id == sd.object_id)
                .cloned()
                .unwrap_or_else(|| selection_from(sd, false, false))
        })
        .collect();
    PlaintextBallotContest::new(&description.contest.object_id, selections)
}

/// Adopts the provided contests and emplaces missing ones with all-false
/// selections.
fn emplace_missing_contests(
    ballot: &PlaintextBallot,
    manifest: &InternalManifest,
) -> PlaintextBallot {
    let contests = manifest
        .contests_for(&ballot.style_id)
        .into_iter()
        .map(|description| {
            match ballot
                .contests
                .iter()
                .find(|c| c.object_id == description.contest.object_id)
            {
                Some(contest) => emplace_missing_selections(contest, description),
                None => contest_from(description),
            }
        })
        .collect();
    PlaintextBallot::new(&ballot.object_id, &ballot.style_id, contests)
}

//-------------------------------------------------------------------------------------------------|
// Extended data

/// Collects overvote and write-in information for a contest into the JSON
/// payload that rides along as hashed-ElGamal extended data.
fn encode_extended_data(
    contest: &PlaintextBallotContest,
    manifest: &InternalManifest,
    is_overvote: bool,
) -> String {
    let mut payload = serde_json::Map::new();

    if is_overvote {
        let error_data: Vec<serde_json::Value> = contest
            .selections
            .iter()
            .filter(|s| s.vote == 1)
            .map(|s| json!(s.object_id))
            .collect();
        payload.insert("error".to_string(), json!("overvote"));
        payload.insert("error_data".to_string(), json!(error_data));
    }

    let ballot_selections: &[SelectionDescription] = manifest
        .contest(&contest.object_id)
        .map(|c| c.contest.selections.as_slice())
        .unwrap_or(&[]);

    let mut write_ins = serde_json::Map::new();
    for selection in contest.selections.iter().filter(|s| s.vote == 1) {
        let Some(description) = ballot_selections
            .iter()
            .find(|sd| sd.object_id == selection.object_id)
        else {
            continue;
        };
        let is_write_in = manifest
            .candidate(&description.candidate_id)
            .map(|c| c.is_write_in)
            .unwrap_or(false);
        if is_write_in {
            if let Some(text) = &selection.write_in {
                write_ins.insert(selection.object_id.clone(), json!(text));
            }
        }
    }
    if !write_ins.is_empty() {
        payload.insert("write_ins".to_string(), serde_json::Value::Object(write_ins));
    }

    if payload.is_empty() {
        String::new()
    } else {
        serde_json::Value::Object(payload).to_string()
    }
}

//-------------------------------------------------------------------------------------------------|
// Encryption functions

/// Encrypts one selection.
///
/// With `use_precompute`, and only when the buffer is bound to this
/// election's key, the encryption and both proof branches come from a
/// popped [`PrecomputedSelection`]; otherwise the selection nonce is derived
/// from the contest nonce and the proof is built deterministically from it,
/// keeping the whole ballot reconstructible from the root nonce.
pub fn encrypt_selection(
    selection: &PlaintextBallotSelection,
    description: &SelectionDescription,
    context: &CiphertextElectionContext,
    contest_nonce: &ElementModQ,
    is_placeholder: bool,
    verify_proofs: bool,
    use_precompute: bool,
) -> EgResult<CiphertextBallotSelection> {
    if !selection.is_valid(&description.object_id) {
        return Err(EgError::InvalidPlaintextSelection(
            selection.object_id.clone(),
        ));
    }

    let description_hash = description.crypto_hash();
    let sequence_order = description.sequence_order;
    trace!(object_id = %selection.object_id, "encrypt selection");

    let mut encrypted: Option<CiphertextBallotSelection> = None;

    // Use precomputed values only when they were generated for this key.
    if use_precompute
        && PrecomputeBufferContext::public_key().as_ref() == Some(context.elgamal_public_key())
    {
        if let Some(precomputed) = PrecomputeBufferContext::pop_selection() {
            trace!("encrypt selection: using precomputed values");
            let ciphertext = elgamal_encrypt_precomputed(
                selection.vote,
                context.elgamal_public_key(),
                precomputed.partial_encryption(),
            );
            encrypted = Some(CiphertextBallotSelection::make_with_precomputed(
                &selection.object_id,
                sequence_order,
                description_hash.clone(),
                ciphertext,
                context,
                &precomputed,
                selection.vote,
                is_placeholder,
            )?);
        }
    }

    let encrypted = match encrypted {
        Some(e) => e,
        None => {
            trace!("encrypt selection: generating values in real time");
            let selection_nonce = hash_elems(&[contest_nonce.into(), sequence_order.into()]);
            let ciphertext =
                elgamal_encrypt(selection.vote, &selection_nonce, context.elgamal_public_key())?;
            CiphertextBallotSelection::make_with_nonce(
                &selection.object_id,
                sequence_order,
                description_hash.clone(),
                ciphertext,
                context,
                selection.vote,
                is_placeholder,
                selection_nonce,
            )?
        }
    };

    if !verify_proofs {
        return Ok(encrypted);
    }
    if encrypted.is_valid_encryption(
        &description_hash,
        context.elgamal_public_key(),
        context.crypto_extended_base_hash(),
    ) {
        Ok(encrypted)
    } else {
        Err(EgError::BallotFailsValidityCheck(format!(
            "selection {}",
            selection.object_id
        )))
    }
}

/// Encrypts one contest: normalizes the selections, encrypts each, then
/// emits the accumulation's range proof and the hashed-ElGamal extended
/// data.
#[allow(clippy::too_many_arguments)]
pub fn encrypt_contest(
    contest: &PlaintextBallotContest,
    manifest: &InternalManifest,
    description: &ContestDescriptionWithPlaceholders,
    context: &CiphertextElectionContext,
    nonce_seed: &ElementModQ,
    verify_proofs: bool,
    use_precompute: bool,
    allow_overvotes: bool,
) -> EgResult<CiphertextBallotContest> {
    let validation = contest.validate(
        &description.contest.object_id,
        description.contest.selections.len(),
        description.contest.votes_allowed,
    );
    let is_overvote = validation == ContestValidationState::Overvote;
    match validation {
        ContestValidationState::Valid => {}
        ContestValidationState::Overvote => {
            if !allow_overvotes {
                return Err(EgError::ContestOvervote(contest.object_id.clone()));
            }
            debug!(object_id = %contest.object_id, "overvote: normalizing selections to zero");
        }
        _ => {
            return Err(EgError::InvalidPlaintextContest(contest.object_id.clone()));
        }
    }

    let description_hash = description.crypto_hash();
    let contest_nonce =
        CiphertextBallotContest::contest_nonce(context, description.contest.sequence_order, nonce_seed);

    // An overvote zeroes out every selection; otherwise the voter's marks
    // are adopted and any missing option becomes an explicit false.
    let normalized = if is_overvote {
        contest_from(description)
    } else {
        emplace_missing_selections(contest, description)
    };

    let mut selection_count = 0u64;
    let mut encrypted_selections = Vec::with_capacity(description.contest.selections.len());
    for selection_description in &description.contest.selections {
        let Some(selection) = normalized
            .selections
            .iter()
            .find(|s| s.object_id == selection_description.object_id)
        else {
            // Cannot happen after normalization.
            return Err(EgError::InvalidPlaintextContest(contest.object_id.clone()));
        };
        selection_count += selection.vote;
        encrypted_selections.push(encrypt_selection(
            selection,
            selection_description,
            context,
            &contest_nonce,
            false,
            verify_proofs,
            use_precompute,
        )?);
    }

    // Write-ins and overvote records ride along encrypted, derived from the
    // contest nonce and a constant.
    let extended_data = encode_extended_data(contest, manifest, is_overvote);
    let extended_data_nonce = hash_elems(&[(&contest_nonce).into(), "contest-data".into()]);
    let hashed_extended_data = hashed_elgamal_encrypt(
        extended_data.as_bytes(),
        &extended_data_nonce,
        HashPrefix::CONTEST_DATA_SECRET,
        context.elgamal_public_key(),
        context.crypto_extended_base_hash(),
        EXTENDED_DATA_MAX_LEN,
        true,
        use_precompute,
    )?;

    let encrypted = CiphertextBallotContest::make(
        &contest.object_id,
        description.contest.sequence_order,
        description_hash.clone(),
        encrypted_selections,
        context,
        &contest_nonce,
        selection_count,
        description.contest.number_elected,
        Some(contest_nonce.clone()),
        hashed_extended_data,
    )?;

    if !verify_proofs {
        return Ok(encrypted);
    }
    if encrypted.is_valid_encryption(
        &description_hash,
        context.elgamal_public_key(),
        context.crypto_extended_base_hash(),
    ) {
        Ok(encrypted)
    } else {
        Err(EgError::BallotFailsValidityCheck(format!(
            "contest {}",
            contest.object_id
        )))
    }
}

fn encrypt_contests(
    ballot: &PlaintextBallot,
    manifest: &InternalManifest,
    context: &CiphertextElectionContext,
    nonce_seed: &ElementModQ,
    verify_proofs: bool,
    use_precompute: bool,
    allow_overvotes: bool,
) -> EgResult<Vec<CiphertextBallotContest>> {
    let normalized = emplace_missing_contests(ballot, manifest);
    let mut encrypted_contests = Vec::with_capacity(normalized.contests.len());

    for description in manifest.contests_for(&ballot.style_id) {
        let Some(contest) = normalized
            .contests
            .iter()
            .find(|c| c.object_id == description.contest.object_id)
        else {
            // Cannot happen after normalization.
            return Err(EgError::ContestNotFound(
                description.contest.object_id.clone(),
            ));
        };
        encrypted_contests.push(encrypt_contest(
            contest,
            manifest,
            description,
            context,
            nonce_seed,
            verify_proofs,
            use_precompute,
            allow_overvotes,
        )?);
    }
    Ok(encrypted_contests)
}

/// Encrypts a plaintext ballot.
///
/// Fails when the ballot style is unknown, when a nonce is supplied
/// together with `use_precompute` (precomputed values would silently break
/// nonce determinism), or, under `verify_proofs`, when the assembled ballot
/// does not verify.
#[allow(clippy::too_many_arguments)]
pub fn encrypt_ballot(
    ballot: &PlaintextBallot,
    manifest: &InternalManifest,
    context: &CiphertextElectionContext,
    ballot_code_seed: &ElementModQ,
    nonce: Option<ElementModQ>,
    timestamp: u64,
    verify_proofs: bool,
    use_precompute: bool,
    allow_overvotes: bool,
) -> EgResult<CiphertextBallot> {
    trace!(object_id = %ballot.object_id, "encrypt ballot");
    if manifest.ballot_style(&ballot.style_id).is_none() {
        return Err(EgError::BallotStyleNotFound(ballot.style_id.clone()));
    }

    if nonce.is_some() && use_precompute {
        return Err(EgError::NonceWithPrecompute);
    }

    // Without a caller nonce, draw a random root for the nonce tree.
    let nonce = match nonce {
        Some(n) => n,
        None => rand_q()?,
    };

    // Bind the election and the external id into every derived nonce.
    let nonce_seed =
        CiphertextBallot::nonce_seed(&manifest.manifest_hash, &ballot.object_id, &nonce);

    let encrypted_contests = encrypt_contests(
        ballot,
        manifest,
        context,
        &nonce_seed,
        verify_proofs,
        use_precompute,
        allow_overvotes,
    )?;

    let timestamp = if timestamp == 0 {
        system_timestamp()
    } else {
        timestamp
    };

    let encrypted = CiphertextBallot::make(
        &ballot.object_id,
        &ballot.style_id,
        manifest.manifest_hash.clone(),
        context,
        encrypted_contests,
        Some(nonce),
        timestamp,
        ballot_code_seed.clone(),
        "",
    )?;

    if !verify_proofs {
        trace!("encrypt ballot: bypassing proof verification");
        return Ok(encrypted);
    }
    if encrypted.is_valid_encryption(
        &manifest.manifest_hash,
        context.elgamal_public_key(),
        context.crypto_extended_base_hash(),
        "",
    ) {
        debug!(object_id = %ballot.object_id, "encrypt ballot: proof verification success");
        Ok(encrypted)
    } else {
        info!(object_id = %ballot.object_id, "encrypt ballot: failed validity check");
        Err(EgError::BallotFailsValidityCheck(format!(
            "ballot {}",
            ballot.object_id
        )))
    }
}

//-------------------------------------------------------------------------------------------------|
// Compact ballots

/// A space-efficient ballot: the normalized plaintext plus the root nonce,
/// from which the full ciphertext ballot can be rehydrated on demand.
/// Compact ballots never use precomputed values, since rehydration depends
/// on the nonces being deterministic.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CompactCiphertextBallot {
    pub plaintext: PlaintextBallot,
    pub ballot_code_seed: ElementModQ,
    pub ballot_code: ElementModQ,
    pub timestamp: u64,
    pub nonce: ElementModQ,
}

/// Encrypts a ballot into its compact form.
pub fn encrypt_compact_ballot(
    ballot: &PlaintextBallot,
    manifest: &InternalManifest,
    context: &CiphertextElectionContext,
    ballot_code_seed: &ElementModQ,
    nonce: Option<ElementModQ>,
    timestamp: u64,
    verify_proofs: bool,
) -> EgResult<CompactCiphertextBallot> {
    if manifest.ballot_style(&ballot.style_id).is_none() {
        return Err(EgError::BallotStyleNotFound(ballot.style_id.clone()));
    }
    let normalized = emplace_missing_contests(ballot, manifest);
    let encrypted = encrypt_ballot(
        &normalized,
        manifest,
        context,
        ballot_code_seed,
        nonce,
        timestamp,
        verify_proofs,
        false,
        context.configuration.allow_overvotes,
    )?;
    let Some(nonce) = encrypted.nonce.clone() else {
        // encrypt_ballot always retains the root nonce.
        return Err(EgError::BallotFailsValidityCheck(format!(
            "ballot {}",
            ballot.object_id
        )));
    };
    Ok(CompactCiphertextBallot {
        plaintext: normalized,
        ballot_code_seed: encrypted.ballot_code_seed.clone(),
        ballot_code: encrypted.ballot_code.clone(),
        timestamp: encrypted.timestamp,
        nonce,
    })
}

impl CompactCiphertextBallot {
    /// Re-derives the full ciphertext ballot from the retained nonce and
    /// checks that its ballot code matches the one recorded at encryption.
    pub fn expand(
        &self,
        manifest: &InternalManifest,
        context: &CiphertextElectionContext,
    ) -> EgResult<CiphertextBallot> {
        let encrypted = encrypt_ballot(
            &self.plaintext,
            manifest,
            context,
            &self.ballot_code_seed,
            Some(self.nonce.clone()),
            self.timestamp,
            false,
            false,
            context.configuration.allow_overvotes,
        )?;
        if encrypted.ballot_code != self.ballot_code {
            return Err(EgError::BallotFailsValidityCheck(format!(
                "compact ballot {}",
                self.plaintext.object_id
            )));
        }
        Ok(encrypted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::ballot::BallotBoxState;
    use crate::elgamal::ElGamalKeyPair;
    use crate::manifest::{BallotStyle, Candidate, ContestDescription};

    /// Style 1 carries only the city contest; style 2 adds the county one.
    fn manifest() -> InternalManifest {
        let city_contest = ContestDescription::new(
            "contest-1",
            "gp-unit-1",
            1,
            1,
            1,
            vec![
                SelectionDescription::new("sel-A", 1, "candidate-A"),
                SelectionDescription::new("sel-B", 2, "candidate-B"),
            ],
        );
        let county_contest = ContestDescription::new(
            "contest-2",
            "gp-unit-2",
            2,
            1,
            1,
            vec![SelectionDescription::new("sel-C", 1, "candidate-A")],
        );
        InternalManifest::new(
            ElementModQ::from_u64(1),
            vec![
                ContestDescriptionWithPlaceholders::without_placeholders(city_contest),
                ContestDescriptionWithPlaceholders::without_placeholders(county_contest),
            ],
            vec![
                BallotStyle::new("ballot-style-1", vec!["gp-unit-1".into()]),
                BallotStyle::new(
                    "ballot-style-2",
                    vec!["gp-unit-1".into(), "gp-unit-2".into()],
                ),
            ],
            vec![
                Candidate::new("candidate-A", false),
                Candidate::new("candidate-B", true),
            ],
        )
    }

    fn context() -> CiphertextElectionContext {
        let pair = ElGamalKeyPair::from_secret(&ElementModQ::from_u64(2)).unwrap();
        CiphertextElectionContext::make(
            1,
            1,
            pair.public_key().clone(),
            ElementModQ::from_u64(2),
            ElementModQ::from_u64(1),
        )
    }

    fn one_vote_ballot() -> PlaintextBallot {
        PlaintextBallot::new(
            "ballot-1",
            "ballot-style-1",
            vec![PlaintextBallotContest::new(
                "contest-1",
                vec![PlaintextBallotSelection::new("sel-A", 1)],
            )],
        )
    }

    fn seed() -> ElementModQ {
        ElementModQ::from_u64(7)
    }

    #[test]
    fn rejects_unknown_ballot_style() {
        let ballot = PlaintextBallot::new("ballot-1", "no-such-style", vec![]);
        let err = encrypt_ballot(
            &ballot,
            &manifest(),
            &context(),
            &seed(),
            None,
            0,
            false,
            false,
            true,
        )
        .unwrap_err();
        assert_eq!(err, EgError::BallotStyleNotFound("no-such-style".into()));
    }

    #[test]
    fn rejects_nonce_with_precompute() {
        let err = encrypt_ballot(
            &one_vote_ballot(),
            &manifest(),
            &context(),
            &seed(),
            Some(ElementModQ::from_u64(42)),
            0,
            false,
            true,
            true,
        )
        .unwrap_err();
        assert_eq!(err, EgError::NonceWithPrecompute);
    }

    // Scenario: a ballot with one affirmative selection under a fixed root
    // nonce must produce byte-identical ciphertexts across invocations.
    #[test_log::test]
    fn deterministic_ballot_encryption() {
        let manifest = manifest();
        let context = context();
        let nonce = ElementModQ::from_u64(42);

        let first = encrypt_ballot(
            &one_vote_ballot(),
            &manifest,
            &context,
            &seed(),
            Some(nonce.clone()),
            1234,
            false,
            false,
            true,
        )
        .unwrap();
        let second = encrypt_ballot(
            &one_vote_ballot(),
            &manifest,
            &context,
            &seed(),
            Some(nonce),
            1234,
            false,
            false,
            true,
        )
        .unwrap();

        assert_eq!(first.crypto_hash, second.crypto_hash);
        assert_eq!(first.ballot_code, second.ballot_code);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test_log::test]
    fn encrypted_ballot_verifies_end_to_end() {
        let manifest = manifest();
        let context = context();
        let encrypted = encrypt_ballot(
            &one_vote_ballot(),
            &manifest,
            &context,
            &seed(),
            None,
            0,
            true,
            false,
            true,
        )
        .unwrap();

        assert_eq!(encrypted.contests.len(), 1);
        let contest = &encrypted.contests[0];
        // The omitted selection was emplaced as an explicit false.
        assert_eq!(contest.selections.len(), 2);
        assert_eq!(contest.ciphertext_accumulation.pad.to_hex().len(), 1024);
        assert_eq!(encrypted.ballot_code, encrypted.crypto_hash);

        // The accumulation decrypts to the single affirmative vote.
        let nonce = CiphertextBallotContest::aggregate_nonce(&contest.selections).unwrap();
        let k = context.elgamal_public_key();
        assert_eq!(
            contest
                .ciphertext_accumulation
                .decrypt_with_nonce(k, &nonce)
                .unwrap(),
            1
        );
    }

    // Scenario: two affirmative votes in a one-winner contest with
    // overvotes allowed normalize to all-zero selections, and the overvote
    // is recorded in the contest's extended data.
    #[test_log::test]
    fn overvote_normalizes_and_records() {
        let manifest = manifest();
        let context = context();
        let ballot = PlaintextBallot::new(
            "ballot-1",
            "ballot-style-1",
            vec![PlaintextBallotContest::new(
                "contest-1",
                vec![
                    PlaintextBallotSelection::new("sel-A", 1),
                    PlaintextBallotSelection::new("sel-B", 1),
                ],
            )],
        );
        let root = ElementModQ::from_u64(99);

        let encrypted = encrypt_ballot(
            &ballot,
            &manifest,
            &context,
            &seed(),
            Some(root.clone()),
            0,
            false,
            false,
            true,
        )
        .unwrap();

        // Every selection decrypts to zero under its own nonce.
        let contest = &encrypted.contests[0];
        let k = context.elgamal_public_key();
        for selection in &contest.selections {
            let nonce = selection.nonce.as_ref().unwrap();
            assert_eq!(selection.ciphertext.decrypt_with_nonce(k, nonce).unwrap(), 0);
        }
        // The range proof witnesses zero selections.
        assert!(contest.proof.is_valid(
            &contest.ciphertext_accumulation,
            k,
            context.crypto_extended_base_hash(),
            HashPrefix::CONTEST_PROOF,
        ));

        // The extended data names the offending selections.
        let pair = ElGamalKeyPair::from_secret(&ElementModQ::from_u64(2)).unwrap();
        let plaintext = contest
            .extended_data
            .decrypt(
                context.elgamal_public_key(),
                pair.secret_key(),
                HashPrefix::CONTEST_DATA_SECRET,
                context.crypto_extended_base_hash(),
                true,
            )
            .unwrap();
        let text = String::from_utf8(plaintext).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["error"], "overvote");
        assert_eq!(value["error_data"][0], "sel-A");
        assert_eq!(value["error_data"][1], "sel-B");
    }

    #[test]
    fn overvote_fails_when_disallowed() {
        let manifest = manifest();
        let context = context();
        let ballot = PlaintextBallot::new(
            "ballot-1",
            "ballot-style-1",
            vec![PlaintextBallotContest::new(
                "contest-1",
                vec![
                    PlaintextBallotSelection::new("sel-A", 1),
                    PlaintextBallotSelection::new("sel-B", 1),
                ],
            )],
        );
        let err = encrypt_ballot(
            &ballot,
            &manifest,
            &context,
            &seed(),
            None,
            0,
            false,
            false,
            false,
        )
        .unwrap_err();
        assert_eq!(err, EgError::ContestOvervote("contest-1".into()));
    }

    // Scenario: casting erases every nonce in the tree and makes any second
    // terminal transition fail.
    #[test_log::test]
    fn cast_erases_nonces_and_pins_state() {
        let manifest = manifest();
        let context = context();
        let mut encrypted = encrypt_ballot(
            &one_vote_ballot(),
            &manifest,
            &context,
            &seed(),
            Some(ElementModQ::from_u64(42)),
            0,
            false,
            false,
            true,
        )
        .unwrap();

        assert!(encrypted.nonce.is_some());
        encrypted.cast().unwrap();
        assert_eq!(encrypted.state, BallotBoxState::Cast);
        assert!(encrypted.nonce.is_none());
        for contest in &encrypted.contests {
            assert!(contest.nonce.is_none());
            for selection in &contest.selections {
                assert!(selection.nonce.is_none());
            }
        }

        assert!(matches!(
            encrypted.spoil(),
            Err(EgError::IllegalBallotStateTransition(_))
        ));
        assert!(matches!(
            encrypted.challenge(),
            Err(EgError::IllegalBallotStateTransition(_))
        ));

        // A terminal ballot submits as-is; a non-terminal target state is
        // rejected.
        assert!(matches!(
            crate::ballot::SubmittedBallot::from_ballot(
                encrypted.clone(),
                BallotBoxState::Unknown
            ),
            Err(EgError::IllegalBallotStateTransition(_))
        ));
        let submitted =
            crate::ballot::SubmittedBallot::from_ballot(encrypted, BallotBoxState::Cast).unwrap();
        assert_eq!(submitted.ballot().state, BallotBoxState::Cast);
        assert!(submitted.ballot().nonce.is_none());
    }

    #[test]
    fn write_ins_ride_in_extended_data() {
        let manifest = manifest();
        let context = context();
        let ballot = PlaintextBallot::new(
            "ballot-1",
            "ballot-style-1",
            vec![PlaintextBallotContest::new(
                "contest-1",
                vec![PlaintextBallotSelection::with_write_in(
                    "sel-B", 1, "Jane Roe",
                )],
            )],
        );

        let encrypted = encrypt_ballot(
            &ballot,
            &manifest,
            &context,
            &seed(),
            Some(ElementModQ::from_u64(404)),
            0,
            false,
            false,
            true,
        )
        .unwrap();

        let pair = ElGamalKeyPair::from_secret(&ElementModQ::from_u64(2)).unwrap();
        let plaintext = encrypted.contests[0]
            .extended_data
            .decrypt(
                context.elgamal_public_key(),
                pair.secret_key(),
                HashPrefix::CONTEST_DATA_SECRET,
                context.crypto_extended_base_hash(),
                true,
            )
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&String::from_utf8(plaintext).unwrap()).unwrap();
        assert_eq!(value["write_ins"]["sel-B"], "Jane Roe");
    }

    #[test_log::test]
    fn compact_ballot_expands_to_the_same_ciphertext() {
        let manifest = manifest();
        let context = context();
        let compact = encrypt_compact_ballot(
            &one_vote_ballot(),
            &manifest,
            &context,
            &seed(),
            Some(ElementModQ::from_u64(314)),
            777,
            false,
        )
        .unwrap();
        // The normalized plaintext carries the emplaced false selection.
        assert_eq!(compact.plaintext.contests[0].selections.len(), 2);

        let expanded = compact.expand(&manifest, &context).unwrap();
        assert_eq!(expanded.ballot_code, compact.ballot_code);
        assert_eq!(expanded.timestamp, compact.timestamp);
    }

    // A style-1 ballot must encrypt only its own district's contests; a
    // style-2 ballot picks up the county contest as an emplaced all-false
    // contest even though the voter never mentioned it.
    #[test_log::test]
    fn style_selects_its_district_contests() {
        let manifest = manifest();
        let context = context();

        let narrow = encrypt_ballot(
            &one_vote_ballot(),
            &manifest,
            &context,
            &seed(),
            Some(ElementModQ::from_u64(11)),
            0,
            false,
            false,
            true,
        )
        .unwrap();
        let narrow_ids: Vec<&str> = narrow
            .contests
            .iter()
            .map(|c| c.object_id.as_str())
            .collect();
        assert_eq!(narrow_ids, vec!["contest-1"]);

        let wide_ballot = PlaintextBallot::new(
            "ballot-2",
            "ballot-style-2",
            vec![PlaintextBallotContest::new(
                "contest-1",
                vec![PlaintextBallotSelection::new("sel-A", 1)],
            )],
        );
        let wide = encrypt_ballot(
            &wide_ballot,
            &manifest,
            &context,
            &seed(),
            Some(ElementModQ::from_u64(12)),
            0,
            false,
            false,
            true,
        )
        .unwrap();
        let wide_ids: Vec<&str> = wide
            .contests
            .iter()
            .map(|c| c.object_id.as_str())
            .collect();
        assert_eq!(wide_ids, vec!["contest-1", "contest-2"]);

        // The emplaced county contest decrypts to no votes at all.
        let k = context.elgamal_public_key();
        let county = &wide.contests[1];
        let nonce = CiphertextBallotContest::aggregate_nonce(&county.selections).unwrap();
        assert_eq!(
            county
                .ciphertext_accumulation
                .decrypt_with_nonce(k, &nonce)
                .unwrap(),
            0
        );
    }

    #[test]
    fn mediator_enforces_the_ballot_limit() {
        let manifest = manifest();
        let pair = ElGamalKeyPair::from_secret(&ElementModQ::from_u64(2)).unwrap();
        let context = CiphertextElectionContext::make_with(
            1,
            1,
            pair.public_key().clone(),
            ElementModQ::from_u64(2),
            ElementModQ::from_u64(1),
            crate::election::ContextConfiguration {
                allow_overvotes: true,
                max_number_of_ballots: 0,
            },
            Default::default(),
        );
        let device = EncryptionDevice::new(1, 2, 3, "precinct-9");
        let mut mediator = EncryptionMediator::new(&manifest, &context, &device).unwrap();
        assert_eq!(mediator.ballots_encrypted(), 0);
        assert_eq!(
            mediator.encrypt(&one_vote_ballot(), false, false).unwrap_err(),
            EgError::BallotLimitExceeded(0)
        );
    }

    #[test]
    fn mediator_chains_ballot_codes() {
        let manifest = manifest();
        let context = context();
        let device = EncryptionDevice::new(1, 2, 3, "precinct-9");
        let mut mediator = EncryptionMediator::new(&manifest, &context, &device).unwrap();

        let first = mediator.encrypt(&one_vote_ballot(), false, false).unwrap();
        assert_eq!(first.ballot_code_seed, device.hash());

        let second = mediator.encrypt(&one_vote_ballot(), false, false).unwrap();
        assert_eq!(second.ballot_code_seed, first.ballot_code);
        assert_ne!(first.ballot_code, second.ballot_code);
    }

    #[test]
    fn mediator_rejects_mismatched_hashes() {
        let manifest = manifest();
        let pair = ElGamalKeyPair::from_secret(&ElementModQ::from_u64(2)).unwrap();
        let context = CiphertextElectionContext::make(
            1,
            1,
            pair.public_key().clone(),
            ElementModQ::from_u64(2),
            ElementModQ::from_u64(999),
        );
        let device = EncryptionDevice::new(1, 2, 3, "precinct-9");
        assert!(matches!(
            EncryptionMediator::new(&manifest, &context, &device),
            Err(EgError::ManifestContextHashMismatch { .. })
        ));
    }
}

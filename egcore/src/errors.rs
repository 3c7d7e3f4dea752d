// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

pub use util::bignum::BignumError;
pub use util::csprng::CsprngError;

/// The main [`std::error::Error`] type returned by functions of this crate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EgError {
    //--- Invalid argument
    #[error("selection plaintext must be 0 or 1, got {0}")]
    PlaintextOutOfRange(u64),

    #[error("range proof witness {witnessed} exceeds the range limit {limit}")]
    RangeProofOutOfRange { witnessed: u64, limit: u64 },

    #[error("ballot style `{0}` is not defined by the manifest")]
    BallotStyleNotFound(String),

    #[error("contest `{0}` is not defined by the manifest")]
    ContestNotFound(String),

    #[error("cannot use precomputed values together with a caller-supplied nonce")]
    NonceWithPrecompute,

    #[error("manifest hash {manifest} does not match context hash {context}")]
    ManifestContextHashMismatch { manifest: String, context: String },

    #[error("malformed plaintext selection `{0}`")]
    InvalidPlaintextSelection(String),

    #[error("plaintext contest `{0}` is invalid")]
    InvalidPlaintextContest(String),

    #[error("contest `{0}` exceeds its selection limit")]
    ContestOvervote(String),

    #[error("secret key must be in [2, Q)")]
    SecretKeyOutOfRange,

    #[error("encryption requires a non-zero nonce")]
    ZeroNonce,

    #[error("ballot must have at least one contest")]
    BallotHasNoContests,

    #[error("device reached its configured limit of {0} ballots")]
    BallotLimitExceeded(u64),

    #[error("contest must have at least one selection")]
    ContestHasNoSelections,

    #[error("hashed elgamal max_len {0} is invalid")]
    HashedElGamalInvalidMaxLen(usize),

    #[error("hashed elgamal message of {len} bytes exceeds max_len {max_len}")]
    HashedElGamalMessageTooLong { len: usize, max_len: usize },

    #[error("hashed elgamal ciphertext length {0} is not a positive multiple of 32")]
    HashedElGamalBadCiphertextLength(usize),

    //--- Out of range
    #[error("value is not below the {0} modulus")]
    ElementOutOfRange(&'static str),

    #[error("byte input of wrong length: expected {expected}, got {actual}")]
    ByteLengthMismatch { expected: usize, actual: usize },

    #[error("hex input is not canonical: {0}")]
    MalformedHex(String),

    //--- Arithmetic failure
    #[error("bignum primitive failed: {0}")]
    Bignum(#[from] BignumError),

    //--- Cryptographic failure
    #[error("constructed proof for `{0}` failed its validity check")]
    ProofConstructionFailed(String),

    #[error("hashed elgamal mac does not match")]
    HashedElGamalMacMismatch,

    #[error("hashed elgamal padding is incorrect")]
    HashedElGamalBadPadding,

    #[error("discrete log result exceeds the search bound {0}")]
    DlogExceedsSearchBound(u64),

    #[error("encrypted {0} failed its validity check")]
    BallotFailsValidityCheck(String),

    //--- Exhaustion
    #[error("entropy source failure: {0}")]
    Csprng(#[from] CsprngError),

    //--- Illegal state transition
    #[error("ballot state is already terminal ({0})")]
    IllegalBallotStateTransition(String),
}

/// [`Result`](std::result::Result) type with an [`EgError`].
pub type EgResult<T> = Result<T, EgError>;

/// Outcome of a validity check: a verdict plus the names of every failed
/// sub-predicate, for diagnostics. Checks log and report; they do not raise.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub failed: Vec<&'static str>,
}

impl ValidationResult {
    pub fn from_checks(checks: &[(&'static str, bool)]) -> Self {
        let failed: Vec<&'static str> = checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect();
        Self {
            is_valid: failed.is_empty(),
            failed,
        }
    }
}

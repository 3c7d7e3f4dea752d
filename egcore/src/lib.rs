// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Cryptographic core of an end-to-end verifiable election encryption
//! library: exponential ElGamal over a 4096-bit prime group, Chaum-Pedersen
//! NIZK proofs bound by a SHA-256 Fiat-Shamir oracle, deterministic ballot
//! nonce derivation, and a precompute buffer that moves the modular
//! exponentiations off the voting-time path.

pub mod ballot;
pub mod chaum_pedersen;
pub mod constants;
pub mod discrete_log;
pub mod election;
pub mod elgamal;
pub mod encrypt;
pub mod errors;
pub mod group;
pub mod hash;
pub mod kdf;
pub mod lookup_table;
pub mod manifest;
pub mod nonces;
pub mod precompute;

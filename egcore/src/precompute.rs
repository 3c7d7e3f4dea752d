// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Offline generation of the exponentiations that dominate encryption cost.
//!
//! A producer fills two bounded FIFO queues against a specific public key:
//! triples `(r, g^r, K^r)` for encryptions, and selection bundles (two
//! triples plus the fake-branch commitments) that absorb the full cost of
//! one selection encryption and its disjunctive proof. Consumers drain the
//! queues from the voting-time path and fall back to real-time generation
//! when empty.
//!
//! Queue order is not observable by verifiers; any permutation of
//! consumption yields equally valid ballots.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::errors::EgResult;
use crate::group::{ElementModP, ElementModQ, add_mod_q, g_pow_p, pow_mod_p, rand_q, sub_mod_q};

/// Default number of selection bundles to keep on hand.
pub const DEFAULT_PRECOMPUTE_SIZE: u32 = 5000;

/// A precomputed encryption triple `(r, g^r, K^r)`.
#[derive(Clone, Debug)]
pub struct PrecomputedEncryption {
    secret: ElementModQ,
    pad: ElementModP,
    blinding_factor: ElementModP,
}

impl PrecomputedEncryption {
    /// Generates a fresh triple against the given public key.
    pub fn generate(public_key: &ElementModP) -> EgResult<Self> {
        let secret = rand_q()?;
        let pad = g_pow_p(&secret);
        let blinding_factor = pow_mod_p(public_key, &secret);
        Ok(Self {
            secret,
            pad,
            blinding_factor,
        })
    }

    /// The random exponent `r`.
    pub fn secret(&self) -> &ElementModQ {
        &self.secret
    }

    /// `g^r mod p`.
    pub fn pad(&self) -> &ElementModP {
        &self.pad
    }

    /// `K^r mod p`.
    pub fn blinding_factor(&self) -> &ElementModP {
        &self.blinding_factor
    }
}

impl Drop for PrecomputedEncryption {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Precomputed commitments for the fake branch of a disjunctive proof.
///
/// Both fake data values are carried so the bundle can serve either
/// plaintext: `K^(u-w)` commits the fake one-branch of a zero encryption and
/// `K^(u+w)` the fake zero-branch of a one encryption.
#[derive(Clone, Debug)]
pub struct PrecomputedFakeDisjunctiveCommitments {
    secret1: ElementModQ,
    secret2: ElementModQ,
    pad: ElementModP,
    data_zero: ElementModP,
    data_one: ElementModP,
}

impl PrecomputedFakeDisjunctiveCommitments {
    pub fn generate(public_key: &ElementModP) -> EgResult<Self> {
        let secret1 = rand_q()?;
        let secret2 = rand_q()?;
        let pad = g_pow_p(&secret1);
        let data_zero = pow_mod_p(public_key, &sub_mod_q(&secret1, &secret2));
        let data_one = pow_mod_p(public_key, &add_mod_q(&secret1, &secret2));
        Ok(Self {
            secret1,
            secret2,
            pad,
            data_zero,
            data_one,
        })
    }

    /// The commitment exponent `u`.
    pub fn secret1(&self) -> &ElementModQ {
        &self.secret1
    }

    /// The fake challenge `w`.
    pub fn secret2(&self) -> &ElementModQ {
        &self.secret2
    }

    /// `g^u mod p`.
    pub fn pad(&self) -> &ElementModP {
        &self.pad
    }

    /// `K^(u-w) mod p`.
    pub fn data_zero(&self) -> &ElementModP {
        &self.data_zero
    }

    /// `K^(u+w) mod p`.
    pub fn data_one(&self) -> &ElementModP {
        &self.data_one
    }
}

impl Drop for PrecomputedFakeDisjunctiveCommitments {
    fn drop(&mut self) {
        self.secret1.zeroize();
        self.secret2.zeroize();
    }
}

/// Everything a selection encryption needs: the encryption triple, the real
/// proof commitment, and the fake branch.
#[derive(Clone, Debug)]
pub struct PrecomputedSelection {
    partial_encryption: PrecomputedEncryption,
    real_commitment: PrecomputedEncryption,
    fake_commitment: PrecomputedFakeDisjunctiveCommitments,
}

impl PrecomputedSelection {
    pub fn generate(public_key: &ElementModP) -> EgResult<Self> {
        Ok(Self {
            partial_encryption: PrecomputedEncryption::generate(public_key)?,
            real_commitment: PrecomputedEncryption::generate(public_key)?,
            fake_commitment: PrecomputedFakeDisjunctiveCommitments::generate(public_key)?,
        })
    }

    pub fn partial_encryption(&self) -> &PrecomputedEncryption {
        &self.partial_encryption
    }

    pub fn real_commitment(&self) -> &PrecomputedEncryption {
        &self.real_commitment
    }

    pub fn fake_commitment(&self) -> &PrecomputedFakeDisjunctiveCommitments {
        &self.fake_commitment
    }
}

/// A buffer of precomputed values bound to one public key.
///
/// Thread safe: the two queues have independent locks, and the producer may
/// run concurrently with any number of consumers.
pub struct PrecomputeBuffer {
    public_key: ElementModP,
    max_queue_size: u32,
    is_running: AtomicBool,
    triple_queue: Mutex<VecDeque<PrecomputedEncryption>>,
    selection_queue: Mutex<VecDeque<PrecomputedSelection>>,
}

impl PrecomputeBuffer {
    pub fn new(public_key: ElementModP, max_queue_size: u32) -> Self {
        let max_queue_size = if max_queue_size == 0 {
            DEFAULT_PRECOMPUTE_SIZE
        } else {
            max_queue_size
        };
        Self {
            public_key,
            max_queue_size,
            is_running: AtomicBool::new(false),
            triple_queue: Mutex::new(VecDeque::new()),
            selection_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Fills the queues synchronously up to the configured size. Every third
    /// iteration also produces two extra triples, which hashed ElGamal and
    /// contest-level proofs consume.
    pub fn start(&self) -> EgResult<()> {
        self.is_running.store(true, Ordering::Release);
        debug!(max = self.max_queue_size, "precompute: populating");
        let mut iteration = 0u32;
        while self.is_running.load(Ordering::Acquire) && self.current_queue_size() < self.max_queue_size
        {
            let selection = PrecomputedSelection::generate(&self.public_key)?;
            if let Ok(mut queue) = self.selection_queue.lock() {
                queue.push_back(selection);
            }

            iteration += 1;
            if iteration % 3 == 0 {
                let t1 = PrecomputedEncryption::generate(&self.public_key)?;
                let t2 = PrecomputedEncryption::generate(&self.public_key)?;
                if let Ok(mut queue) = self.triple_queue.lock() {
                    queue.push_back(t1);
                    queue.push_back(t2);
                }
            }
        }
        self.is_running.store(false, Ordering::Release);
        debug!("precompute: populated");
        Ok(())
    }

    /// Signals the producer to halt at the next loop iteration. In-flight
    /// generation completes.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    /// Empties both queues.
    pub fn clear(&self) {
        let triples = self.triple_queue.lock();
        let selections = self.selection_queue.lock();
        if let Ok(mut queue) = triples {
            queue.clear();
        }
        if let Ok(mut queue) = selections {
            queue.clear();
        }
    }

    pub fn public_key(&self) -> &ElementModP {
        &self.public_key
    }

    pub fn max_queue_size(&self) -> u32 {
        self.max_queue_size
    }

    /// Number of selection bundles currently queued.
    pub fn current_queue_size(&self) -> u32 {
        self.selection_queue
            .lock()
            .map(|q| q.len() as u32)
            .unwrap_or(0)
    }

    /// FIFO pop; `None` when drained.
    pub fn pop_triple(&self) -> Option<PrecomputedEncryption> {
        self.triple_queue.lock().ok()?.pop_front()
    }

    /// Like [`Self::pop_triple`] but falls back to synchronous generation.
    pub fn get_triple(&self) -> EgResult<PrecomputedEncryption> {
        if let Some(triple) = self.pop_triple() {
            return Ok(triple);
        }
        debug!("precompute: triple queue drained, generating in real time");
        PrecomputedEncryption::generate(&self.public_key)
    }

    /// FIFO pop; `None` when drained.
    pub fn pop_selection(&self) -> Option<PrecomputedSelection> {
        self.selection_queue.lock().ok()?.pop_front()
    }

    /// Like [`Self::pop_selection`] but falls back to synchronous generation.
    pub fn get_selection(&self) -> EgResult<PrecomputedSelection> {
        if let Some(selection) = self.pop_selection() {
            return Ok(selection);
        }
        debug!("precompute: selection queue drained, generating in real time");
        PrecomputedSelection::generate(&self.public_key)
    }
}

static INSTANCE: LazyLock<Mutex<Option<Arc<PrecomputeBuffer>>>> =
    LazyLock::new(|| Mutex::new(None));

/// Process-wide singleton facade over one [`PrecomputeBuffer`].
///
/// Rebinding to a different public key stops the previous producer and
/// drains both queues before any value for the new key becomes observable.
pub struct PrecomputeBufferContext;

impl PrecomputeBufferContext {
    fn instance() -> Option<Arc<PrecomputeBuffer>> {
        INSTANCE.lock().ok()?.as_ref().map(Arc::clone)
    }

    /// Resets the queues and records the bound public key.
    pub fn initialize(public_key: &ElementModP, max_queue_size: u32) {
        let Ok(mut slot) = INSTANCE.lock() else {
            return;
        };
        if let Some(previous) = slot.take() {
            previous.stop();
            previous.clear();
        }
        info!("precompute: context initialized");
        *slot = Some(Arc::new(PrecomputeBuffer::new(
            public_key.clone(),
            max_queue_size,
        )));
    }

    /// Synchronously fills the queues of the bound buffer.
    pub fn start() -> EgResult<()> {
        match Self::instance() {
            Some(buffer) => buffer.start(),
            None => Ok(()),
        }
    }

    /// Rebinds to the given key and fills synchronously.
    pub fn start_with(public_key: &ElementModP) -> EgResult<()> {
        Self::initialize(public_key, 0);
        Self::start()
    }

    /// Rebinds to the given key and schedules the fill on a background
    /// thread. Returns immediately.
    pub fn start_async(public_key: &ElementModP, max_queue_size: u32) {
        Self::initialize(public_key, max_queue_size);
        if let Some(buffer) = Self::instance() {
            std::thread::spawn(move || {
                if let Err(e) = buffer.start() {
                    warn!(error = %e, "precompute: background producer stopped");
                }
            });
        }
    }

    /// Signals the producer to halt at the next safe point.
    pub fn stop() {
        if let Some(buffer) = Self::instance() {
            buffer.stop();
        }
    }

    /// Empties both queues.
    pub fn clear() {
        if let Some(buffer) = Self::instance() {
            buffer.clear();
        }
    }

    /// The public key the context is bound to, if initialized.
    pub fn public_key() -> Option<ElementModP> {
        Self::instance().map(|b| b.public_key().clone())
    }

    pub fn max_queue_size() -> u32 {
        Self::instance().map(|b| b.max_queue_size()).unwrap_or(0)
    }

    pub fn current_queue_size() -> u32 {
        Self::instance().map(|b| b.current_queue_size()).unwrap_or(0)
    }

    pub fn pop_triple() -> Option<PrecomputedEncryption> {
        Self::instance()?.pop_triple()
    }

    pub fn pop_selection() -> Option<PrecomputedSelection> {
        Self::instance()?.pop_selection()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::group::mul_mod_p;

    fn test_key() -> ElementModP {
        let mut k = g_pow_p(&ElementModQ::from_u64(2));
        k.set_is_fixed_base(true);
        k
    }

    #[test]
    fn triple_satisfies_its_equations() {
        let k = test_key();
        let triple = PrecomputedEncryption::generate(&k).unwrap();
        assert_eq!(*triple.pad(), g_pow_p(triple.secret()));
        assert_eq!(*triple.blinding_factor(), pow_mod_p(&k, triple.secret()));
    }

    #[test]
    fn fake_commitments_split_by_branch() {
        let k = test_key();
        let quad = PrecomputedFakeDisjunctiveCommitments::generate(&k).unwrap();
        assert_eq!(*quad.pad(), g_pow_p(quad.secret1()));
        // data_zero * K^(2w) == data_one
        let two_w = add_mod_q(quad.secret2(), quad.secret2());
        assert_eq!(
            mul_mod_p(quad.data_zero(), &pow_mod_p(&k, &two_w)),
            *quad.data_one()
        );
    }

    #[test]
    fn buffer_fills_and_drains_fifo() {
        let buffer = PrecomputeBuffer::new(test_key(), 3);
        buffer.start().unwrap();
        assert_eq!(buffer.current_queue_size(), 3);
        // Three iterations produce one extra pair of triples.
        let mut triples = 0;
        while buffer.pop_triple().is_some() {
            triples += 1;
        }
        assert_eq!(triples, 2);

        assert!(buffer.pop_selection().is_some());
        assert!(buffer.pop_selection().is_some());
        assert!(buffer.pop_selection().is_some());
        assert!(buffer.pop_selection().is_none());

        // get_* falls back to real-time generation once drained.
        assert!(buffer.get_triple().is_ok());
        assert!(buffer.get_selection().is_ok());
    }

    // The context is process-wide state, so its whole lifecycle lives in one
    // test to keep parallel test threads off each other's keys.
    #[test]
    fn context_lifecycle_and_rebind_drains() {
        let k1 = test_key();
        PrecomputeBufferContext::initialize(&k1, 2);
        PrecomputeBufferContext::start().unwrap();
        assert_eq!(PrecomputeBufferContext::current_queue_size(), 2);
        assert_eq!(PrecomputeBufferContext::public_key().unwrap(), k1);

        let popped = PrecomputeBufferContext::pop_selection().unwrap();
        assert_eq!(
            *popped.partial_encryption().pad(),
            g_pow_p(popped.partial_encryption().secret())
        );

        // Rebinding to a different key drains both queues before any value
        // for the new key is observable.
        let k2 = g_pow_p(&ElementModQ::from_u64(3));
        PrecomputeBufferContext::initialize(&k2, 2);
        assert_eq!(PrecomputeBufferContext::current_queue_size(), 0);
        assert!(PrecomputeBufferContext::pop_selection().is_none());
        assert!(PrecomputeBufferContext::pop_triple().is_none());
        assert_eq!(PrecomputeBufferContext::public_key().unwrap(), k2);

        PrecomputeBufferContext::stop();
        PrecomputeBufferContext::clear();
    }
}

// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Deterministic nonce sequences.
//!
//! A [`Nonces`] is a restartable lazy sequence of exponents derived from a
//! seed and an optional header: `get(i) = H(seed, header?, i)`. The sequence
//! is what makes a whole encrypted ballot reproducible from one root nonce.

use zeroize::Zeroize;

use crate::group::{ElementModP, ElementModQ};
use crate::hash::{HashInput, hash_elems};

enum NonceHeader {
    Str(String),
    Q(ElementModQ),
    P(ElementModP),
}

/// A restartable sequence of [`ElementModQ`] nonces.
pub struct Nonces {
    seed: ElementModQ,
    header: Option<NonceHeader>,
    counter: u64,
}

impl Nonces {
    pub fn new(seed: &ElementModQ) -> Self {
        Self {
            seed: seed.clone(),
            header: None,
            counter: 0,
        }
    }

    pub fn with_header(seed: &ElementModQ, header: &str) -> Self {
        Self {
            seed: seed.clone(),
            header: Some(NonceHeader::Str(header.to_string())),
            counter: 0,
        }
    }

    pub fn with_q_header(seed: &ElementModQ, header: &ElementModQ) -> Self {
        Self {
            seed: seed.clone(),
            header: Some(NonceHeader::Q(header.clone())),
            counter: 0,
        }
    }

    pub fn with_p_header(seed: &ElementModQ, header: &ElementModP) -> Self {
        Self {
            seed: seed.clone(),
            header: Some(NonceHeader::P(header.clone())),
            counter: 0,
        }
    }

    /// The `i`-th nonce of the sequence.
    pub fn get(&self, i: u64) -> ElementModQ {
        self.item(i, None)
    }

    /// The `i`-th nonce, further separated by an extra header.
    pub fn get_with_header(&self, i: u64, extra_header: &str) -> ElementModQ {
        self.item(i, Some(extra_header))
    }

    /// A contiguous run of the sequence starting at `start`.
    pub fn get_items(&self, start: u64, count: u64) -> Vec<ElementModQ> {
        (start..start + count).map(|i| self.get(i)).collect()
    }

    /// Advances the internal counter and returns the next nonce.
    pub fn next_nonce(&mut self) -> ElementModQ {
        let value = self.get(self.counter);
        self.counter += 1;
        value
    }

    fn item(&self, i: u64, extra_header: Option<&str>) -> ElementModQ {
        let mut items: Vec<HashInput> = Vec::with_capacity(4);
        items.push((&self.seed).into());
        match &self.header {
            Some(NonceHeader::Str(s)) => items.push(s.into()),
            Some(NonceHeader::Q(q)) => items.push(q.into()),
            Some(NonceHeader::P(p)) => items.push(p.into()),
            None => {}
        }
        items.push(i.into());
        if let Some(extra) = extra_header {
            items.push(extra.into());
        }
        hash_elems(&items)
    }
}

impl Drop for Nonces {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Process-wide exponent acceleration for fixed-base elements.
//!
//! For each base flagged fixed (`g`, the election public key `K`), the table
//! caches the Montgomery-form square chain `base^(2^i) mod P` for every bit
//! position of a 256-bit exponent. An exponentiation then costs one
//! Montgomery multiply per set exponent bit instead of a full
//! square-and-multiply ladder. Tables are built lazily on first use, keyed
//! by the base's canonical hex, and grow monotonically behind an `RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use crate::constants::CONTEXT_P;
use crate::group::{ElementModP, ElementModQ, MAX_P_LEN, MAX_Q_SIZE};

const EXPONENT_BITS: usize = MAX_Q_SIZE * 8;

struct FixedBaseTable {
    /// `base^(2^i)` in Montgomery form, for `i` in `[0, EXPONENT_BITS)`.
    squares: Vec<Vec<u64>>,
}

impl FixedBaseTable {
    fn build(base: &ElementModP) -> Self {
        let reduced = CONTEXT_P.reduce(base.limbs());
        let mut squares = Vec::with_capacity(EXPONENT_BITS);
        let mut current = CONTEXT_P.to_mont(&reduced);
        for _ in 0..EXPONENT_BITS {
            let next = CONTEXT_P.mont_mul(&current, &current);
            squares.push(current);
            current = next;
        }
        Self { squares }
    }

    fn pow(&self, exponent: &ElementModQ) -> ElementModP {
        let mut acc = CONTEXT_P.mont_one();
        for i in 0..EXPONENT_BITS {
            if util::limb::bit(exponent.limbs(), i) {
                acc = CONTEXT_P.mont_mul(&acc, &self.squares[i]);
            }
        }
        let mut out = [0u64; MAX_P_LEN];
        out.copy_from_slice(&CONTEXT_P.from_mont(&acc));
        ElementModP::new_unchecked(out)
    }
}

static TABLES: LazyLock<RwLock<HashMap<String, Arc<FixedBaseTable>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn table_for(base: &ElementModP) -> Arc<FixedBaseTable> {
    let key = base.to_hex();
    if let Ok(tables) = TABLES.read() {
        if let Some(table) = tables.get(&key) {
            return Arc::clone(table);
        }
    }

    // Built outside the lock; a racing builder just produces the same table.
    let built = Arc::new(FixedBaseTable::build(base));
    match TABLES.write() {
        Ok(mut tables) => Arc::clone(tables.entry(key).or_insert(built)),
        Err(_) => built,
    }
}

/// `base^exponent mod P` through the per-base table. Bit-identical to the
/// direct computation.
pub(crate) fn pow_mod_p(base: &ElementModP, exponent: &ElementModQ) -> ElementModP {
    table_for(base).pow(exponent)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::constants::G;
    use crate::group::{self, ElementModQ};

    #[test]
    fn table_matches_direct_computation() {
        for exp in [1u64, 2, 3, 255, 0xFFFF_FFFF] {
            let e = ElementModQ::from_u64(exp);
            let via_table = pow_mod_p(&G, &e);
            let direct = group::pow_mod_p_direct(&G, &e);
            assert_eq!(via_table, direct);
        }
    }

    #[test]
    fn table_is_reused_across_calls() {
        let e = ElementModQ::from_u64(77);
        let first = pow_mod_p(&G, &e);
        let second = pow_mod_p(&G, &e);
        assert_eq!(first, second);
        let key = G.to_hex();
        assert!(TABLES.read().unwrap().contains_key(&key));
    }
}

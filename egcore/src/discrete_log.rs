// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Discrete log recovery for small plaintexts.
//!
//! After homomorphic aggregation a tally decrypts to `base^m` where `m` is
//! at most `ballot_count * max_selections`, small enough for iterated
//! search. Each base keeps a process-wide memo table mapping seen powers to
//! their exponents; the table grows monotonically and is safe under
//! concurrent readers.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use tracing::trace;

use crate::errors::{EgError, EgResult};
use crate::group::{ElementModP, mul_mod_p};

/// Exponents are searched in `[0, bound]`; beyond it the lookup fails.
pub const DEFAULT_SEARCH_BOUND: u64 = 100_000_000;

struct TableState {
    /// Canonical byte form of `base^m` mapped to `m`.
    exponents: HashMap<Vec<u8>, u64>,
    /// `base^max`, the frontier of the table.
    frontier: ElementModP,
    max: u64,
}

impl TableState {
    fn new() -> Self {
        let one = ElementModP::from_u64(1);
        let mut exponents = HashMap::new();
        exponents.insert(one.to_bytes_be(), 0);
        Self {
            exponents,
            frontier: one,
            max: 0,
        }
    }
}

static TABLES: LazyLock<RwLock<HashMap<String, Arc<RwLock<TableState>>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn state_for(base: &ElementModP) -> Arc<RwLock<TableState>> {
    let key = base.to_hex();
    if let Ok(tables) = TABLES.read() {
        if let Some(state) = tables.get(&key) {
            return Arc::clone(state);
        }
    }
    match TABLES.write() {
        Ok(mut tables) => Arc::clone(
            tables
                .entry(key)
                .or_insert_with(|| Arc::new(RwLock::new(TableState::new()))),
        ),
        Err(_) => Arc::new(RwLock::new(TableState::new())),
    }
}

/// Memoized discrete log search.
pub struct DiscreteLog;

impl DiscreteLog {
    /// The smallest nonnegative `m` with `base^m mod P == element`, searched
    /// within [`DEFAULT_SEARCH_BOUND`].
    pub fn find(element: &ElementModP, base: &ElementModP) -> EgResult<u64> {
        Self::find_within(element, base, DEFAULT_SEARCH_BOUND)
    }

    /// The smallest nonnegative `m` with `base^m mod P == element`, searched
    /// within the given bound.
    pub fn find_within(element: &ElementModP, base: &ElementModP, bound: u64) -> EgResult<u64> {
        let state = state_for(base);
        let target = element.to_bytes_be();

        if let Ok(table) = state.read() {
            if let Some(&m) = table.exponents.get(&target) {
                return Ok(m);
            }
            if table.max >= bound {
                return Err(EgError::DlogExceedsSearchBound(bound));
            }
        }

        let Ok(mut table) = state.write() else {
            return Err(EgError::DlogExceedsSearchBound(bound));
        };
        // A racing extender may have found it already.
        if let Some(&m) = table.exponents.get(&target) {
            return Ok(m);
        }
        while table.max < bound {
            let next = mul_mod_p(&table.frontier, base);
            table.max += 1;
            let m = table.max;
            let bytes = next.to_bytes_be();
            table.frontier = next;
            table.exponents.insert(bytes.clone(), m);
            if bytes == target {
                trace!(m, "discrete log found");
                return Ok(m);
            }
        }
        Err(EgError::DlogExceedsSearchBound(bound))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::group::{ElementModQ, g_pow_p, pow_mod_p};

    #[test]
    fn finds_small_exponents() {
        let base = g_pow_p(&ElementModQ::from_u64(3));
        for m in [0u64, 1, 2, 17, 40] {
            let element = pow_mod_p(&base, &ElementModQ::from_u64(m));
            assert_eq!(DiscreteLog::find_within(&element, &base, 1000).unwrap(), m);
        }
    }

    #[test]
    fn memo_table_is_reused() {
        let base = g_pow_p(&ElementModQ::from_u64(5));
        let element = pow_mod_p(&base, &ElementModQ::from_u64(30));
        assert_eq!(DiscreteLog::find_within(&element, &base, 64).unwrap(), 30);
        // Second lookup hits the memo table rather than re-deriving.
        assert_eq!(DiscreteLog::find_within(&element, &base, 64).unwrap(), 30);
    }

    #[test]
    fn rejects_out_of_window_results() {
        let base = g_pow_p(&ElementModQ::from_u64(7));
        let element = pow_mod_p(&base, &ElementModQ::from_u64(50));
        assert_eq!(
            DiscreteLog::find_within(&element, &base, 10).unwrap_err(),
            EgError::DlogExceedsSearchBound(10)
        );
        // Widening the window succeeds and extends the same table.
        assert_eq!(DiscreteLog::find_within(&element, &base, 60).unwrap(), 50);
    }
}

//! Implied odds from pari-mutuel pools.

use crate::types::Amount;

/// Fixed scale for odds: parts per 10_000.
pub const ODDS_SCALE: u64 = 10_000;

/// Per-outcome share of the total pool, scaled by [`ODDS_SCALE`].
///
/// Each entry is floored, so the vector sums to at most `ODDS_SCALE` and at
/// least `ODDS_SCALE - (pools.len() - 1)`. With no volume every outcome gets
/// `ODDS_SCALE / pools.len()`.
pub fn implied_odds(pools: &[Amount]) -> Vec<u64> {
    if pools.is_empty() {
        return Vec::new();
    }
    let total: u128 = pools.iter().map(|pool| *pool as u128).sum();
    if total == 0 {
        let uniform = ODDS_SCALE / pools.len() as u64;
        return vec![uniform; pools.len()];
    }
    pools
        .iter()
        // pool <= total, so the quotient is at most ODDS_SCALE
        .map(|pool| (*pool as u128 * ODDS_SCALE as u128 / total) as u64)
        .collect()
}

//! Commutative per-outcome accumulators.
//!
//! Every write is a pure addition, so concurrent writers never need to
//! coordinate: any interleaving of `add` calls yields the same totals.
//!
//! An add happens in two steps. [`PoolAccumulator::reserve`] claims the
//! amount against a separate headroom counter, which is where overflow is
//! detected. [`Reservation::commit`] then credits the outcome's pool, the
//! total volume and the count. Every credit is preceded by a reservation of
//! the same amount, so crediting cannot overflow. Readers of the public
//! counters only ever see committed amounts: a reservation dropped without
//! being committed gives its headroom back and leaves no other trace, which
//! lets multi-leg commits reserve every leg before crediting any of them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    state::Error,
    types::{Amount, Outcome},
};

#[derive(Debug)]
pub struct PoolAccumulator {
    pools: Box<[AtomicU64]>,
    total_volume: AtomicU64,
    count: AtomicU64,
    /// Committed plus pending volume
    reserved_volume: AtomicU64,
    /// Committed plus pending contributions
    reserved_count: AtomicU64,
}

/// Point-in-time copy of an accumulator
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pools: Vec<Amount>,
    pub total_volume: Amount,
    pub count: u64,
}

impl PoolSnapshot {
    pub fn pool(&self, outcome: Outcome) -> Amount {
        self.pools.get(outcome as usize).copied().unwrap_or(0)
    }
}

/// Amount claimed against an accumulator's total but not yet credited to a
/// pool. Released on drop unless committed.
#[must_use = "a reservation is released when dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    accumulator: &'a PoolAccumulator,
    outcome: usize,
    amount: Amount,
    committed: bool,
}

impl Reservation<'_> {
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Credit the reserved amount to its outcome's pool and the totals.
    pub fn commit(mut self) {
        let accumulator = self.accumulator;
        accumulator.pools[self.outcome].fetch_add(self.amount, Ordering::AcqRel);
        accumulator
            .total_volume
            .fetch_add(self.amount, Ordering::AcqRel);
        accumulator.count.fetch_add(1, Ordering::AcqRel);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.accumulator
                .reserved_volume
                .fetch_sub(self.amount, Ordering::AcqRel);
            self.accumulator
                .reserved_count
                .fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl PoolAccumulator {
    pub fn new(num_outcomes: u32) -> Self {
        Self {
            pools: (0..num_outcomes).map(|_| AtomicU64::new(0)).collect(),
            total_volume: AtomicU64::new(0),
            count: AtomicU64::new(0),
            reserved_volume: AtomicU64::new(0),
            reserved_count: AtomicU64::new(0),
        }
    }

    pub fn num_outcomes(&self) -> u32 {
        self.pools.len() as u32
    }

    /// Claim `amount` for `outcome` against the total.
    ///
    /// Fails with `InvalidOutcome` if `outcome` is out of range and with
    /// `Overflow` if committed and pending volume or count would exceed
    /// `u64::MAX`. A failed reservation leaves the accumulator untouched.
    /// Until committed, the amount shows up in none of the readable counters.
    pub fn reserve(
        &self,
        outcome: Outcome,
        amount: Amount,
    ) -> Result<Reservation<'_>, Error> {
        let index = outcome as usize;
        if index >= self.pools.len() {
            return Err(Error::InvalidOutcome {
                outcome,
                num_outcomes: self.num_outcomes(),
            });
        }
        self.reserved_volume
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |total| {
                total.checked_add(amount)
            })
            .map_err(|_| Error::Overflow)?;
        if self
            .reserved_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_add(1)
            })
            .is_err()
        {
            self.reserved_volume.fetch_sub(amount, Ordering::AcqRel);
            return Err(Error::Overflow);
        }
        Ok(Reservation {
            accumulator: self,
            outcome: index,
            amount,
            committed: false,
        })
    }

    /// Add `amount` to `outcome`'s pool and count one contribution.
    pub fn add(&self, outcome: Outcome, amount: Amount) -> Result<(), Error> {
        self.reserve(outcome, amount)?.commit();
        Ok(())
    }

    /// Current pool for `outcome`, or `None` if out of range.
    pub fn read(&self, outcome: Outcome) -> Option<Amount> {
        self.pools
            .get(outcome as usize)
            .map(|pool| pool.load(Ordering::Acquire))
    }

    pub fn total_volume(&self) -> Amount {
        self.total_volume.load(Ordering::Acquire)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Copy all counters. Only exact when no add is in flight; callers
    /// needing exactness hold the owning market's gate exclusively.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pools: self
                .pools
                .iter()
                .map(|pool| pool.load(Ordering::Acquire))
                .collect(),
            total_volume: self.total_volume(),
            count: self.count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_updates_pool_total_and_count() {
        let acc = PoolAccumulator::new(3);
        acc.add(0, 5).unwrap();
        acc.add(2, 7).unwrap();
        acc.add(0, 1).unwrap();
        let snapshot = acc.snapshot();
        assert_eq!(snapshot.pools, vec![6, 0, 7]);
        assert_eq!(snapshot.total_volume, 13);
        assert_eq!(snapshot.count, 3);
        assert_eq!(acc.read(1), Some(0));
        assert_eq!(acc.read(3), None);
    }

    #[test]
    fn test_out_of_range_outcome_is_rejected() {
        let acc = PoolAccumulator::new(2);
        assert!(matches!(
            acc.add(2, 1),
            Err(Error::InvalidOutcome {
                outcome: 2,
                num_outcomes: 2
            })
        ));
        assert_eq!(acc.snapshot(), PoolSnapshot {
            pools: vec![0, 0],
            total_volume: 0,
            count: 0,
        });
    }

    #[test]
    fn test_overflow_leaves_state_unchanged() {
        let acc = PoolAccumulator::new(2);
        acc.add(0, u64::MAX - 1).unwrap();
        assert!(matches!(acc.add(1, 2), Err(Error::Overflow)));
        assert_eq!(acc.read(1), Some(0));
        assert_eq!(acc.total_volume(), u64::MAX - 1);
        assert_eq!(acc.count(), 1);
        acc.add(1, 1).unwrap();
        assert_eq!(acc.total_volume(), u64::MAX);
    }

    #[test]
    fn test_dropped_reservation_is_released() {
        let acc = PoolAccumulator::new(2);
        acc.add(0, u64::MAX - 50).unwrap();
        let reservation = acc.reserve(1, 40).unwrap();
        assert_eq!(reservation.amount(), 40);
        // Pending amounts hold headroom but are not readable
        assert!(matches!(acc.reserve(0, 20), Err(Error::Overflow)));
        drop(reservation);
        assert_eq!(acc.total_volume(), u64::MAX - 50);
        assert_eq!(acc.count(), 1);
        assert_eq!(acc.read(1), Some(0));
        acc.add(1, 50).unwrap();
        assert_eq!(acc.total_volume(), u64::MAX);
    }

    #[test]
    fn test_pending_reservation_is_not_readable() {
        let acc = PoolAccumulator::new(2);
        acc.add(0, 7).unwrap();
        let reservation = acc.reserve(1, 40).unwrap();
        assert_eq!(acc.snapshot(), PoolSnapshot {
            pools: vec![7, 0],
            total_volume: 7,
            count: 1,
        });
        reservation.commit();
        assert_eq!(acc.snapshot(), PoolSnapshot {
            pools: vec![7, 40],
            total_volume: 47,
            count: 2,
        });
    }

    #[test]
    fn test_concurrent_adds_commute() {
        let acc = PoolAccumulator::new(4);
        std::thread::scope(|scope| {
            for thread in 0..8u64 {
                let acc = &acc;
                scope.spawn(move || {
                    for i in 0..1_000u64 {
                        acc.add(((thread + i) % 4) as u32, thread + 1).unwrap();
                    }
                });
            }
        });
        let snapshot = acc.snapshot();
        // Σ_{t=1..8} t * 1000
        assert_eq!(snapshot.total_volume, 36_000);
        assert_eq!(snapshot.count, 8_000);
        assert_eq!(snapshot.pools.iter().sum::<u64>(), 36_000);
    }
}

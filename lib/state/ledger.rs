//! Append-only bet ledger.
//!
//! Records are never mutated or removed. Per-user positions and claimable
//! amounts exist only as projections of the record list.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, MarketId, Outcome, ParlayId, Timestamp};

/// Source of globally increasing sequence numbers
#[derive(Debug, Default)]
pub struct Sequencer(AtomicU64);

impl Sequencer {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BetKind {
    /// Placed directly or as part of a batch; settled through winnings claims
    Direct,
    /// One leg of a parlay; settled only through the parlay ticket
    ParlayLeg(ParlayId),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub market_id: MarketId,
    pub bettor: Address,
    pub outcome: Outcome,
    pub amount: Amount,
    pub timestamp: Timestamp,
    pub sequence: u64,
    pub kind: BetKind,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claimant: Address,
    pub amount: Amount,
    pub timestamp: Timestamp,
}

/// Fields of a bet before the ledger assigns its sequence number
#[derive(Clone, Copy, Debug)]
pub struct BetDraft {
    pub bettor: Address,
    pub outcome: Outcome,
    pub amount: Amount,
    pub timestamp: Timestamp,
    pub kind: BetKind,
}

#[derive(Debug)]
pub struct BetLedger {
    market_id: MarketId,
    bets: Mutex<Vec<BetRecord>>,
    claims: Mutex<Vec<ClaimRecord>>,
}

impl BetLedger {
    pub fn new(market_id: MarketId) -> Self {
        Self {
            market_id,
            bets: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
        }
    }

    /// Append a bet. The sequence number is drawn while the ledger is held,
    /// so records within one ledger are in sequence order.
    pub fn append(&self, sequencer: &Sequencer, draft: BetDraft) -> BetRecord {
        let mut bets = self.bets.lock();
        let record = BetRecord {
            market_id: self.market_id,
            bettor: draft.bettor,
            outcome: draft.outcome,
            amount: draft.amount,
            timestamp: draft.timestamp,
            sequence: sequencer.next(),
            kind: draft.kind,
        };
        bets.push(record.clone());
        record
    }

    pub fn len(&self) -> usize {
        self.bets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<BetRecord> {
        self.bets.lock().clone()
    }

    pub fn records_for(&self, bettor: &Address) -> Vec<BetRecord> {
        self.bets
            .lock()
            .iter()
            .filter(|record| record.bettor == *bettor)
            .cloned()
            .collect()
    }

    pub fn has_position(&self, bettor: &Address) -> bool {
        self.bets.lock().iter().any(|record| record.bettor == *bettor)
    }

    /// Stake per outcome held by `bettor`, over all bet kinds.
    pub fn position(&self, bettor: &Address, num_outcomes: u32) -> Vec<Amount> {
        let mut position: Vec<Amount> = vec![0; num_outcomes as usize];
        for record in self.bets.lock().iter() {
            if record.bettor != *bettor {
                continue;
            }
            if let Some(slot) = position.get_mut(record.outcome as usize) {
                *slot = slot.saturating_add(record.amount);
            }
        }
        position
    }

    /// Direct stake `bettor` holds on `outcome`. Parlay legs are excluded.
    pub fn direct_stake(&self, bettor: &Address, outcome: Outcome) -> Amount {
        self.bets
            .lock()
            .iter()
            .filter(|record| {
                record.bettor == *bettor
                    && record.outcome == outcome
                    && record.kind == BetKind::Direct
            })
            .fold(0, |acc: Amount, record| acc.saturating_add(record.amount))
    }

    pub fn has_claimed(&self, claimant: &Address) -> bool {
        self.claims
            .lock()
            .iter()
            .any(|claim| claim.claimant == *claimant)
    }

    /// Record a claim. Returns `false`, recording nothing, if `claimant`
    /// has already claimed on this ledger.
    pub fn record_claim(&self, claim: ClaimRecord) -> bool {
        let mut claims = self.claims.lock();
        if claims.iter().any(|existing| existing.claimant == claim.claimant) {
            return false;
        }
        claims.push(claim);
        true
    }

    pub fn claims(&self) -> Vec<ClaimRecord> {
        self.claims.lock().clone()
    }
}

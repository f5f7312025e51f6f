//! Stake-weighted disputes over a proposed resolution.
//!
//! Disputers back an outcome with stake while the window is open. Stakes
//! accumulate in a [`PoolAccumulator`], so concurrent disputers commute the
//! same way concurrent bettors do. After the deadline anyone may finalize;
//! the outcome with the greatest backing wins and an exact tie goes to the
//! proposed outcome.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    state::{
        error::Error,
        events::{Event, EventBus},
        ledger::Sequencer,
        markets::{Market, MarketState, Phase, Resolution},
        pool::PoolAccumulator,
    },
    types::{Address, Amount, Outcome, Timestamp},
};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DisputeVote {
    pub disputer: Address,
    pub outcome: Outcome,
    pub stake: Amount,
    pub timestamp: Timestamp,
    pub sequence: u64,
}

#[derive(Debug)]
pub struct Dispute {
    proposed_outcome: Outcome,
    deadline: Timestamp,
    votes: PoolAccumulator,
    records: Mutex<Vec<DisputeVote>>,
}

impl Dispute {
    pub fn new(
        proposed_outcome: Outcome,
        num_outcomes: u32,
        deadline: Timestamp,
    ) -> Self {
        Self {
            proposed_outcome,
            deadline,
            votes: PoolAccumulator::new(num_outcomes),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn proposed_outcome(&self) -> Outcome {
        self.proposed_outcome
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    pub fn is_open(&self, now: Timestamp) -> bool {
        now < self.deadline
    }

    pub fn votes(&self) -> Vec<Amount> {
        self.votes.snapshot().pools
    }

    pub fn records(&self) -> Vec<DisputeVote> {
        self.records.lock().clone()
    }
}

/// Outcome with the greatest backing. Ties go to `proposed`; a tie that
/// excludes `proposed` goes to the lowest index.
pub fn tally(votes: &[Amount], proposed: Outcome) -> Outcome {
    let Some(max) = votes.iter().copied().max() else {
        return proposed;
    };
    if votes.get(proposed as usize) == Some(&max) {
        return proposed;
    }
    votes
        .iter()
        .position(|vote| *vote == max)
        .map_or(proposed, |index| index as Outcome)
}

impl Market {
    /// Back `outcome` with `stake` during the dispute window.
    pub fn dispute_resolution(
        &self,
        disputer: Address,
        outcome: Outcome,
        stake: Amount,
        now: Timestamp,
        min_stake: Amount,
        sequencer: &Sequencer,
    ) -> Result<DisputeVote, Error> {
        let phase = self.gate();
        let dispute = match &*phase {
            Phase::Disputed(dispute) if dispute.is_open(now) => dispute,
            Phase::Disputed(dispute) => {
                return Err(Error::DisputeWindowClosed {
                    market_id: self.info.id,
                    deadline: dispute.deadline,
                });
            }
            Phase::Open | Phase::Closed { .. } | Phase::Resolved(_) => {
                return Err(Error::InvalidState {
                    market_id: self.info.id,
                    state: phase.state(),
                    operation: "accept disputes",
                });
            }
        };
        if outcome >= self.info.num_outcomes {
            return Err(Error::InvalidOutcome {
                outcome,
                num_outcomes: self.info.num_outcomes,
            });
        }
        if stake < min_stake || stake == 0 {
            return Err(Error::InsufficientStake {
                stake,
                minimum: min_stake,
            });
        }
        dispute.votes.add(outcome, stake)?;
        let vote = {
            let mut records = dispute.records.lock();
            let vote = DisputeVote {
                disputer,
                outcome,
                stake,
                timestamp: now,
                sequence: sequencer.next(),
            };
            records.push(vote.clone());
            vote
        };
        self.events.emit(Event::DisputeSubmitted {
            market_id: self.info.id,
            disputer,
            outcome,
            stake,
        });
        drop(phase);
        tracing::debug!(
            market_id = %self.info.id,
            %disputer,
            outcome,
            stake,
            "dispute stake accepted"
        );
        Ok(vote)
    }

    /// Stake accumulated behind `outcome` in the current or final dispute.
    pub fn dispute_votes(&self, outcome: Outcome) -> Amount {
        let phase = self.gate();
        let votes = match &*phase {
            Phase::Disputed(dispute) => dispute.votes.read(outcome),
            Phase::Resolved(resolution) => {
                resolution.dispute_votes.get(outcome as usize).copied()
            }
            Phase::Open | Phase::Closed { .. } => None,
        };
        votes.unwrap_or(0)
    }

    /// Every dispute stake accepted so far, in arrival order.
    pub fn dispute_records(&self) -> Vec<DisputeVote> {
        let phase = self.gate();
        match &*phase {
            Phase::Disputed(dispute) => dispute.records(),
            _ => Vec::new(),
        }
    }

    /// Close the dispute once its deadline has passed and fix the winner.
    pub fn finalize_resolution(
        &self,
        now: Timestamp,
    ) -> Result<Resolution, Error> {
        let mut phase = self.phase.write();
        let resolution = match &*phase {
            Phase::Resolved(_) => {
                return Err(Error::AlreadyFinalized {
                    market_id: self.info.id,
                });
            }
            Phase::Disputed(dispute) if dispute.is_open(now) => {
                return Err(Error::DisputeWindowOpen {
                    market_id: self.info.id,
                    deadline: dispute.deadline,
                });
            }
            Phase::Disputed(dispute) => {
                let votes = dispute.votes();
                Resolution {
                    winning_outcome: tally(&votes, dispute.proposed_outcome),
                    proposed_outcome: dispute.proposed_outcome,
                    resolved_at: now,
                    dispute_votes: votes,
                }
            }
            Phase::Open | Phase::Closed { .. } => {
                return Err(Error::InvalidState {
                    market_id: self.info.id,
                    state: phase.state(),
                    operation: "finalize a resolution",
                });
            }
        };
        debug_assert!(phase.state().can_transition_to(MarketState::Resolved));
        *phase = Phase::Resolved(resolution.clone());
        self.events.emit(Event::MarketResolved {
            market_id: self.info.id,
            winning_outcome: resolution.winning_outcome,
        });
        drop(phase);
        tracing::info!(
            market_id = %self.info.id,
            winning_outcome = resolution.winning_outcome,
            proposed_outcome = resolution.proposed_outcome,
            "resolution finalized"
        );
        Ok(resolution)
    }
}

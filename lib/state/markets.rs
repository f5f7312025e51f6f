use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::{
    config::{EngineConfig, MIN_MARKET_OUTCOMES},
    math::{
        odds::implied_odds,
        payout::{PayoutPolicy, SettledPool},
    },
    state::{
        dispute::Dispute,
        error::{Error, InvalidParameters},
        events::{Event, EventBus},
        ledger::{BetDraft, BetKind, BetLedger, BetRecord, ClaimRecord, Sequencer},
        pool::{PoolAccumulator, PoolSnapshot, Reservation},
    },
    types::{
        Address, Amount, MarketHandle, MarketId, Outcome, Timestamp, hashes,
    },
};

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum::Display,
)]
pub enum MarketState {
    Open = 0,
    Closed = 1,
    Disputed = 2,
    Resolved = 3,
}

impl MarketState {
    /// Forward-only lifecycle. There are no self-transitions: repeating a
    /// transition is an error, not a no-op.
    pub fn can_transition_to(&self, new_state: MarketState) -> bool {
        use MarketState::{Closed, Disputed, Open, Resolved};
        match (self, new_state) {
            (Open, Closed) => true,
            // Open markets past their closing time may be resolved directly
            (Open, Disputed) | (Open, Resolved) => true,
            (Closed, Disputed) | (Closed, Resolved) => true,
            (Disputed, Resolved) => true,
            // Resolved is terminal
            _ => false,
        }
    }

    pub fn allows_betting(&self) -> bool {
        matches!(self, MarketState::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketState::Resolved)
    }
}

/// Final outcome of a market, fixed once set
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Resolution {
    pub winning_outcome: Outcome,
    pub proposed_outcome: Outcome,
    pub resolved_at: Timestamp,
    /// Accumulated dispute stake per outcome. Empty if the resolution was
    /// never open to dispute.
    pub dispute_votes: Vec<Amount>,
}

impl Resolution {
    pub fn was_disputable(&self) -> bool {
        !self.dispute_votes.is_empty()
    }
}

/// Lifecycle phase together with the data that only exists in that phase
#[derive(Debug)]
pub(in crate::state) enum Phase {
    Open,
    Closed { closed_at: Timestamp },
    Disputed(Dispute),
    Resolved(Resolution),
}

impl Phase {
    pub(in crate::state) fn state(&self) -> MarketState {
        match self {
            Self::Open => MarketState::Open,
            Self::Closed { .. } => MarketState::Closed,
            Self::Disputed(_) => MarketState::Disputed,
            Self::Resolved(_) => MarketState::Resolved,
        }
    }
}

/// Inputs to market creation
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MarketParams {
    pub question: String,
    pub num_outcomes: u32,
    pub closing_time: Timestamp,
    pub deposit: Amount,
}

impl MarketParams {
    pub fn validate(
        &self,
        config: &EngineConfig,
        now: Timestamp,
    ) -> Result<(), InvalidParameters> {
        if self.question.trim().is_empty() {
            return Err(InvalidParameters::EmptyQuestion);
        }
        if self.num_outcomes < MIN_MARKET_OUTCOMES {
            return Err(InvalidParameters::TooFewOutcomes {
                got: self.num_outcomes,
                min: MIN_MARKET_OUTCOMES,
            });
        }
        if self.num_outcomes > config.max_outcomes {
            return Err(InvalidParameters::TooManyOutcomes {
                got: self.num_outcomes,
                max: config.max_outcomes,
            });
        }
        if self.closing_time <= now {
            return Err(InvalidParameters::ClosingTimeNotInFuture {
                closing_time: self.closing_time,
                now,
            });
        }
        if self.deposit < config.min_creation_deposit {
            return Err(InvalidParameters::DepositTooSmall {
                deposit: self.deposit,
                minimum: config.min_creation_deposit,
            });
        }
        Ok(())
    }
}

/// Immutable market data
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MarketInfo {
    pub id: MarketId,
    pub handle: MarketHandle,
    pub question: String,
    pub num_outcomes: u32,
    pub closing_time: Timestamp,
    pub creator: Address,
    pub deposit: Amount,
    pub created_at: Timestamp,
}

/// Consistent copy of a market's mutable state
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub state: MarketState,
    pub closed_at: Option<Timestamp>,
    pub pools: PoolSnapshot,
    pub ledger_len: usize,
    pub proposed_outcome: Option<Outcome>,
    pub dispute_deadline: Option<Timestamp>,
    pub dispute_votes: Vec<Amount>,
    pub winning_outcome: Option<Outcome>,
}

impl MarketSnapshot {
    pub fn odds(&self) -> Vec<u64> {
        implied_odds(&self.pools.pools)
    }
}

/// What `resolve` did
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Proposal {
    /// No dispute window configured; the market is resolved
    Final(Resolution),
    /// The market is disputable until `deadline`
    Disputable { deadline: Timestamp },
}

/// One market aggregate.
///
/// `phase` is the market's gate. Bets and dispute stakes hold it shared
/// while they validate and apply, so they never serialize against each
/// other, only against lifecycle transitions, which hold it exclusively.
/// A bet racing a close therefore either completes before the close or
/// observes the closed state and is rejected.
///
/// Notifications about a market are emitted while its gate is held, so
/// subscribers receive them in the order the changes took effect.
#[derive(Debug)]
pub struct Market {
    pub(in crate::state) info: MarketInfo,
    pub(in crate::state) phase: RwLock<Phase>,
    pub(in crate::state) pool: PoolAccumulator,
    pub(in crate::state) ledger: BetLedger,
    pub(in crate::state) events: EventBus,
}

impl Market {
    pub(in crate::state) fn new(
        id: MarketId,
        creator: Address,
        params: MarketParams,
        created_at: Timestamp,
        events: EventBus,
    ) -> Self {
        let handle = hashes::market_handle(
            id,
            &creator,
            &params.question,
            params.num_outcomes,
            params.closing_time,
        );
        Self {
            info: MarketInfo {
                id,
                handle,
                question: params.question,
                num_outcomes: params.num_outcomes,
                closing_time: params.closing_time,
                creator,
                deposit: params.deposit,
                created_at,
            },
            phase: RwLock::new(Phase::Open),
            pool: PoolAccumulator::new(params.num_outcomes),
            ledger: BetLedger::new(id),
            events,
        }
    }

    pub fn info(&self) -> &MarketInfo {
        &self.info
    }

    pub fn id(&self) -> MarketId {
        self.info.id
    }

    pub fn num_outcomes(&self) -> u32 {
        self.info.num_outcomes
    }

    pub fn state(&self) -> MarketState {
        self.phase.read().state()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        let phase = self.phase.read();
        match &*phase {
            Phase::Resolved(resolution) => Some(resolution.clone()),
            _ => None,
        }
    }

    pub fn winning_outcome(&self) -> Option<Outcome> {
        let phase = self.phase.read();
        match &*phase {
            Phase::Resolved(resolution) => Some(resolution.winning_outcome),
            _ => None,
        }
    }

    pub fn pool(&self) -> &PoolAccumulator {
        &self.pool
    }

    pub fn ledger(&self) -> &BetLedger {
        &self.ledger
    }

    pub(in crate::state) fn gate(&self) -> RwLockReadGuard<'_, Phase> {
        self.phase.read()
    }

    fn check_outcome(&self, outcome: Outcome) -> Result<(), Error> {
        if outcome >= self.info.num_outcomes {
            return Err(Error::InvalidOutcome {
                outcome,
                num_outcomes: self.info.num_outcomes,
            });
        }
        Ok(())
    }

    /// Check a bet against `phase`, which the caller holds through the gate.
    pub(in crate::state) fn validate_bet(
        &self,
        phase: &Phase,
        outcome: Outcome,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), Error> {
        let state = phase.state();
        if !state.allows_betting() || now >= self.info.closing_time {
            return Err(Error::MarketNotOpen {
                market_id: self.info.id,
                state,
            });
        }
        self.check_outcome(outcome)?;
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        Ok(())
    }

    /// Validate without holding the gate beyond the check itself.
    pub fn check_bet(
        &self,
        outcome: Outcome,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), Error> {
        let phase = self.gate();
        self.validate_bet(&phase, outcome, amount, now)
    }

    /// Reserve a validated bet. The caller must hold the gate until the
    /// reservation is committed and the ledger record appended.
    pub(in crate::state) fn reserve_bet(
        &self,
        outcome: Outcome,
        amount: Amount,
    ) -> Result<Reservation<'_>, Error> {
        self.pool.reserve(outcome, amount)
    }

    pub fn place_bet(
        &self,
        bettor: Address,
        outcome: Outcome,
        amount: Amount,
        now: Timestamp,
        sequencer: &Sequencer,
    ) -> Result<BetRecord, Error> {
        let phase = self.gate();
        self.validate_bet(&phase, outcome, amount, now)?;
        self.reserve_bet(outcome, amount)?.commit();
        let record = self.ledger.append(sequencer, BetDraft {
            bettor,
            outcome,
            amount,
            timestamp: now,
            kind: BetKind::Direct,
        });
        self.events.emit(Event::BetPlaced {
            market_id: self.info.id,
            bettor,
            outcome,
            amount,
        });
        drop(phase);
        tracing::debug!(
            market_id = %self.info.id,
            %bettor,
            outcome,
            amount,
            sequence = record.sequence,
            "bet placed"
        );
        Ok(record)
    }

    fn require_creator(
        &self,
        caller: &Address,
        operation: &'static str,
    ) -> Result<(), Error> {
        if *caller != self.info.creator {
            return Err(Error::Unauthorized { operation });
        }
        Ok(())
    }

    pub fn close(&self, caller: &Address, now: Timestamp) -> Result<(), Error> {
        self.require_creator(caller, "close the market")?;
        let mut phase = self.phase.write();
        let state = phase.state();
        if !state.can_transition_to(MarketState::Closed) {
            return Err(Error::InvalidState {
                market_id: self.info.id,
                state,
                operation: "close",
            });
        }
        *phase = Phase::Closed { closed_at: now };
        self.events.emit(Event::MarketClosed {
            market_id: self.info.id,
            closed_at: now,
        });
        drop(phase);
        tracing::info!(market_id = %self.info.id, "market closed");
        Ok(())
    }

    /// Propose `outcome` as the winner.
    ///
    /// With `dispute_window_secs == 0` the market resolves at once,
    /// otherwise it enters `Disputed` until the window has passed.
    pub fn resolve(
        &self,
        caller: &Address,
        outcome: Outcome,
        now: Timestamp,
        dispute_window_secs: u64,
    ) -> Result<Proposal, Error> {
        self.require_creator(caller, "resolve the market")?;
        self.check_outcome(outcome)?;
        let mut phase = self.phase.write();
        let state = phase.state();
        let resolvable = match &*phase {
            Phase::Closed { .. } => true,
            Phase::Open => now >= self.info.closing_time,
            Phase::Disputed(_) | Phase::Resolved(_) => false,
        };
        if !resolvable {
            return Err(Error::InvalidState {
                market_id: self.info.id,
                state,
                operation: "resolve",
            });
        }
        let market_id = self.info.id;
        let proposal = if dispute_window_secs == 0 {
            let resolution = Resolution {
                winning_outcome: outcome,
                proposed_outcome: outcome,
                resolved_at: now,
                dispute_votes: Vec::new(),
            };
            *phase = Phase::Resolved(resolution.clone());
            self.events.emit(Event::ResolutionProposed {
                market_id,
                outcome,
                dispute_deadline: None,
            });
            self.events.emit(Event::MarketResolved {
                market_id,
                winning_outcome: outcome,
            });
            Proposal::Final(resolution)
        } else {
            let deadline = now.saturating_add(dispute_window_secs);
            *phase = Phase::Disputed(Dispute::new(
                outcome,
                self.info.num_outcomes,
                deadline,
            ));
            self.events.emit(Event::ResolutionProposed {
                market_id,
                outcome,
                dispute_deadline: Some(deadline),
            });
            Proposal::Disputable { deadline }
        };
        drop(phase);
        tracing::info!(
            market_id = %self.info.id,
            outcome,
            ?proposal,
            "resolution proposed"
        );
        Ok(proposal)
    }

    /// Copy the market's mutable state. Holds the gate exclusively for the
    /// copy, so no bet is half-applied in the result.
    pub fn snapshot(&self) -> MarketSnapshot {
        let phase = self.phase.write();
        let pools = self.pool.snapshot();
        let ledger_len = self.ledger.len();
        let (proposed_outcome, dispute_deadline, dispute_votes, winning_outcome) =
            match &*phase {
                Phase::Open | Phase::Closed { .. } => {
                    (None, None, Vec::new(), None)
                }
                Phase::Disputed(dispute) => (
                    Some(dispute.proposed_outcome()),
                    Some(dispute.deadline()),
                    dispute.votes(),
                    None,
                ),
                Phase::Resolved(resolution) => (
                    Some(resolution.proposed_outcome),
                    None,
                    resolution.dispute_votes.clone(),
                    Some(resolution.winning_outcome),
                ),
            };
        let closed_at = match &*phase {
            Phase::Closed { closed_at } => Some(*closed_at),
            _ => None,
        };
        MarketSnapshot {
            state: phase.state(),
            closed_at,
            pools,
            ledger_len,
            proposed_outcome,
            dispute_deadline,
            dispute_votes,
            winning_outcome,
        }
    }

    /// Final pool figures. `None` until the market is resolved.
    pub fn settled_pool(&self) -> Option<(Outcome, SettledPool)> {
        let phase = self.gate();
        let Phase::Resolved(resolution) = &*phase else {
            return None;
        };
        let winning_outcome = resolution.winning_outcome;
        // No bet can be in flight once resolved
        let winning_pool = self.pool.read(winning_outcome).unwrap_or(0);
        Some((winning_outcome, SettledPool {
            winning_pool,
            total_volume: self.pool.total_volume(),
        }))
    }

    /// What `claimant` would receive from `claim_winnings` right now.
    pub fn claimable(
        &self,
        claimant: &Address,
        policy: &dyn PayoutPolicy,
    ) -> Result<Amount, Error> {
        let (winning_outcome, settled) = self
            .settled_pool()
            .ok_or(Error::NotResolved {
                market_id: self.info.id,
            })?;
        if self.ledger.has_claimed(claimant) {
            return Ok(0);
        }
        let stake = self.ledger.direct_stake(claimant, winning_outcome);
        Ok(policy.single_payout(stake, settled)?)
    }

    /// Pay out `claimant`'s direct stake on the winning outcome. Each
    /// claimant may claim once.
    pub fn claim_winnings(
        &self,
        claimant: &Address,
        now: Timestamp,
        policy: &dyn PayoutPolicy,
    ) -> Result<Amount, Error> {
        let (winning_outcome, settled) = self
            .settled_pool()
            .ok_or(Error::NotResolved {
                market_id: self.info.id,
            })?;
        let stake = self.ledger.direct_stake(claimant, winning_outcome);
        if stake == 0 {
            return Err(Error::NothingToClaim);
        }
        let amount = policy.single_payout(stake, settled)?;
        let recorded = self.ledger.record_claim(ClaimRecord {
            claimant: *claimant,
            amount,
            timestamp: now,
        });
        if !recorded {
            return Err(Error::AlreadyClaimed);
        }
        tracing::info!(
            market_id = %self.info.id,
            %claimant,
            stake,
            amount,
            "winnings claimed"
        );
        Ok(amount)
    }
}

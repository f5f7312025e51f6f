//! State errors

use thiserror::Error;

use crate::{
    math::units::UnitsError,
    state::markets::MarketState,
    types::{Amount, MarketId, Outcome, ParlayId, Timestamp},
};

#[derive(Debug, Error)]
pub enum InvalidParameters {
    #[error("market needs at least {min} outcomes, got {got}")]
    TooFewOutcomes { got: u32, min: u32 },
    #[error("market may have at most {max} outcomes, got {got}")]
    TooManyOutcomes { got: u32, max: u32 },
    #[error("closing time {closing_time} is not after now ({now})")]
    ClosingTimeNotInFuture {
        closing_time: Timestamp,
        now: Timestamp,
    },
    #[error("deposit {deposit} is below the minimum {minimum}")]
    DepositTooSmall { deposit: Amount, minimum: Amount },
    #[error("question is empty")]
    EmptyQuestion,
    #[error("expected {expected} {what}, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("no legs given")]
    NoLegs,
    #[error("market {market_id} appears more than once")]
    DuplicateMarket { market_id: MarketId },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] InvalidParameters),
    #[error("market {market_id} is not open for bets ({state})")]
    MarketNotOpen {
        market_id: MarketId,
        state: MarketState,
    },
    #[error("market {market_id} cannot {operation} in state {state}")]
    InvalidState {
        market_id: MarketId,
        state: MarketState,
        operation: &'static str,
    },
    #[error("outcome {outcome} out of range for {num_outcomes} outcomes")]
    InvalidOutcome { outcome: Outcome, num_outcomes: u32 },
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("stake {stake} is below the minimum {minimum}")]
    InsufficientStake { stake: Amount, minimum: Amount },
    #[error("only the market creator may {operation}")]
    Unauthorized { operation: &'static str },
    #[error("dispute window for market {market_id} is open until {deadline}")]
    DisputeWindowOpen {
        market_id: MarketId,
        deadline: Timestamp,
    },
    #[error("dispute window for market {market_id} closed at {deadline}")]
    DisputeWindowClosed {
        market_id: MarketId,
        deadline: Timestamp,
    },
    #[error("market {market_id} resolution is already final")]
    AlreadyFinalized { market_id: MarketId },
    #[error("already claimed")]
    AlreadyClaimed,
    #[error("batch leg {leg} failed validation: {source}")]
    BatchValidationFailed {
        leg: usize,
        #[source]
        source: Box<Error>,
    },
    #[error("accumulator overflow")]
    Overflow,
    #[error("market {id} not found")]
    MarketNotFound { id: MarketId },
    #[error("parlay {id} not found")]
    ParlayNotFound { id: ParlayId },
    #[error("market {market_id} is not resolved")]
    NotResolved { market_id: MarketId },
    #[error("nothing to claim")]
    NothingToClaim,
    #[error("payout computation failed: {0}")]
    Payout(#[from] UnitsError),
}

impl Error {
    pub(in crate::state) fn at_leg(self, leg: usize) -> Self {
        Self::BatchValidationFailed {
            leg,
            source: Box::new(self),
        }
    }
}

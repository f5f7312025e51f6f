//! Engine notifications.
//!
//! Every accepted state change is announced on a broadcast bus. Emitting
//! never blocks and never fails: with no subscribers the event is dropped,
//! and a subscriber that falls more than `event_capacity` events behind
//! observes a lag instead of slowing the engine down.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::types::{
    Address, Amount, MarketHandle, MarketId, Outcome, ParlayId, Timestamp,
};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    MarketCreated {
        market_id: MarketId,
        handle: MarketHandle,
        creator: Address,
        question: String,
    },
    BetPlaced {
        market_id: MarketId,
        bettor: Address,
        outcome: Outcome,
        amount: Amount,
    },
    MarketClosed {
        market_id: MarketId,
        closed_at: Timestamp,
    },
    ResolutionProposed {
        market_id: MarketId,
        outcome: Outcome,
        /// `None` if the resolution was final immediately
        dispute_deadline: Option<Timestamp>,
    },
    DisputeSubmitted {
        market_id: MarketId,
        disputer: Address,
        outcome: Outcome,
        stake: Amount,
    },
    MarketResolved {
        market_id: MarketId,
        winning_outcome: Outcome,
    },
    BatchBetPlaced {
        bettor: Address,
        market_ids: Vec<MarketId>,
        total_amount: Amount,
    },
    ParlayCreated {
        parlay_id: ParlayId,
        bettor: Address,
        market_ids: Vec<MarketId>,
        total_stake: Amount,
    },
    ParlayClaimed {
        parlay_id: ParlayId,
        bettor: Address,
        payout: Amount,
    },
    WinningsClaimed {
        market_id: MarketId,
        claimant: Address,
        amount: Amount,
    },
}

impl Event {
    /// Market the event concerns, if it concerns exactly one
    pub fn market_id(&self) -> Option<MarketId> {
        match self {
            Self::MarketCreated { market_id, .. }
            | Self::BetPlaced { market_id, .. }
            | Self::MarketClosed { market_id, .. }
            | Self::ResolutionProposed { market_id, .. }
            | Self::DisputeSubmitted { market_id, .. }
            | Self::MarketResolved { market_id, .. }
            | Self::WinningsClaimed { market_id, .. } => Some(*market_id),
            Self::BatchBetPlaced { .. }
            | Self::ParlayCreated { .. }
            | Self::ParlayClaimed { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream. Lagged positions surface as stream errors.
    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

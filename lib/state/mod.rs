use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    clock::Clock,
    config::EngineConfig,
    math::payout::{Parimutuel, PayoutPolicy},
    types::{Address, Amount, MarketHandle, MarketId, Outcome, Timestamp},
};

pub mod coordinator;
pub mod dispute;
pub mod error;
pub mod events;
pub mod ledger;
pub mod markets;
pub mod parlay;
pub mod pool;
pub mod query;

pub use coordinator::{BetLeg, MultiMarketCoordinator};
pub use dispute::DisputeVote;
pub use error::{Error, InvalidParameters};
pub use events::{Event, EventBus};
pub use ledger::{BetKind, BetRecord, Sequencer};
pub use markets::{
    Market, MarketInfo, MarketParams, MarketSnapshot, MarketState, Proposal,
    Resolution,
};
pub use parlay::{ParlayStake, ParlayStatus, ParlayTicket};
pub use query::{BatchStats, MarketSummary, QueryService};

/// Owns every market aggregate, indexed by id.
///
/// Market ids are assigned sequentially from zero and never reused. The
/// registry lock only guards the index itself: once a caller holds an
/// `Arc<Market>`, work on that market never touches the registry lock again.
pub struct MarketRegistry {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn PayoutPolicy>,
    markets: RwLock<Vec<Arc<Market>>>,
    handles: RwLock<HashMap<MarketHandle, MarketId>>,
    sequencer: Sequencer,
    events: EventBus,
}

impl std::fmt::Debug for MarketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketRegistry")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("total_markets", &self.total_markets())
            .finish_non_exhaustive()
    }
}

impl MarketRegistry {
    /// Registry paying out with [`Parimutuel`] at the configured fee.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let policy = Arc::new(Parimutuel::new(config.fee_bps));
        Self::with_policy(config, clock, policy)
    }

    pub fn with_policy(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn PayoutPolicy>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            clock,
            policy,
            markets: RwLock::new(Vec::new()),
            handles: RwLock::new(HashMap::new()),
            sequencer: Sequencer::default(),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn policy(&self) -> &dyn PayoutPolicy {
        self.policy.as_ref()
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn create_market(
        &self,
        creator: Address,
        params: MarketParams,
    ) -> Result<MarketId, Error> {
        let now = self.now();
        params.validate(&self.config, now)?;
        let market = {
            let mut markets = self.markets.write();
            let id = MarketId(markets.len() as u64);
            let market = Arc::new(Market::new(
                id,
                creator,
                params,
                now,
                self.events.clone(),
            ));
            markets.push(market.clone());
            self.handles.write().insert(market.info().handle, id);
            // Announced before the market becomes reachable by id
            self.events.emit(Event::MarketCreated {
                market_id: id,
                handle: market.info().handle,
                creator,
                question: market.info().question.clone(),
            });
            market
        };
        let info = market.info();
        tracing::info!(
            market_id = %info.id,
            handle = %info.handle,
            %creator,
            num_outcomes = info.num_outcomes,
            closing_time = info.closing_time,
            "market created"
        );
        Ok(info.id)
    }

    pub fn market(&self, id: MarketId) -> Result<Arc<Market>, Error> {
        self.markets
            .read()
            .get(id.as_u64() as usize)
            .cloned()
            .ok_or(Error::MarketNotFound { id })
    }

    /// Handle of the market created `index`-th, if any
    pub fn market_handle(&self, index: u64) -> Option<MarketHandle> {
        self.markets
            .read()
            .get(index as usize)
            .map(|market| market.info().handle)
    }

    pub fn market_by_handle(
        &self,
        handle: &MarketHandle,
    ) -> Option<Arc<Market>> {
        let id = self.handles.read().get(handle).copied()?;
        self.market(id).ok()
    }

    pub fn markets(&self) -> Vec<Arc<Market>> {
        self.markets.read().clone()
    }

    pub fn total_markets(&self) -> u64 {
        self.markets.read().len() as u64
    }

    /// Volume over every market
    pub fn total_volume(&self) -> Amount {
        self.markets
            .read()
            .iter()
            .fold(0, |acc: Amount, market| {
                acc.saturating_add(market.pool().total_volume())
            })
    }

    pub fn place_bet(
        &self,
        bettor: Address,
        market_id: MarketId,
        outcome: Outcome,
        amount: Amount,
    ) -> Result<BetRecord, Error> {
        let market = self.market(market_id)?;
        market.place_bet(bettor, outcome, amount, self.now(), &self.sequencer)
    }

    pub fn close_market(
        &self,
        caller: &Address,
        market_id: MarketId,
    ) -> Result<(), Error> {
        self.market(market_id)?.close(caller, self.now())
    }

    pub fn resolve_market(
        &self,
        caller: &Address,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<Proposal, Error> {
        self.market(market_id)?.resolve(
            caller,
            outcome,
            self.now(),
            self.config.dispute_window_secs,
        )
    }

    pub fn dispute_resolution(
        &self,
        disputer: Address,
        market_id: MarketId,
        outcome: Outcome,
        stake: Amount,
    ) -> Result<DisputeVote, Error> {
        self.market(market_id)?.dispute_resolution(
            disputer,
            outcome,
            stake,
            self.now(),
            self.config.min_dispute_stake,
            &self.sequencer,
        )
    }

    pub fn finalize_resolution(
        &self,
        market_id: MarketId,
    ) -> Result<Resolution, Error> {
        self.market(market_id)?.finalize_resolution(self.now())
    }

    pub fn claim_winnings(
        &self,
        claimant: &Address,
        market_id: MarketId,
    ) -> Result<Amount, Error> {
        let market = self.market(market_id)?;
        let amount =
            market.claim_winnings(claimant, self.now(), self.policy())?;
        self.events.emit(Event::WinningsClaimed {
            market_id,
            claimant: *claimant,
            amount,
        });
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const CREATOR: Address = Address::new([0xc0; 20]);

    fn params(question: &str) -> MarketParams {
        MarketParams {
            question: question.to_owned(),
            num_outcomes: 2,
            closing_time: 2_000,
            deposit: EngineConfig::DEFAULT_MIN_CREATION_DEPOSIT,
        }
    }

    #[test]
    fn test_ids_are_sequential_and_handles_distinct() {
        let registry = MarketRegistry::new(
            EngineConfig::default(),
            Arc::new(ManualClock::new(1_000)),
        );
        let a = registry.create_market(CREATOR, params("same")).unwrap();
        let b = registry.create_market(CREATOR, params("same")).unwrap();
        assert_eq!((a, b), (MarketId(0), MarketId(1)));
        assert_eq!(registry.total_markets(), 2);
        let handle_a = registry.market_handle(0).unwrap();
        let handle_b = registry.market_handle(1).unwrap();
        assert_ne!(handle_a, handle_b);
        assert_eq!(registry.market_by_handle(&handle_b).unwrap().id(), b);
        assert!(registry.market_handle(2).is_none());
        assert!(matches!(
            registry.market(MarketId(2)),
            Err(Error::MarketNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_market_is_not_registered() {
        let registry = MarketRegistry::new(
            EngineConfig::default(),
            Arc::new(ManualClock::new(5_000)),
        );
        assert!(matches!(
            registry.create_market(CREATOR, params("late")),
            Err(Error::InvalidParameters(
                InvalidParameters::ClosingTimeNotInFuture { .. }
            ))
        ));
        assert_eq!(registry.total_markets(), 0);
    }

    #[test]
    fn test_lifecycle_emits_events() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry =
            MarketRegistry::new(EngineConfig::without_disputes(), clock.clone());
        let mut rx = registry.events().subscribe();
        let id = registry.create_market(CREATOR, params("q")).unwrap();
        registry.place_bet(Address::new([1; 20]), id, 1, 40).unwrap();
        clock.advance(10);
        registry.close_market(&CREATOR, id).unwrap();
        registry.resolve_market(&CREATOR, id, 1).unwrap();
        let events: Vec<Event> =
            std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events[0], Event::MarketCreated { .. }));
        assert!(matches!(events[1], Event::BetPlaced { amount: 40, .. }));
        assert!(matches!(events[2], Event::MarketClosed {
            closed_at: 1_010,
            ..
        }));
        assert!(matches!(events[3], Event::ResolutionProposed {
            dispute_deadline: None,
            ..
        }));
        assert!(matches!(events[4], Event::MarketResolved {
            winning_outcome: 1,
            ..
        }));
        assert_eq!(registry.total_volume(), 40);
    }
}

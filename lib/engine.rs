//! Settlement engine facade.
//!
//! [`Engine`] wires a [`MarketRegistry`] to its coordinator and query
//! service and exposes the whole operation surface in one place. It is
//! `Send + Sync`; share it by reference or behind an `Arc`.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{
    clock::{Clock, SystemClock},
    config::EngineConfig,
    math::payout::PayoutPolicy,
    state::{
        BatchStats, BetLeg, BetRecord, DisputeVote, Error, Event,
        MarketRegistry, MarketSummary, MultiMarketCoordinator, ParlayStake,
        ParlayStatus, ParlayTicket, Proposal, QueryService, Resolution,
        markets::{Market, MarketParams},
    },
    types::{Address, Amount, MarketHandle, MarketId, Outcome, ParlayId},
};

#[derive(Debug)]
pub struct Engine {
    registry: Arc<MarketRegistry>,
    coordinator: MultiMarketCoordinator,
    queries: QueryService,
}

impl Engine {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::from_registry(Arc::new(MarketRegistry::new(config, clock)))
    }

    /// Engine reading wall-clock time
    pub fn with_system_clock(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn with_policy(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn PayoutPolicy>,
    ) -> Self {
        Self::from_registry(Arc::new(MarketRegistry::with_policy(
            config, clock, policy,
        )))
    }

    fn from_registry(registry: Arc<MarketRegistry>) -> Self {
        tracing::debug!(config = ?registry.config(), "starting engine");
        Self {
            coordinator: MultiMarketCoordinator::new(registry.clone()),
            queries: QueryService::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &MarketRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &MultiMarketCoordinator {
        &self.coordinator
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn config(&self) -> &EngineConfig {
        self.registry.config()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.registry.events().subscribe()
    }

    // Markets

    pub fn create_market(
        &self,
        creator: Address,
        params: MarketParams,
    ) -> Result<MarketId, Error> {
        self.registry.create_market(creator, params)
    }

    pub fn market(&self, market_id: MarketId) -> Result<Arc<Market>, Error> {
        self.registry.market(market_id)
    }

    pub fn market_by_handle(&self, handle: &MarketHandle) -> Option<Arc<Market>> {
        self.registry.market_by_handle(handle)
    }

    pub fn place_bet(
        &self,
        bettor: Address,
        market_id: MarketId,
        outcome: Outcome,
        amount: Amount,
    ) -> Result<BetRecord, Error> {
        self.registry.place_bet(bettor, market_id, outcome, amount)
    }

    pub fn close_market(
        &self,
        caller: &Address,
        market_id: MarketId,
    ) -> Result<(), Error> {
        self.registry.close_market(caller, market_id)
    }

    pub fn resolve_market(
        &self,
        caller: &Address,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<Proposal, Error> {
        self.registry.resolve_market(caller, market_id, outcome)
    }

    pub fn dispute_resolution(
        &self,
        disputer: Address,
        market_id: MarketId,
        outcome: Outcome,
        stake: Amount,
    ) -> Result<DisputeVote, Error> {
        self.registry
            .dispute_resolution(disputer, market_id, outcome, stake)
    }

    pub fn finalize_resolution(
        &self,
        market_id: MarketId,
    ) -> Result<Resolution, Error> {
        self.registry.finalize_resolution(market_id)
    }

    pub fn claim_winnings(
        &self,
        claimant: &Address,
        market_id: MarketId,
    ) -> Result<Amount, Error> {
        self.registry.claim_winnings(claimant, market_id)
    }

    // Multi-market

    pub fn batch_bet(
        &self,
        bettor: Address,
        market_ids: &[MarketId],
        outcomes: &[Outcome],
        amounts: &[Amount],
    ) -> Result<Vec<BetRecord>, Error> {
        let legs = BetLeg::zip(market_ids, outcomes, amounts)?;
        self.coordinator.batch_bet(bettor, &legs)
    }

    pub fn batch_claim(
        &self,
        claimant: &Address,
        market_ids: &[MarketId],
    ) -> Result<Amount, Error> {
        self.coordinator.batch_claim(claimant, market_ids)
    }

    pub fn create_parlay(
        &self,
        bettor: Address,
        market_ids: &[MarketId],
        outcomes: &[Outcome],
        stake: ParlayStake,
    ) -> Result<ParlayId, Error> {
        self.coordinator
            .create_parlay(bettor, market_ids, outcomes, stake)
    }

    pub fn check_parlay_status(
        &self,
        id: &ParlayId,
    ) -> Result<ParlayStatus, Error> {
        self.coordinator.check_parlay_status(id)
    }

    pub fn claim_parlay(
        &self,
        caller: &Address,
        id: &ParlayId,
    ) -> Result<Amount, Error> {
        self.coordinator.claim_parlay(caller, id)
    }

    pub fn user_parlays(&self, bettor: &Address) -> Vec<ParlayId> {
        self.coordinator.user_parlays(bettor)
    }

    pub fn parlay_details(&self, id: &ParlayId) -> Result<ParlayTicket, Error> {
        self.coordinator.parlay_details(id)
    }

    // Queries

    pub fn current_odds(&self, market_id: MarketId) -> Result<Vec<u64>, Error> {
        self.queries.current_odds(market_id)
    }

    pub fn total_bets(&self, market_id: MarketId) -> Result<u64, Error> {
        self.queries.total_bets(market_id)
    }

    pub fn total_volume(&self, market_id: MarketId) -> Result<Amount, Error> {
        self.queries.total_volume(market_id)
    }

    pub fn outcome_pool(
        &self,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<Amount, Error> {
        self.queries.outcome_pool(market_id, outcome)
    }

    pub fn market_summary(
        &self,
        market_id: MarketId,
    ) -> Result<MarketSummary, Error> {
        self.queries.market_summary(market_id)
    }

    pub fn batch_stats(
        &self,
        market_ids: &[MarketId],
    ) -> Result<BatchStats, Error> {
        self.queries.batch_stats(market_ids)
    }

    pub fn portfolio(
        &self,
        market_ids: &[MarketId],
        user: &Address,
    ) -> Result<usize, Error> {
        self.queries.portfolio(market_ids, user)
    }

    pub fn dispute_votes(
        &self,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<Amount, Error> {
        self.queries.dispute_votes(market_id, outcome)
    }

    pub fn market_handle(&self, index: u64) -> Option<MarketHandle> {
        self.queries.market_handle(index)
    }

    pub fn total_markets(&self) -> u64 {
        self.queries.total_markets()
    }

    pub fn protocol_volume(&self) -> Amount {
        self.queries.protocol_volume()
    }
}

//! Read-only aggregation over markets.
//!
//! Nothing here mutates engine state. Figures that must agree with each
//! other (odds, volume, counts of one market) are taken from a single
//! [`MarketSnapshot`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    state::{
        MarketRegistry,
        dispute::DisputeVote,
        error::Error,
        ledger::BetRecord,
        markets::{MarketInfo, MarketSnapshot},
    },
    types::{Address, Amount, MarketHandle, MarketId, Outcome, Timestamp},
};

/// Per-market bet counts and volumes, in the order requested
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BatchStats {
    pub bet_counts: Vec<u64>,
    pub volumes: Vec<Amount>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MarketSummary {
    pub info: MarketInfo,
    pub snapshot: MarketSnapshot,
    pub odds: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct QueryService {
    registry: Arc<MarketRegistry>,
}

impl QueryService {
    pub fn new(registry: Arc<MarketRegistry>) -> Self {
        Self { registry }
    }

    pub fn snapshot(&self, market_id: MarketId) -> Result<MarketSnapshot, Error> {
        Ok(self.registry.market(market_id)?.snapshot())
    }

    /// Implied odds per outcome, scaled by `ODDS_SCALE`
    pub fn current_odds(&self, market_id: MarketId) -> Result<Vec<u64>, Error> {
        Ok(self.snapshot(market_id)?.odds())
    }

    pub fn total_bets(&self, market_id: MarketId) -> Result<u64, Error> {
        Ok(self.registry.market(market_id)?.pool().count())
    }

    pub fn total_volume(&self, market_id: MarketId) -> Result<Amount, Error> {
        Ok(self.registry.market(market_id)?.pool().total_volume())
    }

    pub fn outcome_pool(
        &self,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<Amount, Error> {
        let market = self.registry.market(market_id)?;
        market.pool().read(outcome).ok_or(Error::InvalidOutcome {
            outcome,
            num_outcomes: market.num_outcomes(),
        })
    }

    pub fn market_info(&self, market_id: MarketId) -> Result<MarketInfo, Error> {
        Ok(self.registry.market(market_id)?.info().clone())
    }

    pub fn market_summary(
        &self,
        market_id: MarketId,
    ) -> Result<MarketSummary, Error> {
        let market = self.registry.market(market_id)?;
        let snapshot = market.snapshot();
        Ok(MarketSummary {
            info: market.info().clone(),
            odds: snapshot.odds(),
            snapshot,
        })
    }

    pub fn batch_stats(
        &self,
        market_ids: &[MarketId],
    ) -> Result<BatchStats, Error> {
        let mut stats = BatchStats::default();
        for market_id in market_ids {
            let pools = self.snapshot(*market_id)?.pools;
            stats.bet_counts.push(pools.count);
            stats.volumes.push(pools.total_volume);
        }
        Ok(stats)
    }

    /// How many of `market_ids` `user` holds a position in
    pub fn portfolio(
        &self,
        market_ids: &[MarketId],
        user: &Address,
    ) -> Result<usize, Error> {
        let mut tracked = 0;
        for market_id in market_ids {
            if self.registry.market(*market_id)?.ledger().has_position(user) {
                tracked += 1;
            }
        }
        Ok(tracked)
    }

    /// Stake per outcome held by `user`, parlay legs included
    pub fn position(
        &self,
        market_id: MarketId,
        user: &Address,
    ) -> Result<Vec<Amount>, Error> {
        let market = self.registry.market(market_id)?;
        Ok(market.ledger().position(user, market.num_outcomes()))
    }

    pub fn bets_of(
        &self,
        market_id: MarketId,
        user: &Address,
    ) -> Result<Vec<BetRecord>, Error> {
        Ok(self.registry.market(market_id)?.ledger().records_for(user))
    }

    pub fn dispute_votes(
        &self,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<Amount, Error> {
        let market = self.registry.market(market_id)?;
        if outcome >= market.num_outcomes() {
            return Err(Error::InvalidOutcome {
                outcome,
                num_outcomes: market.num_outcomes(),
            });
        }
        Ok(market.dispute_votes(outcome))
    }

    pub fn dispute_records(
        &self,
        market_id: MarketId,
    ) -> Result<Vec<DisputeVote>, Error> {
        Ok(self.registry.market(market_id)?.dispute_records())
    }

    /// Deadline of the market's open dispute, if it has one
    pub fn dispute_deadline(
        &self,
        market_id: MarketId,
    ) -> Result<Option<Timestamp>, Error> {
        Ok(self.snapshot(market_id)?.dispute_deadline)
    }

    pub fn claimable(
        &self,
        market_id: MarketId,
        user: &Address,
    ) -> Result<Amount, Error> {
        self.registry
            .market(market_id)?
            .claimable(user, self.registry.policy())
    }

    pub fn total_markets(&self) -> u64 {
        self.registry.total_markets()
    }

    pub fn market_handle(&self, index: u64) -> Option<MarketHandle> {
        self.registry.market_handle(index)
    }

    /// Volume across every market
    pub fn protocol_volume(&self) -> Amount {
        self.registry.total_volume()
    }
}

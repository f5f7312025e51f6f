//! Batch bets and parlays across several markets.
//!
//! A multi-leg operation commits in two phases. Each leg is first checked
//! against its market without holding any gate beyond the check. Then the
//! gates of all distinct markets are taken shared, in ascending id order,
//! every leg is checked again and reserved against its accumulator, and
//! only once every reservation has succeeded are the reservations committed
//! and the ledger records appended. A failing leg drops the reservations
//! made so far, which releases them, so no pool observes a partial batch.
//!
//! Holding the gates shared does not serialize concurrent batches or single
//! bets on the same markets; it only keeps lifecycle transitions out until
//! the commit is done.

use std::sync::Arc;

use itertools::Itertools as _;
use parking_lot::RwLockReadGuard;
use serde::{Deserialize, Serialize};

use crate::{
    math::payout::SettledPool,
    state::{
        Event, MarketRegistry,
        error::{Error, InvalidParameters},
        ledger::{BetDraft, BetKind, BetRecord},
        markets::{Market, Phase},
        parlay::{ParlayBook, ParlayStake, ParlayStatus, ParlayTicket},
        pool::Reservation,
    },
    types::{Address, Amount, MarketId, Outcome, ParlayId, hashes},
};

/// One leg of a multi-market bet
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BetLeg {
    pub market_id: MarketId,
    pub outcome: Outcome,
    pub amount: Amount,
}

impl BetLeg {
    /// Zip parallel market, outcome and amount lists into legs.
    pub fn zip(
        market_ids: &[MarketId],
        outcomes: &[Outcome],
        amounts: &[Amount],
    ) -> Result<Vec<Self>, InvalidParameters> {
        if market_ids.is_empty() {
            return Err(InvalidParameters::NoLegs);
        }
        for (what, got) in
            [("outcomes", outcomes.len()), ("amounts", amounts.len())]
        {
            if got != market_ids.len() {
                return Err(InvalidParameters::LengthMismatch {
                    what,
                    expected: market_ids.len(),
                    got,
                });
            }
        }
        Ok(itertools::izip!(market_ids, outcomes, amounts)
            .map(|(&market_id, &outcome, &amount)| Self {
                market_id,
                outcome,
                amount,
            })
            .collect())
    }
}

#[derive(Debug)]
pub struct MultiMarketCoordinator {
    registry: Arc<MarketRegistry>,
    parlays: ParlayBook,
}

impl MultiMarketCoordinator {
    pub fn new(registry: Arc<MarketRegistry>) -> Self {
        Self {
            registry,
            parlays: ParlayBook::default(),
        }
    }

    pub fn registry(&self) -> &Arc<MarketRegistry> {
        &self.registry
    }

    fn legs_markets(&self, legs: &[BetLeg]) -> Result<Vec<Arc<Market>>, Error> {
        legs.iter()
            .enumerate()
            .map(|(index, leg)| {
                self.registry
                    .market(leg.market_id)
                    .map_err(|err| err.at_leg(index))
            })
            .collect()
    }

    /// Apply every leg or none of them.
    fn commit_legs(
        &self,
        bettor: Address,
        legs: &[BetLeg],
        kind: BetKind,
    ) -> Result<Vec<BetRecord>, Error> {
        let now = self.registry.now();
        let markets = self.legs_markets(legs)?;
        // Optimistic pass, one gate at a time
        for (index, (leg, market)) in legs.iter().zip(&markets).enumerate() {
            market
                .check_bet(leg.outcome, leg.amount, now)
                .map_err(|err| err.at_leg(index))?;
        }
        let gates: Vec<(MarketId, RwLockReadGuard<'_, Phase>)> = markets
            .iter()
            .sorted_by_key(|market| market.id())
            .dedup_by(|a, b| a.id() == b.id())
            .map(|market| (market.id(), market.gate()))
            .collect();
        let mut reservations: Vec<Reservation<'_>> =
            Vec::with_capacity(legs.len());
        for (index, (leg, market)) in legs.iter().zip(&markets).enumerate() {
            let Some((_, phase)) =
                gates.iter().find(|(id, _)| *id == leg.market_id)
            else {
                return Err(Error::MarketNotFound { id: leg.market_id }
                    .at_leg(index));
            };
            market
                .validate_bet(phase, leg.outcome, leg.amount, now)
                .map_err(|err| err.at_leg(index))?;
            let reservation = market
                .reserve_bet(leg.outcome, leg.amount)
                .map_err(|err| err.at_leg(index))?;
            reservations.push(reservation);
        }
        let sequencer = self.registry.sequencer();
        let events = self.registry.events();
        let records = reservations
            .into_iter()
            .zip(legs.iter().zip(&markets))
            .map(|(reservation, (leg, market))| {
                reservation.commit();
                let record = market.ledger().append(sequencer, BetDraft {
                    bettor,
                    outcome: leg.outcome,
                    amount: leg.amount,
                    timestamp: now,
                    kind,
                });
                events.emit(Event::BetPlaced {
                    market_id: leg.market_id,
                    bettor,
                    outcome: leg.outcome,
                    amount: leg.amount,
                });
                record
            })
            .collect();
        drop(gates);
        Ok(records)
    }

    /// Place several bets atomically. Legs may repeat a market.
    pub fn batch_bet(
        &self,
        bettor: Address,
        legs: &[BetLeg],
    ) -> Result<Vec<BetRecord>, Error> {
        if legs.is_empty() {
            return Err(InvalidParameters::NoLegs.into());
        }
        let total_amount = legs
            .iter()
            .try_fold(0u64, |acc, leg| acc.checked_add(leg.amount))
            .ok_or(Error::Overflow)?;
        let records = self
            .commit_legs(bettor, legs, BetKind::Direct)
            .inspect_err(|err| {
                tracing::warn!(%bettor, legs = legs.len(), %err, "batch bet rejected")
            })?;
        let market_ids: Vec<MarketId> =
            legs.iter().map(|leg| leg.market_id).collect();
        tracing::debug!(%bettor, legs = legs.len(), total_amount, "batch bet placed");
        self.registry.events().emit(Event::BatchBetPlaced {
            bettor,
            market_ids,
            total_amount,
        });
        Ok(records)
    }

    /// Open a parlay ticket over distinct markets.
    pub fn create_parlay(
        &self,
        bettor: Address,
        market_ids: &[MarketId],
        outcomes: &[Outcome],
        stake: ParlayStake,
    ) -> Result<ParlayId, Error> {
        if market_ids.is_empty() {
            return Err(InvalidParameters::NoLegs.into());
        }
        if outcomes.len() != market_ids.len() {
            return Err(InvalidParameters::LengthMismatch {
                what: "outcomes",
                expected: market_ids.len(),
                got: outcomes.len(),
            }
            .into());
        }
        if let Some(market_id) = market_ids.iter().duplicates().next() {
            return Err(InvalidParameters::DuplicateMarket {
                market_id: *market_id,
            }
            .into());
        }
        let leg_stakes = stake.leg_stakes(market_ids.len())?;
        let total_stake = leg_stakes
            .iter()
            .try_fold(0u64, |acc, stake| acc.checked_add(*stake))
            .ok_or(Error::Overflow)?;
        let legs = BetLeg::zip(market_ids, outcomes, &leg_stakes)?;
        let sequence = self.registry.sequencer().next();
        let id = hashes::parlay_id(&bettor, market_ids, outcomes, sequence);
        self.commit_legs(bettor, &legs, BetKind::ParlayLeg(id))
            .inspect_err(|err| {
                tracing::warn!(%bettor, legs = legs.len(), %err, "parlay rejected")
            })?;
        let ticket = ParlayTicket {
            id,
            bettor,
            market_ids: market_ids.to_vec(),
            outcomes: outcomes.to_vec(),
            leg_stakes,
            total_stake,
            claimed: false,
            created_at: self.registry.now(),
        };
        self.parlays.insert(ticket);
        tracing::info!(parlay_id = %id, %bettor, total_stake, "parlay created");
        self.registry.events().emit(Event::ParlayCreated {
            parlay_id: id,
            bettor,
            market_ids: market_ids.to_vec(),
            total_stake,
        });
        Ok(id)
    }

    fn status_of(&self, ticket: &ParlayTicket) -> Result<ParlayStatus, Error> {
        let mut settled = Vec::with_capacity(ticket.market_ids.len());
        let mut all_won = true;
        for (market_id, outcome) in ticket.market_ids.iter().zip(&ticket.outcomes)
        {
            let market = self.registry.market(*market_id)?;
            let Some((winning_outcome, pool)) = market.settled_pool() else {
                return Ok(ParlayStatus::default());
            };
            all_won &= winning_outcome == *outcome;
            settled.push(pool);
        }
        let payout = if all_won {
            self.payout_of(ticket.total_stake, &settled)?
        } else {
            0
        };
        Ok(ParlayStatus {
            all_resolved: true,
            all_won,
            payout,
        })
    }

    fn payout_of(
        &self,
        stake: Amount,
        legs: &[SettledPool],
    ) -> Result<Amount, Error> {
        Ok(self.registry.policy().parlay_payout(stake, legs)?)
    }

    fn first_unresolved(
        &self,
        ticket: &ParlayTicket,
    ) -> Result<Option<MarketId>, Error> {
        for market_id in &ticket.market_ids {
            if self.registry.market(*market_id)?.winning_outcome().is_none() {
                return Ok(Some(*market_id));
            }
        }
        Ok(None)
    }

    pub fn check_parlay_status(
        &self,
        id: &ParlayId,
    ) -> Result<ParlayStatus, Error> {
        let ticket = self.parlays.get(id)?;
        self.status_of(&ticket)
    }

    /// Pay out a winning ticket to its bettor, exactly once.
    pub fn claim_parlay(
        &self,
        caller: &Address,
        id: &ParlayId,
    ) -> Result<Amount, Error> {
        let ticket = self.parlays.get(id)?;
        if ticket.bettor != *caller {
            return Err(Error::Unauthorized {
                operation: "claim the parlay",
            });
        }
        if let Some(market_id) = self.first_unresolved(&ticket)? {
            return Err(Error::NotResolved { market_id });
        }
        let status = self.status_of(&ticket)?;
        if !status.all_won {
            return Err(Error::NothingToClaim);
        }
        self.parlays.mark_claimed(id)?;
        tracing::info!(parlay_id = %id, bettor = %caller, payout = status.payout, "parlay claimed");
        self.registry.events().emit(Event::ParlayClaimed {
            parlay_id: *id,
            bettor: *caller,
            payout: status.payout,
        });
        Ok(status.payout)
    }

    pub fn user_parlays(&self, bettor: &Address) -> Vec<ParlayId> {
        self.parlays.ids_for(bettor)
    }

    pub fn parlay_details(&self, id: &ParlayId) -> Result<ParlayTicket, Error> {
        self.parlays.get(id)
    }

    pub fn total_parlays(&self) -> usize {
        self.parlays.len()
    }

    /// Claim winnings on every listed market that owes `claimant` something.
    ///
    /// Unknown markets fail the whole call before anything is claimed.
    /// Markets that are unresolved, already claimed, or owe nothing are
    /// skipped. Fails with `NothingToClaim` if no market paid out.
    pub fn batch_claim(
        &self,
        claimant: &Address,
        market_ids: &[MarketId],
    ) -> Result<Amount, Error> {
        let markets: Vec<Arc<Market>> = market_ids
            .iter()
            .unique()
            .map(|market_id| self.registry.market(*market_id))
            .collect::<Result<_, _>>()?;
        let mut total: Amount = 0;
        let mut paid = 0usize;
        for market in markets {
            match self.registry.claim_winnings(claimant, market.id()) {
                Ok(amount) => {
                    total = total.saturating_add(amount);
                    paid += 1;
                }
                Err(
                    Error::NotResolved { .. }
                    | Error::NothingToClaim
                    | Error::AlreadyClaimed,
                ) => {}
                Err(err) => return Err(err),
            }
        }
        if paid == 0 {
            return Err(Error::NothingToClaim);
        }
        tracing::debug!(%claimant, markets = paid, total, "batch claim");
        Ok(total)
    }
}

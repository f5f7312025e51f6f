//! Parlay tickets.
//!
//! A ticket is immutable apart from its `claimed` flag, which flips from
//! `false` to `true` exactly once.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    state::error::{Error, InvalidParameters},
    types::{Address, Amount, MarketId, Outcome, ParlayId, Timestamp},
};

/// How a parlay's stake is spread over its legs
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParlayStake {
    /// Total stake, split evenly. The first legs absorb the remainder, one
    /// base unit each.
    Equal(Amount),
    /// Explicit stake per leg
    Split(Vec<Amount>),
}

impl ParlayStake {
    /// Stake per leg for a parlay of `legs` legs.
    pub fn leg_stakes(&self, legs: usize) -> Result<Vec<Amount>, Error> {
        if legs == 0 {
            return Err(InvalidParameters::NoLegs.into());
        }
        match self {
            Self::Equal(total) => {
                let legs_u64 = legs as u64;
                let (share, remainder) = (total / legs_u64, total % legs_u64);
                Ok((0..legs_u64)
                    .map(|leg| share + u64::from(leg < remainder))
                    .collect())
            }
            Self::Split(stakes) if stakes.len() != legs => {
                Err(InvalidParameters::LengthMismatch {
                    what: "leg stakes",
                    expected: legs,
                    got: stakes.len(),
                }
                .into())
            }
            Self::Split(stakes) => Ok(stakes.clone()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParlayTicket {
    pub id: ParlayId,
    pub bettor: Address,
    pub market_ids: Vec<MarketId>,
    pub outcomes: Vec<Outcome>,
    pub leg_stakes: Vec<Amount>,
    pub total_stake: Amount,
    pub claimed: bool,
    pub created_at: Timestamp,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParlayStatus {
    pub all_resolved: bool,
    pub all_won: bool,
    /// Non-zero only when `all_won`
    pub payout: Amount,
}

#[derive(Debug)]
struct StoredTicket {
    ticket: ParlayTicket,
    claimed: AtomicBool,
}

impl StoredTicket {
    fn view(&self) -> ParlayTicket {
        ParlayTicket {
            claimed: self.claimed.load(Ordering::Acquire),
            ..self.ticket.clone()
        }
    }
}

#[derive(Debug, Default)]
struct Tickets {
    by_id: HashMap<ParlayId, Arc<StoredTicket>>,
    by_bettor: HashMap<Address, Vec<ParlayId>>,
}

#[derive(Debug, Default)]
pub struct ParlayBook {
    tickets: RwLock<Tickets>,
}

impl ParlayBook {
    pub fn insert(&self, ticket: ParlayTicket) {
        let id = ticket.id;
        let bettor = ticket.bettor;
        let stored = Arc::new(StoredTicket {
            claimed: AtomicBool::new(ticket.claimed),
            ticket,
        });
        let mut tickets = self.tickets.write();
        tickets.by_id.insert(id, stored);
        tickets.by_bettor.entry(bettor).or_default().push(id);
    }

    pub fn get(&self, id: &ParlayId) -> Result<ParlayTicket, Error> {
        self.tickets
            .read()
            .by_id
            .get(id)
            .map(|stored| stored.view())
            .ok_or(Error::ParlayNotFound { id: *id })
    }

    /// Ticket ids held by `bettor`, oldest first
    pub fn ids_for(&self, bettor: &Address) -> Vec<ParlayId> {
        self.tickets
            .read()
            .by_bettor
            .get(bettor)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tickets.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flip the ticket's `claimed` flag. Only the first caller succeeds.
    pub fn mark_claimed(&self, id: &ParlayId) -> Result<(), Error> {
        let stored = self
            .tickets
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or(Error::ParlayNotFound { id: *id })?;
        stored
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyClaimed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: u8, bettor: u8) -> ParlayTicket {
        ParlayTicket {
            id: ParlayId([id; 32]),
            bettor: Address::new([bettor; 20]),
            market_ids: vec![MarketId(0), MarketId(1)],
            outcomes: vec![0, 1],
            leg_stakes: vec![5, 5],
            total_stake: 10,
            claimed: false,
            created_at: 0,
        }
    }

    #[test]
    fn test_equal_stake_spreads_remainder() {
        assert_eq!(ParlayStake::Equal(10).leg_stakes(3).unwrap(), vec![4, 3, 3]);
        assert_eq!(ParlayStake::Equal(9).leg_stakes(3).unwrap(), vec![3, 3, 3]);
        assert!(matches!(
            ParlayStake::Equal(9).leg_stakes(0),
            Err(Error::InvalidParameters(InvalidParameters::NoLegs))
        ));
    }

    #[test]
    fn test_split_stake_must_match_legs() {
        assert!(matches!(
            ParlayStake::Split(vec![1, 2]).leg_stakes(3),
            Err(Error::InvalidParameters(
                InvalidParameters::LengthMismatch {
                    expected: 3,
                    got: 2,
                    ..
                }
            ))
        ));
        assert_eq!(
            ParlayStake::Split(vec![1, 2, 3]).leg_stakes(3).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_claim_flips_once() {
        let book = ParlayBook::default();
        book.insert(ticket(1, 7));
        let id = ParlayId([1; 32]);
        assert!(!book.get(&id).unwrap().claimed);
        book.mark_claimed(&id).unwrap();
        assert!(book.get(&id).unwrap().claimed);
        assert!(matches!(book.mark_claimed(&id), Err(Error::AlreadyClaimed)));
        assert!(matches!(
            book.mark_claimed(&ParlayId([2; 32])),
            Err(Error::ParlayNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let book = ParlayBook::default();
        book.insert(ticket(1, 7));
        let id = ParlayId([1; 32]);
        let winners = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if book.mark_claimed(&id).is_ok() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(winners.into_inner(), 1);
    }

    #[test]
    fn test_tickets_indexed_by_bettor() {
        let book = ParlayBook::default();
        book.insert(ticket(1, 7));
        book.insert(ticket(2, 8));
        book.insert(ticket(3, 7));
        assert_eq!(book.ids_for(&Address::new([7; 20])), vec![
            ParlayId([1; 32]),
            ParlayId([3; 32])
        ]);
        assert!(book.ids_for(&Address::new([9; 20])).is_empty());
        assert_eq!(book.len(), 3);
    }
}

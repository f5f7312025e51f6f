//! Payout policies.
//!
//! The engine only decides *who* is paid; *how much* is delegated to a
//! [`PayoutPolicy`], selected through configuration.

use serde::{Deserialize, Serialize};

use crate::{
    math::units::{self, Rounding, UnitsError},
    types::Amount,
};

/// Final pool figures of one resolved market, as seen by a payout policy
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SettledPool {
    /// Amount staked on the winning outcome
    pub winning_pool: Amount,
    /// Amount staked on all outcomes
    pub total_volume: Amount,
}

pub trait PayoutPolicy: Send + Sync + std::fmt::Debug {
    /// Payout owed for `stake` placed on the winning outcome of `pool`.
    fn single_payout(
        &self,
        stake: Amount,
        pool: SettledPool,
    ) -> Result<Amount, UnitsError>;

    /// Payout owed for a winning parlay of `stake` over `legs`.
    fn parlay_payout(
        &self,
        stake: Amount,
        legs: &[SettledPool],
    ) -> Result<Amount, UnitsError>;
}

/// Pari-mutuel split: the whole pool, less a protocol fee, is shared among
/// winning stakes in proportion to their size.
///
/// Parlays compound the per-leg decimal odds `net_volume / winning_pool`
/// over the ticket's total stake.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Parimutuel {
    pub fee_bps: u16,
}

impl Parimutuel {
    pub const fn new(fee_bps: u16) -> Self {
        Self { fee_bps }
    }

    /// Pool left for winners once the fee is taken. Fees round up.
    pub fn net_volume(&self, total_volume: Amount) -> Result<Amount, UnitsError> {
        let fee = units::bps_of(total_volume, self.fee_bps, Rounding::Up)?;
        Ok(total_volume.saturating_sub(fee))
    }
}

impl PayoutPolicy for Parimutuel {
    fn single_payout(
        &self,
        stake: Amount,
        pool: SettledPool,
    ) -> Result<Amount, UnitsError> {
        if pool.winning_pool == 0 {
            return Ok(0);
        }
        let net = self.net_volume(pool.total_volume)?;
        units::mul_div(stake, net, pool.winning_pool, Rounding::Down)
    }

    fn parlay_payout(
        &self,
        stake: Amount,
        legs: &[SettledPool],
    ) -> Result<Amount, UnitsError> {
        let mut payout = stake;
        for leg in legs {
            if leg.winning_pool == 0 {
                return Ok(0);
            }
            let net = self.net_volume(leg.total_volume)?;
            payout =
                units::mul_div(payout, net, leg.winning_pool, Rounding::Down)?;
        }
        Ok(payout)
    }
}

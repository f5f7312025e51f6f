//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::types::Amount;

/// Smallest outcome count a market may have
pub const MIN_MARKET_OUTCOMES: u32 = 2;
/// Largest outcome count a market may have
pub const MAX_MARKET_OUTCOMES: u32 = 256;

#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum deposit, in base units, to create a market
    #[cfg_attr(feature = "clap", arg(long, default_value_t = EngineConfig::DEFAULT_MIN_CREATION_DEPOSIT))]
    pub min_creation_deposit: Amount,
    /// Minimum stake, in base units, to back an outcome in a dispute
    #[cfg_attr(feature = "clap", arg(long, default_value_t = EngineConfig::DEFAULT_MIN_DISPUTE_STAKE))]
    pub min_dispute_stake: Amount,
    /// Length of the dispute window after a proposed resolution.
    /// Zero resolves markets immediately.
    #[cfg_attr(feature = "clap", arg(long, default_value_t = EngineConfig::DEFAULT_DISPUTE_WINDOW_SECS))]
    pub dispute_window_secs: u64,
    /// Upper bound on outcomes per market
    #[cfg_attr(feature = "clap", arg(long, default_value_t = MAX_MARKET_OUTCOMES))]
    pub max_outcomes: u32,
    /// Protocol fee taken from each market's pool at payout, in basis points
    #[cfg_attr(feature = "clap", arg(long, default_value_t = 0))]
    pub fee_bps: u16,
    /// Notifications buffered per subscriber before it starts lagging
    #[cfg_attr(feature = "clap", arg(long, default_value_t = EngineConfig::DEFAULT_EVENT_CAPACITY))]
    pub event_capacity: usize,
}

impl EngineConfig {
    /// 0.01 in 18-decimal base units
    pub const DEFAULT_MIN_CREATION_DEPOSIT: Amount = 10_000_000_000_000_000;
    /// 0.01 in 18-decimal base units
    pub const DEFAULT_MIN_DISPUTE_STAKE: Amount = 10_000_000_000_000_000;
    pub const DEFAULT_DISPUTE_WINDOW_SECS: u64 = 24 * 60 * 60;
    pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

    /// Configuration with no dispute window, so resolutions are final.
    pub fn without_disputes() -> Self {
        Self {
            dispute_window_secs: 0,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_creation_deposit: Self::DEFAULT_MIN_CREATION_DEPOSIT,
            min_dispute_stake: Self::DEFAULT_MIN_DISPUTE_STAKE,
            dispute_window_secs: Self::DEFAULT_DISPUTE_WINDOW_SECS,
            max_outcomes: MAX_MARKET_OUTCOMES,
            fee_bps: 0,
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"dispute_window_secs": 60, "fee_bps": 150}"#)
                .unwrap();
        assert_eq!(config.dispute_window_secs, 60);
        assert_eq!(config.fee_bps, 150);
        assert_eq!(
            config.min_dispute_stake,
            EngineConfig::DEFAULT_MIN_DISPUTE_STAKE
        );
        assert_eq!(config.max_outcomes, MAX_MARKET_OUTCOMES);
    }
}

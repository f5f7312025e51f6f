//! JSON scenarios: a start time, optional engine settings, and a list of
//! steps replayed against an engine driven by a manual clock.
//!
//! Participants are named; each name maps to a fixed address.

use std::{path::Path, sync::Arc};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use wager_settlement::{
    Engine,
    clock::ManualClock,
    config::EngineConfig,
    state::{
        MarketSummary, ParlayStake, ParlayStatus, ParlayTicket,
        markets::MarketParams,
    },
    types::{
        Address, Amount, MarketId, Outcome, ParlayId, Timestamp, hashes,
    },
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    CreateMarket {
        creator: String,
        question: String,
        num_outcomes: u32,
        closing_time: Timestamp,
        deposit: Amount,
    },
    PlaceBet {
        bettor: String,
        market: MarketId,
        outcome: Outcome,
        amount: Amount,
    },
    BatchBet {
        bettor: String,
        markets: Vec<MarketId>,
        outcomes: Vec<Outcome>,
        amounts: Vec<Amount>,
    },
    CreateParlay {
        bettor: String,
        markets: Vec<MarketId>,
        outcomes: Vec<Outcome>,
        stake: ParlayStake,
    },
    CloseMarket {
        caller: String,
        market: MarketId,
    },
    ResolveMarket {
        caller: String,
        market: MarketId,
        outcome: Outcome,
    },
    Dispute {
        disputer: String,
        market: MarketId,
        outcome: Outcome,
        stake: Amount,
    },
    Finalize {
        market: MarketId,
    },
    ClaimWinnings {
        claimant: String,
        market: MarketId,
    },
    BatchClaim {
        claimant: String,
        markets: Vec<MarketId>,
    },
    /// `parlay` counts tickets created earlier in the scenario, from zero
    ClaimParlay {
        caller: String,
        parlay: usize,
    },
    Advance {
        secs: u64,
    },
    SetTime {
        now: Timestamp,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub start_time: Timestamp,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening scenario {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("parsing scenario {}", path.display()))
    }
}

/// Address a participant name stands for
pub fn actor(name: &str) -> Address {
    let digest = hashes::hash(name.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[..20]);
    Address::new(bytes)
}

#[derive(Debug, Serialize)]
pub struct ParlayReport {
    pub ticket: ParlayTicket,
    pub status: ParlayStatus,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub steps_applied: usize,
    pub steps_rejected: usize,
    pub final_time: Timestamp,
    pub protocol_volume: Amount,
    pub markets: Vec<MarketSummary>,
    pub parlays: Vec<ParlayReport>,
}

pub struct Runner {
    engine: Engine,
    clock: Arc<ManualClock>,
    parlays: Vec<ParlayId>,
}

impl Runner {
    pub fn new(config: EngineConfig, start_time: Timestamp) -> Self {
        let clock = Arc::new(ManualClock::new(start_time));
        Self {
            engine: Engine::new(config, clock.clone()),
            clock,
            parlays: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn parlay(&self, index: usize) -> anyhow::Result<ParlayId> {
        self.parlays.get(index).copied().with_context(|| {
            format!("scenario created only {} parlays", self.parlays.len())
        })
    }

    pub fn apply(&mut self, step: &Step) -> anyhow::Result<()> {
        let engine = &self.engine;
        match step {
            Step::CreateMarket {
                creator,
                question,
                num_outcomes,
                closing_time,
                deposit,
            } => {
                engine.create_market(actor(creator), MarketParams {
                    question: question.clone(),
                    num_outcomes: *num_outcomes,
                    closing_time: *closing_time,
                    deposit: *deposit,
                })?;
            }
            Step::PlaceBet {
                bettor,
                market,
                outcome,
                amount,
            } => {
                engine.place_bet(actor(bettor), *market, *outcome, *amount)?;
            }
            Step::BatchBet {
                bettor,
                markets,
                outcomes,
                amounts,
            } => {
                engine.batch_bet(actor(bettor), markets, outcomes, amounts)?;
            }
            Step::CreateParlay {
                bettor,
                markets,
                outcomes,
                stake,
            } => {
                let id = engine.create_parlay(
                    actor(bettor),
                    markets,
                    outcomes,
                    stake.clone(),
                )?;
                self.parlays.push(id);
            }
            Step::CloseMarket { caller, market } => {
                engine.close_market(&actor(caller), *market)?;
            }
            Step::ResolveMarket {
                caller,
                market,
                outcome,
            } => {
                engine.resolve_market(&actor(caller), *market, *outcome)?;
            }
            Step::Dispute {
                disputer,
                market,
                outcome,
                stake,
            } => {
                engine.dispute_resolution(
                    actor(disputer),
                    *market,
                    *outcome,
                    *stake,
                )?;
            }
            Step::Finalize { market } => {
                engine.finalize_resolution(*market)?;
            }
            Step::ClaimWinnings { claimant, market } => {
                engine.claim_winnings(&actor(claimant), *market)?;
            }
            Step::BatchClaim { claimant, markets } => {
                engine.batch_claim(&actor(claimant), markets)?;
            }
            Step::ClaimParlay { caller, parlay } => {
                let id = self.parlay(*parlay)?;
                self.engine.claim_parlay(&actor(caller), &id)?;
            }
            Step::Advance { secs } => {
                self.clock.advance(*secs);
            }
            Step::SetTime { now } => {
                self.clock.set(*now);
            }
        }
        Ok(())
    }

    /// Apply every step. Rejected steps are logged and skipped unless
    /// `strict`, in which case the first one aborts the run.
    pub fn run(&mut self, steps: &[Step], strict: bool) -> anyhow::Result<Report> {
        let mut rejected = 0;
        for (index, step) in steps.iter().enumerate() {
            match self.apply(step) {
                Ok(()) => tracing::debug!(index, ?step, "step applied"),
                Err(err) if strict => {
                    return Err(err.context(format!("step {index} rejected")));
                }
                Err(err) => {
                    rejected += 1;
                    tracing::warn!(index, ?step, err = %format!("{err:#}"), "step rejected");
                }
            }
        }
        self.report(steps.len() - rejected, rejected)
    }

    pub fn report(
        &self,
        steps_applied: usize,
        steps_rejected: usize,
    ) -> anyhow::Result<Report> {
        let engine = &self.engine;
        let markets = (0..engine.total_markets())
            .map(|index| engine.market_summary(MarketId::new(index)))
            .collect::<Result<_, _>>()?;
        let parlays = self
            .parlays
            .iter()
            .map(|id| -> anyhow::Result<ParlayReport> {
                Ok(ParlayReport {
                    ticket: engine.parlay_details(id)?,
                    status: engine.check_parlay_status(id)?,
                })
            })
            .collect::<anyhow::Result<_>>()?;
        Ok(Report {
            steps_applied,
            steps_rejected,
            final_time: engine.registry().now(),
            protocol_volume: engine.protocol_volume(),
            markets,
            parlays,
        })
    }
}

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use wager_settlement::{
    Engine,
    clock::ManualClock,
    config::EngineConfig,
    math::odds::ODDS_SCALE,
    state::{
        Error, Event, MarketState, ParlayStake, Proposal,
        markets::MarketParams,
    },
    types::{Address, Amount, MarketId},
};

/// 1.0 in 18-decimal base units
const ONE: Amount = 1_000_000_000_000_000_000;
const CREATOR: Address = Address::new([0xc0; 20]);

fn bettor(n: u8) -> Address {
    Address::new([n; 20])
}

fn engine(config: EngineConfig) -> (Arc<ManualClock>, Engine) {
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = Engine::new(config, clock.clone());
    (clock, engine)
}

fn market(engine: &Engine, num_outcomes: u32) -> MarketId {
    engine
        .create_market(CREATOR, MarketParams {
            question: format!("{num_outcomes}-way market"),
            num_outcomes,
            closing_time: 2_000,
            deposit: EngineConfig::DEFAULT_MIN_CREATION_DEPOSIT,
        })
        .unwrap()
}

#[test]
fn test_concurrent_bets_are_all_counted() {
    let (_clock, engine) = engine(EngineConfig::default());
    let id = market(&engine, 3);
    let stake = ONE / 20;
    std::thread::scope(|scope| {
        for n in 0..20u8 {
            let engine = &engine;
            scope.spawn(move || {
                engine
                    .place_bet(bettor(n), id, u32::from(n % 3), stake)
                    .unwrap();
            });
        }
    });
    assert_eq!(engine.total_bets(id).unwrap(), 20);
    assert_eq!(engine.total_volume(id).unwrap(), ONE);
    // 7, 7 and 6 bets on outcomes 0, 1, 2
    assert_eq!(engine.current_odds(id).unwrap(), vec![3_500, 3_500, 3_000]);
    let summary = engine.market_summary(id).unwrap();
    assert_eq!(summary.snapshot.ledger_len, 20);
    assert_eq!(
        summary.snapshot.pools.pools.iter().sum::<Amount>(),
        summary.snapshot.pools.total_volume
    );
}

#[test]
fn test_odds_sum_to_scale_within_rounding() {
    let (_clock, engine) = engine(EngineConfig::default());
    let id = market(&engine, 3);
    let uniform = engine.current_odds(id).unwrap();
    assert_eq!(uniform, vec![3_333; 3]);
    engine.place_bet(bettor(1), id, 0, 1).unwrap();
    engine.place_bet(bettor(2), id, 1, 1).unwrap();
    engine.place_bet(bettor(3), id, 2, 1).unwrap();
    let sum: u64 = engine.current_odds(id).unwrap().iter().sum();
    assert!(sum <= ODDS_SCALE && sum >= ODDS_SCALE - 2);
}

#[test]
fn test_bets_and_closes_after_close_are_rejected() {
    let (_clock, engine) = engine(EngineConfig::without_disputes());
    let id = market(&engine, 2);
    engine.close_market(&CREATOR, id).unwrap();
    assert!(matches!(
        engine.place_bet(bettor(1), id, 0, ONE),
        Err(Error::MarketNotOpen { .. })
    ));
    assert!(matches!(
        engine.close_market(&CREATOR, id),
        Err(Error::InvalidState { .. })
    ));
    engine.resolve_market(&CREATOR, id, 0).unwrap();
    assert!(matches!(
        engine.close_market(&CREATOR, id),
        Err(Error::InvalidState {
            state: MarketState::Resolved,
            ..
        })
    ));
}

#[test]
fn test_concurrent_bets_and_close_settle_one_way() {
    let (_clock, engine) = engine(EngineConfig::default());
    let id = market(&engine, 2);
    let accepted = AtomicU64::new(0);
    std::thread::scope(|scope| {
        for n in 0..8u8 {
            let (engine, accepted) = (&engine, &accepted);
            scope.spawn(move || {
                for _ in 0..100 {
                    match engine.place_bet(bettor(n), id, 0, 3) {
                        Ok(_) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(Error::MarketNotOpen { .. }) => {}
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            });
        }
        scope.spawn(|| engine.close_market(&CREATOR, id).unwrap());
    });
    let accepted = accepted.into_inner();
    let snapshot = engine.market_summary(id).unwrap().snapshot;
    assert_eq!(snapshot.state, MarketState::Closed);
    assert_eq!(snapshot.pools.count, accepted);
    assert_eq!(snapshot.ledger_len as u64, accepted);
    assert_eq!(snapshot.pools.total_volume, accepted * 3);
}

#[test]
fn test_bet_notifications_precede_close() {
    for _ in 0..20 {
        let (_clock, engine) = engine(EngineConfig {
            event_capacity: 4_096,
            ..EngineConfig::default()
        });
        let id = market(&engine, 2);
        let mut events = engine.subscribe();
        std::thread::scope(|scope| {
            for n in 0..6u8 {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..50 {
                        match engine.place_bet(bettor(n), id, 1, 2) {
                            Ok(_) | Err(Error::MarketNotOpen { .. }) => {}
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                });
            }
            scope.spawn(|| engine.close_market(&CREATOR, id).unwrap());
        });
        let received: Vec<Event> =
            std::iter::from_fn(|| events.try_recv().ok()).collect();
        let closed_at = received
            .iter()
            .position(|event| matches!(event, Event::MarketClosed { .. }))
            .unwrap();
        assert!(
            received[closed_at..]
                .iter()
                .all(|event| !matches!(event, Event::BetPlaced { .. }))
        );
        let bets_announced = received
            .iter()
            .filter(|event| matches!(event, Event::BetPlaced { .. }))
            .count();
        assert_eq!(bets_announced as u64, engine.total_bets(id).unwrap());
    }
}

#[test]
fn test_rejected_batches_are_never_observed() {
    let (_clock, engine) = engine(EngineConfig::default());
    let m0 = market(&engine, 2);
    let m1 = market(&engine, 2);
    engine.place_bet(bettor(9), m1, 0, u64::MAX - 1).unwrap();
    let done = AtomicBool::new(false);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..2_000 {
                let err = engine
                    .batch_bet(bettor(1), &[m0, m1], &[0, 1], &[5, 5])
                    .unwrap_err();
                assert!(matches!(err, Error::BatchValidationFailed {
                    leg: 1,
                    ..
                }));
            }
            done.store(true, Ordering::Release);
        });
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                assert_eq!(engine.total_volume(m0).unwrap(), 0);
                assert_eq!(engine.total_bets(m0).unwrap(), 0);
                assert_eq!(engine.outcome_pool(m0, 0).unwrap(), 0);
            }
        });
    });
    // A failed batch leaves no headroom behind either
    engine.place_bet(bettor(2), m1, 1, 1).unwrap();
    assert_eq!(engine.total_volume(m1).unwrap(), u64::MAX);
    assert_eq!(engine.market_summary(m0).unwrap().snapshot.ledger_len, 0);
}

#[test]
fn test_batch_with_closed_leg_changes_nothing() {
    let (_clock, engine) = engine(EngineConfig::default());
    let m1 = market(&engine, 2);
    let m2 = market(&engine, 2);
    let m3 = market(&engine, 2);
    engine.close_market(&CREATOR, m2).unwrap();
    let err = engine
        .batch_bet(bettor(1), &[m1, m2, m3], &[0, 1, 0], &[10, 20, 30])
        .unwrap_err();
    let Error::BatchValidationFailed { leg, source } = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(leg, 1);
    assert!(matches!(*source, Error::MarketNotOpen { .. }));
    for id in [m1, m2, m3] {
        assert_eq!(engine.total_volume(id).unwrap(), 0);
        assert_eq!(engine.total_bets(id).unwrap(), 0);
    }
    let stats = engine.batch_stats(&[m1, m2, m3]).unwrap();
    assert_eq!(stats.bet_counts, vec![0, 0, 0]);
}

#[test]
fn test_batch_bet_applies_every_leg() {
    let (_clock, engine) = engine(EngineConfig::default());
    let m1 = market(&engine, 2);
    let m2 = market(&engine, 3);
    let mut events = engine.subscribe();
    engine
        .batch_bet(bettor(1), &[m1, m2], &[1, 2], &[10, 20])
        .unwrap();
    let stats = engine.batch_stats(&[m1, m2]).unwrap();
    assert_eq!(stats.bet_counts, vec![1, 1]);
    assert_eq!(stats.volumes, vec![10, 20]);
    assert_eq!(engine.portfolio(&[m1, m2], &bettor(1)).unwrap(), 2);
    let received: Vec<Event> =
        std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(matches!(received.last(), Some(Event::BatchBetPlaced {
        total_amount: 30,
        ..
    })));
}

fn resolved_parlay_engine(
    picks: [u32; 3],
) -> (Engine, wager_settlement::types::ParlayId) {
    let (clock, engine) = engine(EngineConfig::without_disputes());
    let ids = [market(&engine, 2), market(&engine, 2), market(&engine, 2)];
    // Counter-bets so every leg has a losing side
    for (id, winner) in ids.iter().zip([0, 1, 0]) {
        engine.place_bet(bettor(9), *id, 1 - winner, 30).unwrap();
    }
    let ticket = engine
        .create_parlay(bettor(1), &ids, &picks, ParlayStake::Equal(30))
        .unwrap();
    clock.set(2_000);
    for (id, winner) in ids.iter().zip([0, 1, 0]) {
        let proposal = engine.resolve_market(&CREATOR, *id, winner).unwrap();
        assert!(matches!(proposal, Proposal::Final(_)));
    }
    (engine, ticket)
}

#[test]
fn test_parlay_with_every_leg_right_pays_once() {
    let (engine, ticket) = resolved_parlay_engine([0, 1, 0]);
    let status = engine.check_parlay_status(&ticket).unwrap();
    assert!(status.all_resolved && status.all_won);
    // Each leg: 10 on the winner out of 40, odds 4
    assert_eq!(status.payout, 30 * 4 * 4 * 4);
    assert_eq!(engine.claim_parlay(&bettor(1), &ticket).unwrap(), status.payout);
    assert!(matches!(
        engine.claim_parlay(&bettor(1), &ticket),
        Err(Error::AlreadyClaimed)
    ));
    assert_eq!(engine.user_parlays(&bettor(1)), vec![ticket]);
    let details = engine.parlay_details(&ticket).unwrap();
    assert!(details.claimed);
    assert_eq!(details.leg_stakes, vec![10, 10, 10]);
}

#[test]
fn test_parlay_with_a_wrong_leg_cannot_be_claimed() {
    let (engine, ticket) = resolved_parlay_engine([0, 0, 0]);
    let status = engine.check_parlay_status(&ticket).unwrap();
    assert!(status.all_resolved);
    assert!(!status.all_won);
    assert_eq!(status.payout, 0);
    assert!(matches!(
        engine.claim_parlay(&bettor(1), &ticket),
        Err(Error::NothingToClaim)
    ));
    assert!(!engine.parlay_details(&ticket).unwrap().claimed);
}

#[test]
fn test_dispute_overturns_proposed_outcome() {
    let (clock, engine) = engine(EngineConfig::default());
    let id = market(&engine, 2);
    engine.close_market(&CREATOR, id).unwrap();
    let proposal = engine.resolve_market(&CREATOR, id, 0).unwrap();
    let Proposal::Disputable { deadline } = proposal else {
        panic!("expected a dispute window");
    };
    assert_eq!(
        deadline,
        1_000 + EngineConfig::DEFAULT_DISPUTE_WINDOW_SECS
    );
    assert!(matches!(
        engine.dispute_resolution(bettor(4), id, 1, ONE / 1_000),
        Err(Error::InsufficientStake { .. })
    ));
    engine.dispute_resolution(bettor(1), id, 1, ONE / 10).unwrap();
    engine.dispute_resolution(bettor(2), id, 1, ONE / 10).unwrap();
    engine.dispute_resolution(bettor(3), id, 0, ONE / 20).unwrap();
    assert!(matches!(
        engine.finalize_resolution(id),
        Err(Error::DisputeWindowOpen { .. })
    ));
    clock.set(deadline);
    assert!(matches!(
        engine.dispute_resolution(bettor(4), id, 0, ONE),
        Err(Error::DisputeWindowClosed { .. })
    ));
    let resolution = engine.finalize_resolution(id).unwrap();
    assert_eq!(resolution.winning_outcome, 1);
    assert_eq!(engine.dispute_votes(id, 1).unwrap(), ONE / 5);
    assert!(matches!(
        engine.finalize_resolution(id),
        Err(Error::AlreadyFinalized { .. })
    ));
    let market = engine.market(id).unwrap();
    assert_eq!(market.state(), MarketState::Resolved);
    assert_eq!(market.winning_outcome(), Some(1));
}

#[test]
fn test_concurrent_disputes_are_all_counted() {
    let (clock, engine) = engine(EngineConfig::default());
    let id = market(&engine, 3);
    clock.set(2_000);
    engine.resolve_market(&CREATOR, id, 2).unwrap();
    let stake = EngineConfig::DEFAULT_MIN_DISPUTE_STAKE;
    std::thread::scope(|scope| {
        for n in 0..12u8 {
            let engine = &engine;
            scope.spawn(move || {
                engine
                    .dispute_resolution(bettor(n), id, u32::from(n % 2), stake)
                    .unwrap();
            });
        }
    });
    assert_eq!(engine.dispute_votes(id, 0).unwrap(), 6 * stake);
    assert_eq!(engine.dispute_votes(id, 1).unwrap(), 6 * stake);
    clock.advance(EngineConfig::DEFAULT_DISPUTE_WINDOW_SECS);
    // Exact tie between 0 and 1, neither proposed: lowest index
    assert_eq!(engine.finalize_resolution(id).unwrap().winning_outcome, 0);
}

#[test]
fn test_winners_claim_their_share() {
    let (clock, engine) = engine(EngineConfig::without_disputes());
    let id = market(&engine, 2);
    engine.place_bet(bettor(1), id, 0, 30).unwrap();
    engine.place_bet(bettor(2), id, 0, 10).unwrap();
    engine.place_bet(bettor(3), id, 1, 60).unwrap();
    clock.set(2_000);
    engine.resolve_market(&CREATOR, id, 0).unwrap();
    assert_eq!(engine.claim_winnings(&bettor(1), id).unwrap(), 75);
    assert_eq!(engine.batch_claim(&bettor(2), &[id]).unwrap(), 25);
    assert!(matches!(
        engine.claim_winnings(&bettor(3), id),
        Err(Error::NothingToClaim)
    ));
    assert!(matches!(
        engine.claim_winnings(&bettor(1), id),
        Err(Error::AlreadyClaimed)
    ));
}

#[test]
fn test_market_handles_resolve_to_markets() {
    let (_clock, engine) = engine(EngineConfig::default());
    let mut events = engine.subscribe();
    let id = market(&engine, 4);
    let handle = engine.market_handle(0).unwrap();
    assert_eq!(engine.market_by_handle(&handle).unwrap().id(), id);
    assert_eq!(engine.total_markets(), 1);
    let Ok(Event::MarketCreated {
        market_id,
        handle: announced,
        creator,
        ..
    }) = events.try_recv()
    else {
        panic!("expected MarketCreated");
    };
    assert_eq!((market_id, announced, creator), (id, handle, CREATOR));
}

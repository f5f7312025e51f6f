use super::{Address, MarketHandle, MarketId, Outcome, ParlayId, Timestamp};

pub type Hash = [u8; 32];

pub fn hash(data: &[u8]) -> Hash {
    blake3::hash(data).into()
}

/// Handle for a market, from its immutable creation data
pub fn market_handle(
    id: MarketId,
    creator: &Address,
    question: &str,
    num_outcomes: u32,
    closing_time: Timestamp,
) -> MarketHandle {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"market");
    hasher.update(&id.as_u64().to_be_bytes());
    hasher.update(creator.as_bytes());
    hasher.update(&num_outcomes.to_be_bytes());
    hasher.update(&closing_time.to_be_bytes());
    hasher.update(question.as_bytes());
    let digest: Hash = hasher.finalize().into();
    let mut handle = [0u8; 20];
    handle.copy_from_slice(&digest[..20]);
    MarketHandle(handle)
}

/// Parlay ticket id. `sequence` is unique per ticket, so identical legs
/// placed twice by the same bettor still get distinct ids.
pub fn parlay_id(
    bettor: &Address,
    market_ids: &[MarketId],
    outcomes: &[Outcome],
    sequence: u64,
) -> ParlayId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"parlay");
    hasher.update(bettor.as_bytes());
    hasher.update(&(market_ids.len() as u64).to_be_bytes());
    for market_id in market_ids {
        hasher.update(&market_id.as_u64().to_be_bytes());
    }
    for outcome in outcomes {
        hasher.update(&outcome.to_be_bytes());
    }
    hasher.update(&sequence.to_be_bytes());
    ParlayId(hasher.finalize().into())
}

//! Integer arithmetic for odds and payouts.

pub mod odds;
pub mod payout;
pub mod units;

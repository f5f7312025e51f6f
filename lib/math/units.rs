//! Base-unit arithmetic with explicit rounding.
//!
//! All monetary values in the engine are integer base units. Ratios are
//! computed as `value * numerator / denominator` in 128-bit intermediates
//! and narrowed back to `u64` with an explicit rounding mode.
//!
//! Fees taken by the protocol round up and payouts to bettors round down,
//! so rounding never pays out more than the pool holds.

use thiserror::Error;

use crate::types::Amount;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum UnitsError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("result exceeds u64 range")]
    Overflow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Ceiling, for fees
    Up,
    /// Floor, for payouts
    Down,
    /// Halves round up
    Nearest,
}

/// Compute `value * numerator / denominator` without intermediate overflow.
///
/// # Errors
/// Returns `UnitsError` if `denominator` is zero or the rounded quotient does
/// not fit in a `u64`.
///
/// # Examples
/// ```
/// use wager_settlement::math::units::{mul_div, Rounding};
///
/// assert_eq!(mul_div(10, 1, 3, Rounding::Down).unwrap(), 3);
/// assert_eq!(mul_div(10, 1, 3, Rounding::Up).unwrap(), 4);
/// ```
pub fn mul_div(
    value: u64,
    numerator: u64,
    denominator: u64,
    mode: Rounding,
) -> Result<u64, UnitsError> {
    mul_div_wide(value as u128, numerator as u128, denominator as u128, mode)
}

fn mul_div_wide(
    value: u128,
    numerator: u128,
    denominator: u128,
    mode: Rounding,
) -> Result<u64, UnitsError> {
    if denominator == 0 {
        return Err(UnitsError::DivisionByZero);
    }
    let product = value.checked_mul(numerator).ok_or(UnitsError::Overflow)?;
    let quotient = product / denominator;
    let remainder = product % denominator;
    let rounded = match mode {
        Rounding::Down => quotient,
        Rounding::Up if remainder > 0 => quotient + 1,
        Rounding::Up => quotient,
        Rounding::Nearest if remainder >= denominator - remainder => {
            quotient + 1
        }
        Rounding::Nearest => quotient,
    };
    u64::try_from(rounded).map_err(|_| UnitsError::Overflow)
}

/// Basis-point share of `amount`, e.g. a fee of `bps` / 10_000.
pub fn bps_of(
    amount: Amount,
    bps: u16,
    mode: Rounding,
) -> Result<Amount, UnitsError> {
    mul_div(amount, bps as u64, BPS_DENOMINATOR, mode)
}

pub const BPS_DENOMINATOR: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding_modes() {
        assert_eq!(mul_div(100, 1, 3, Rounding::Down).unwrap(), 33);
        assert_eq!(mul_div(100, 1, 3, Rounding::Up).unwrap(), 34);
        assert_eq!(mul_div(100, 1, 3, Rounding::Nearest).unwrap(), 33);
        assert_eq!(mul_div(100, 2, 3, Rounding::Nearest).unwrap(), 67);
        assert_eq!(mul_div(1, 1, 2, Rounding::Nearest).unwrap(), 1);
        assert_eq!(mul_div(90, 1, 3, Rounding::Up).unwrap(), 30);
    }

    #[test]
    fn test_mul_div_no_intermediate_overflow() {
        // u64::MAX * 2 overflows u64 but not u128
        assert_eq!(
            mul_div(u64::MAX, 2, 2, Rounding::Down).unwrap(),
            u64::MAX
        );
        assert_eq!(
            mul_div(u64::MAX, 3, 2, Rounding::Down),
            Err(UnitsError::Overflow)
        );
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(
            mul_div(5, 1, 0, Rounding::Down),
            Err(UnitsError::DivisionByZero)
        );
    }

    #[test]
    fn test_bps_of() {
        assert_eq!(bps_of(1_000_000, 250, Rounding::Down).unwrap(), 25_000);
        assert_eq!(bps_of(3, 5_000, Rounding::Up).unwrap(), 2);
        assert_eq!(bps_of(3, 5_000, Rounding::Down).unwrap(), 1);
    }
}

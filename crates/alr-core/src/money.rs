//! Fixed-point money helpers.
//!
//! All monetary values in the ledger carry 3 decimal places and round
//! half-up (midpoint away from zero).

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places used for every monetary value.
pub const MONEY_SCALE: u32 = 3;

/// Rounds to 3 decimals, half-up.
pub fn round3(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether a value is present and non-zero. An unset value is not zero.
pub fn is_set_nonzero(value: Option<Decimal>) -> bool {
    value.map(|v| !v.is_zero()).unwrap_or(false)
}

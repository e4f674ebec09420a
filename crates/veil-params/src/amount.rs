//! Monetary unit

/// Amount in satoshis. Signed so that fee arithmetic can detect underflow.
pub type Amount = i64;

/// One coin.
pub const COIN: Amount = 100_000_000;

/// One hundredth of a coin.
pub const CENT: Amount = 1_000_000;

/// Upper bound for any single value or sum of values.
pub const MAX_MONEY: Amount = 300_000_000 * COIN;

/// Check that a value lies within `[0, MAX_MONEY]`.
pub const fn money_range(value: Amount) -> bool {
    value >= 0 && value <= MAX_MONEY
}

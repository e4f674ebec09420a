//! Relay and wallet policy constants
//!
//! Fee rates are expressed in satoshis per 1000 bytes.

use crate::amount::{Amount, CENT, COIN};

/// Largest weight a transaction may have to be relayed.
pub const MAX_STANDARD_TX_WEIGHT: usize = 400_000;

/// Fee rate used to classify outputs as dust.
pub const DUST_RELAY_TX_FEE: Amount = 3_000;

/// Minimum relay fee rate.
pub const DEFAULT_MIN_RELAY_TX_FEE: Amount = 1_000;

/// Rate at which change is considered worth keeping rather than discarding.
pub const DEFAULT_DISCARD_FEE: Amount = 10_000;

/// Minimum fee rate the wallet will pay.
pub const DEFAULT_TRANSACTION_MINFEE: Amount = 1_000;

/// Fee rate used when no estimate is available.
pub const DEFAULT_FALLBACK_FEE: Amount = 20_000;

/// Absolute fee ceiling for a single wallet transaction.
pub const DEFAULT_TRANSACTION_MAXFEE: Amount = COIN / 10;

/// Target minimum change amount.
pub const MIN_CHANGE: Amount = CENT;

/// Final minimum change amount after paying for fees.
pub const MIN_FINAL_CHANGE: Amount = MIN_CHANGE / 2;

/// Default mempool ancestor chain limit.
pub const DEFAULT_ANCESTOR_LIMIT: usize = 25;

/// Default mempool descendant chain limit.
pub const DEFAULT_DESCENDANT_LIMIT: usize = 25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_thresholds() {
        assert_eq!(MIN_FINAL_CHANGE * 2, MIN_CHANGE);
        assert!(DEFAULT_DISCARD_FEE > DUST_RELAY_TX_FEE);
    }
}

//! Fee rates and dust
//!
//! Fee rates are expressed in satoshis per 1000 bytes. The wallet's minimum rate
//! is resolved from coin control, the user-set rate, the chain's estimate and the
//! fallback rate, then floored by the relay minimums.

use crate::chain::Chain;
use crate::coin_control::CoinControl;
use crate::config::WalletConfig;
use crate::primitives::{output_size, Output};
use serde::{Deserialize, Serialize};
use std::fmt;
use veil_params::Amount;

/// Approximate serialized size of the input that would later spend an output.
pub const SPEND_INPUT_SIZE_ESTIMATE: usize = 148;

/// Fee rate in satoshis per kilobyte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeeRate {
    per_k: Amount,
}

impl FeeRate {
    /// Rate from satoshis per kilobyte.
    pub const fn from_per_k(per_k: Amount) -> Self {
        Self { per_k }
    }

    /// Rate that pays `fee` for `bytes`.
    pub fn from_fee(fee: Amount, bytes: usize) -> Self {
        if bytes == 0 {
            return Self::default();
        }
        Self {
            per_k: fee.saturating_mul(1000) / bytes as Amount,
        }
    }

    /// Satoshis per kilobyte.
    pub fn per_k(&self) -> Amount {
        self.per_k
    }

    /// Fee for a transaction of `bytes` bytes.
    ///
    /// A positive rate never rounds a non-empty transaction down to zero.
    pub fn fee(&self, bytes: usize) -> Amount {
        let fee = self.per_k.saturating_mul(bytes as Amount) / 1000;
        if fee == 0 && bytes != 0 && self.per_k > 0 {
            return 1;
        }
        fee
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/kB", self.per_k)
    }
}

/// Fee policy for dynamic fee adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeePolicy {
    /// Half rate (slow confirmation)
    Low,
    /// Base rate (normal confirmation)
    #[default]
    Standard,
    /// Double rate (fast confirmation)
    High,
    /// Fixed rate in satoshis per kilobyte
    Custom(Amount),
}

impl FeePolicy {
    /// Get fee multiplier
    pub fn multiplier(&self) -> f64 {
        match self {
            FeePolicy::Low => 0.5,
            FeePolicy::Standard => 1.0,
            FeePolicy::High => 2.0,
            FeePolicy::Custom(_) => 1.0,
        }
    }

    /// Apply policy to a base rate
    pub fn apply(&self, base: FeeRate) -> FeeRate {
        match self {
            FeePolicy::Custom(per_k) => FeeRate::from_per_k(*per_k),
            _ => FeeRate::from_per_k(((base.per_k() as f64) * self.multiplier()) as Amount),
        }
    }
}

/// Value below which `output` costs more to spend than it carries.
///
/// Data outputs and provably unspendable scripts are never dust.
pub fn dust_threshold(output: &Output, dust_relay: FeeRate) -> Amount {
    if matches!(output, Output::Data(_)) {
        return 0;
    }
    if output.script_pubkey().is_some_and(|s| s.is_unspendable()) {
        return 0;
    }
    dust_relay.fee(output_size(output) + SPEND_INPUT_SIZE_ESTIMATE)
}

/// True when a plain output's value is below its dust threshold.
pub fn is_dust(output: &Output, dust_relay: FeeRate) -> bool {
    match output.value() {
        Some(v) => v < dust_threshold(output, dust_relay),
        None => false,
    }
}

/// Lowest fee rate the wallet will pay.
pub fn minimum_fee_rate(
    config: &WalletConfig,
    coin_control: &CoinControl,
    chain: &dyn Chain,
) -> FeeRate {
    if let (Some(rate), true) = (coin_control.fee_rate, coin_control.override_fee_rate) {
        tracing::debug!("Using unchecked fee rate override {}", rate);
        return rate;
    }
    let base = if let Some(rate) = coin_control.fee_rate {
        rate
    } else if config.pay_tx_fee > 0 {
        FeeRate::from_per_k(config.pay_tx_fee)
    } else {
        let target = coin_control
            .confirm_target
            .unwrap_or(config.tx_confirm_target);
        match chain.estimate_fee(target) {
            Some(rate) if rate.per_k() > 0 => config.fee_policy.apply(rate),
            _ => FeeRate::from_per_k(config.fallback_fee),
        }
    };

    let rate = base
        .max(FeeRate::from_per_k(config.min_tx_fee))
        .max(FeeRate::from_per_k(config.min_relay_fee));
    tracing::debug!("Minimum fee rate resolved to {}", rate);
    rate
}

/// Rate used when deciding whether change is worth keeping.
pub fn discard_rate(config: &WalletConfig) -> FeeRate {
    FeeRate::from_per_k(config.discard_fee.max(config.dust_relay_fee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Script;
    use crate::testing::MockChain;

    #[test]
    fn test_fee_rounding() {
        let rate = FeeRate::from_per_k(1000);
        assert_eq!(rate.fee(250), 250);
        let tiny = FeeRate::from_per_k(1);
        assert_eq!(tiny.fee(10), 1);
        assert_eq!(FeeRate::from_per_k(0).fee(10), 0);
        assert_eq!(rate.fee(0), 0);
    }

    #[test]
    fn test_from_fee() {
        assert_eq!(FeeRate::from_fee(500, 250).per_k(), 2000);
        assert_eq!(FeeRate::from_fee(500, 0).per_k(), 0);
    }

    #[test]
    fn test_dust_threshold() {
        let relay = FeeRate::from_per_k(3000);
        let out = Output::standard(0, Script::pay_to_pubkey(&[2u8; 33]));
        // kind byte, value, script length, 35-byte script
        let size = 1 + 8 + 1 + 35;
        assert_eq!(dust_threshold(&out, relay), relay.fee(size + 148));
        assert_eq!(dust_threshold(&Output::fee_marker(10), relay), 0);
        assert_eq!(
            dust_threshold(&Output::standard(0, Script::null_data(b"x")), relay),
            0
        );
    }

    #[test]
    fn test_fee_policy() {
        let base = FeeRate::from_per_k(10_000);
        assert_eq!(FeePolicy::Low.apply(base).per_k(), 5_000);
        assert_eq!(FeePolicy::Standard.apply(base).per_k(), 10_000);
        assert_eq!(FeePolicy::High.apply(base).per_k(), 20_000);
        assert_eq!(FeePolicy::Custom(15_000).apply(base).per_k(), 15_000);
    }

    #[test]
    fn test_minimum_fee_rate_order() {
        let chain = MockChain::new();
        let mut config = WalletConfig::default();
        let mut cc = CoinControl::default();

        // No estimate: fallback
        assert_eq!(
            minimum_fee_rate(&config, &cc, &chain).per_k(),
            config.fallback_fee
        );

        chain.set_fee_estimate(Some(FeeRate::from_per_k(5_000)));
        assert_eq!(minimum_fee_rate(&config, &cc, &chain).per_k(), 5_000);

        config.pay_tx_fee = 7_000;
        assert_eq!(minimum_fee_rate(&config, &cc, &chain).per_k(), 7_000);

        cc.fee_rate = Some(FeeRate::from_per_k(9_000));
        assert_eq!(minimum_fee_rate(&config, &cc, &chain).per_k(), 9_000);

        // Floors apply even to overrides
        cc.fee_rate = Some(FeeRate::from_per_k(1));
        assert_eq!(
            minimum_fee_rate(&config, &cc, &chain).per_k(),
            config.min_tx_fee.max(config.min_relay_fee)
        );

        // An explicit override skips them
        cc.override_fee_rate = true;
        assert_eq!(minimum_fee_rate(&config, &cc, &chain).per_k(), 1);
    }
}

//! Wallet configuration

use crate::fees::FeePolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use veil_params::policy::{
    DEFAULT_ANCESTOR_LIMIT, DEFAULT_DESCENDANT_LIMIT, DEFAULT_DISCARD_FEE, DEFAULT_FALLBACK_FEE,
    DEFAULT_MIN_RELAY_TX_FEE, DEFAULT_TRANSACTION_MAXFEE, DEFAULT_TRANSACTION_MINFEE,
    DUST_RELAY_TX_FEE,
};
use veil_params::{Amount, ConsensusParams, NetworkType, MAX_MONEY};

/// Default confirmation target for fee estimation (blocks)
pub const DEFAULT_TX_CONFIRM_TARGET: u32 = 6;

/// Default interval between rebroadcast passes (seconds)
pub const DEFAULT_REBROADCAST_INTERVAL_SECS: u64 = 30 * 60;

/// Wallet configuration. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network
    pub network: NetworkType,
    /// Spend unconfirmed change from our own transactions
    pub spend_zero_conf_change: bool,
    /// Refuse to extend long unconfirmed chains
    pub reject_long_chains: bool,
    /// Mempool ancestor limit used to shape eligibility filters
    pub limit_ancestor_count: usize,
    /// Mempool descendant limit used to shape eligibility filters
    pub limit_descendant_count: usize,
    /// User-set fee rate (sat/kB); zero means estimate
    pub pay_tx_fee: Amount,
    /// Wallet minimum fee rate (sat/kB)
    pub min_tx_fee: Amount,
    /// Rate used when no estimate is available (sat/kB)
    pub fallback_fee: Amount,
    /// Rate at which change is discarded to fee (sat/kB)
    pub discard_fee: Amount,
    /// Rate used for dust thresholds (sat/kB)
    pub dust_relay_fee: Amount,
    /// Minimum relay fee rate (sat/kB)
    pub min_relay_fee: Amount,
    /// Absolute fee ceiling for a single transaction
    pub max_tx_fee: Amount,
    /// Signal opt-in replace-by-fee by default
    pub wallet_rbf: bool,
    /// Confirmation target for fee estimation
    pub tx_confirm_target: u32,
    /// Seconds between rebroadcast passes
    pub rebroadcast_interval_secs: u64,
    /// Multiplier applied to estimated fee rates
    pub fee_policy: FeePolicy,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            spend_zero_conf_change: true,
            reject_long_chains: false,
            limit_ancestor_count: DEFAULT_ANCESTOR_LIMIT,
            limit_descendant_count: DEFAULT_DESCENDANT_LIMIT,
            pay_tx_fee: 0,
            min_tx_fee: DEFAULT_TRANSACTION_MINFEE,
            fallback_fee: DEFAULT_FALLBACK_FEE,
            discard_fee: DEFAULT_DISCARD_FEE,
            dust_relay_fee: DUST_RELAY_TX_FEE,
            min_relay_fee: DEFAULT_MIN_RELAY_TX_FEE,
            max_tx_fee: DEFAULT_TRANSACTION_MAXFEE,
            wallet_rbf: false,
            tx_confirm_target: DEFAULT_TX_CONFIRM_TARGET,
            rebroadcast_interval_secs: DEFAULT_REBROADCAST_INTERVAL_SECS,
            fee_policy: FeePolicy::Standard,
        }
    }
}

impl WalletConfig {
    /// Defaults for `network`.
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Pause between rebroadcast passes.
    pub fn rebroadcast_interval(&self) -> Duration {
        Duration::from_secs(self.rebroadcast_interval_secs)
    }

    /// Read a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        tracing::debug!("Loaded wallet config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings the fee machinery cannot work with.
    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("pay_tx_fee", self.pay_tx_fee),
            ("min_tx_fee", self.min_tx_fee),
            ("fallback_fee", self.fallback_fee),
            ("discard_fee", self.discard_fee),
            ("dust_relay_fee", self.dust_relay_fee),
            ("min_relay_fee", self.min_relay_fee),
        ];
        for (name, rate) in rates {
            if rate < 0 {
                return Err(Error::Config(format!("{} must not be negative", name)));
            }
        }
        if self.min_relay_fee == 0 {
            return Err(Error::Config("min_relay_fee must be positive".to_string()));
        }
        if self.max_tx_fee < 0 || self.max_tx_fee > MAX_MONEY {
            return Err(Error::Config(format!(
                "max_tx_fee {} outside money range",
                self.max_tx_fee
            )));
        }
        if self.limit_ancestor_count == 0 {
            return Err(Error::Config(
                "limit_ancestor_count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Consensus parameters for the configured network.
    pub fn consensus(&self) -> ConsensusParams {
        ConsensusParams::from_network(self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(WalletConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WalletConfig =
            serde_json::from_str(r#"{"network":"regtest","wallet_rbf":true}"#).unwrap();
        assert_eq!(config.network, NetworkType::Regtest);
        assert!(config.wallet_rbf);
        assert_eq!(config.fallback_fee, DEFAULT_FALLBACK_FEE);
        assert!(config.spend_zero_conf_change);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = WalletConfig::default();
        config.discard_fee = -1;
        assert!(config.validate().is_err());

        let mut config = WalletConfig::default();
        config.max_tx_fee = MAX_MONEY + 1;
        assert!(config.validate().is_err());

        let mut config = WalletConfig::default();
        config.min_relay_fee = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let mut config = WalletConfig::for_network(NetworkType::Testnet);
        config.pay_tx_fee = 12_345;
        config.fee_policy = FeePolicy::High;
        config.save(&path).unwrap();

        let loaded = WalletConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.consensus().coinbase_maturity, 10);
    }
}

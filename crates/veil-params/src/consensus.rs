//! Consensus parameters for Veil

use crate::amount::{Amount, CENT};
use crate::network::NetworkType;

/// Consensus parameters
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Coinbase and coinstake maturity (blocks)
    pub coinbase_maturity: u32,
    /// Maximum number of zerocoin spends allowed in one transaction
    pub zerocoin_max_spends_per_transaction: usize,
    /// Fee required for each zerocoin mint output
    pub zerocoin_mint_fee: Amount,
    /// Confirmations before a mint is considered mature for spending
    pub zerocoin_mint_maturity: u32,
    /// Upper bound for a serialized zerocoin transaction (bytes)
    pub max_zerocoin_tx_size: usize,
}

impl ConsensusParams {
    /// Create consensus params for mainnet
    pub fn mainnet() -> Self {
        Self {
            coinbase_maturity: 100,
            zerocoin_max_spends_per_transaction: 7,
            zerocoin_mint_fee: CENT,
            zerocoin_mint_maturity: 20,
            max_zerocoin_tx_size: 150_000,
        }
    }

    /// Create consensus params for testnet
    pub fn testnet() -> Self {
        Self {
            coinbase_maturity: 10,
            zerocoin_mint_maturity: 2,
            ..Self::mainnet()
        }
    }

    /// Create consensus params for regtest
    pub fn regtest() -> Self {
        Self {
            coinbase_maturity: 10,
            zerocoin_mint_maturity: 2,
            ..Self::mainnet()
        }
    }

    /// Get consensus params by network type
    pub fn from_network(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Regtest => Self::regtest(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_consensus() {
        let params = ConsensusParams::mainnet();
        assert_eq!(params.coinbase_maturity, 100);
        assert_eq!(params.zerocoin_max_spends_per_transaction, 7);
        assert_eq!(params.zerocoin_mint_fee, CENT);
    }

    #[test]
    fn test_regtest_shortens_maturity() {
        let params = ConsensusParams::from_network(NetworkType::Regtest);
        assert_eq!(params.coinbase_maturity, 10);
        assert_eq!(params.zerocoin_mint_maturity, 2);
    }
}

//! Veil wallet core
//!
//! This crate implements the wallet engine: the polymorphic output codec,
//! coin filtering and selection, the fee-converging transaction builder,
//! the zerocoin spend protocol, and the ledger with its balances.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod available;
pub mod background;
pub mod cancel;
pub mod chain;
pub mod coin_control;
pub mod config;
pub mod error;
pub mod fees;
pub mod keystore;
pub mod logging;
pub mod manager;
pub mod primitives;
pub mod records;
pub mod rescan;
pub mod selection;
pub mod store;
pub mod transaction;
pub mod wallet;
pub mod zerocoin;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use available::{CoinFilter, OutputCandidate, KIND_ALL, KIND_BASECOIN, KIND_CT, KIND_RINGCT, KIND_ZEROCOIN};
pub use background::{rebroadcast_once, spawn_rebroadcast, RebroadcastRound};
pub use cancel::CancelToken;
pub use chain::{Chain, ChainBlock, MintLocation};
pub use coin_control::CoinControl;
pub use config::WalletConfig;
pub use error::{Error, ErrorCategory, Result};
pub use fees::{FeePolicy, FeeRate};
pub use keystore::{IsMine, IsMineFilter, KeyStore};
pub use manager::{WalletId, WalletManager};
pub use primitives::{Hash256, OutPoint, Output, Script, Transaction};
pub use records::{AnonLedger, OutputRecord, TransactionRecord};
pub use rescan::{rescan_from_height, RescanOutcome};
pub use selection::{CoinSelectionParams, EligibilityFilter, SelectionResult};
pub use store::{MemoryStore, StoreError, WalletStore};
pub use transaction::{CreatedTransaction, Recipient};
pub use wallet::{BalanceList, TxState, Wallet, WalletTx};
pub use zerocoin::{
    Denomination, Mint, MintMeta, ZerocoinProver, ZerocoinSpendReceipt, ZerocoinSpendRequest,
    ZerocoinStatus,
};

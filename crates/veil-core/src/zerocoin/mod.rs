//! Zerocoin mints, tracking and the spend protocol

mod denomination;
mod mint;
mod prover;
mod select;
mod spend;
mod tracker;

pub use denomination::{
    amount_to_closest_denomination, amount_to_denomination, denominations_for_amount,
    Denomination,
};
pub use mint::{
    pubcoin_hash, serial_hash, Mint, MintGenerator, MintMeta, CURRENT_MINT_VERSION, MINT_CONFIRMED,
    MINT_MATURE, MINT_PENDINGSPEND,
};
pub use prover::{AccumulatorWitness, CoinSpend, ProverError, ZerocoinProver};
pub use select::{select_mints_from_list, MintSelection};
pub use spend::{ZerocoinSpendBatch, ZerocoinSpendReceipt, ZerocoinSpendRequest};
pub use tracker::{sort_oldest_first, MintTracker, ZerocoinBalances};

use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a zerocoin spend, with stable numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ZerocoinStatus {
    /// Spend committed
    SpendOkay = 0,
    /// Unclassified failure
    SpendError = 1,
    /// Wallet is locked
    WalletLocked = 2,
    /// Mempool refused a batch
    CommitFailed = 3,
    /// Rollback could not erase spent-serial rows
    EraseSpendsFailed = 4,
    /// Rollback could not erase new mints
    EraseNewMintsFailed = 5,
    /// Not enough spendable mints
    TrxFundsProblems = 6,
    /// Transaction could not be assembled
    TrxCreate = 7,
    /// Change could not be split
    TrxChange = 8,
    /// Change mint generation failed
    TxMintGeneral = 9,
    /// Mint does not form a valid coin
    InvalidCoin = 10,
    /// Accumulator witness could not be built
    FailedAccumulatorInitialization = 11,
    /// Proof did not verify
    InvalidWitness = 12,
    /// Proof did not serialize
    BadSerialization = 13,
    /// Serial already spent
    SpentUsedZerocoin = 14,
    /// Transaction above the zerocoin size limit
    TxTooLarge = 15,
    /// Version 1 mint spent below the required security level
    SpendV1SecLevel = 16,
    /// Batches built and test-accepted, not yet committed
    SpendPrepared = 17,
}

impl ZerocoinStatus {
    /// Every status, in numeric order.
    pub const ALL: [ZerocoinStatus; 18] = [
        ZerocoinStatus::SpendOkay,
        ZerocoinStatus::SpendError,
        ZerocoinStatus::WalletLocked,
        ZerocoinStatus::CommitFailed,
        ZerocoinStatus::EraseSpendsFailed,
        ZerocoinStatus::EraseNewMintsFailed,
        ZerocoinStatus::TrxFundsProblems,
        ZerocoinStatus::TrxCreate,
        ZerocoinStatus::TrxChange,
        ZerocoinStatus::TxMintGeneral,
        ZerocoinStatus::InvalidCoin,
        ZerocoinStatus::FailedAccumulatorInitialization,
        ZerocoinStatus::InvalidWitness,
        ZerocoinStatus::BadSerialization,
        ZerocoinStatus::SpentUsedZerocoin,
        ZerocoinStatus::TxTooLarge,
        ZerocoinStatus::SpendV1SecLevel,
        ZerocoinStatus::SpendPrepared,
    ];

    /// Stable numeric value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Status for a numeric value.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Stable code string.
    pub fn code(self) -> &'static str {
        match self {
            ZerocoinStatus::SpendOkay => "SPEND_OKAY",
            ZerocoinStatus::SpendError => "SPEND_ERROR",
            ZerocoinStatus::WalletLocked => "WALLET_LOCKED",
            ZerocoinStatus::CommitFailed => "COMMIT_FAILED",
            ZerocoinStatus::EraseSpendsFailed => "ERASE_SPENDS_FAILED",
            ZerocoinStatus::EraseNewMintsFailed => "ERASE_NEW_MINTS_FAILED",
            ZerocoinStatus::TrxFundsProblems => "TRX_FUNDS_PROBLEMS",
            ZerocoinStatus::TrxCreate => "TRX_CREATE",
            ZerocoinStatus::TrxChange => "TRX_CHANGE",
            ZerocoinStatus::TxMintGeneral => "TXMINT_GENERAL",
            ZerocoinStatus::InvalidCoin => "INVALID_COIN",
            ZerocoinStatus::FailedAccumulatorInitialization => "FAILED_ACCUMULATOR_INITIALIZATION",
            ZerocoinStatus::InvalidWitness => "INVALID_WITNESS",
            ZerocoinStatus::BadSerialization => "BAD_SERIALIZATION",
            ZerocoinStatus::SpentUsedZerocoin => "SPENT_USED_ZEROCOIN",
            ZerocoinStatus::TxTooLarge => "TX_TOO_LARGE",
            ZerocoinStatus::SpendV1SecLevel => "SPEND_V1_SEC_LEVEL",
            ZerocoinStatus::SpendPrepared => "SPEND_PREPARED",
        }
    }

    /// Error category a failure with this status belongs to.
    pub fn category(self) -> ErrorCategory {
        match self {
            ZerocoinStatus::CommitFailed
            | ZerocoinStatus::EraseSpendsFailed
            | ZerocoinStatus::EraseNewMintsFailed => ErrorCategory::Commit,
            ZerocoinStatus::SpentUsedZerocoin | ZerocoinStatus::TrxCreate => {
                ErrorCategory::Consistency
            }
            ZerocoinStatus::InvalidCoin
            | ZerocoinStatus::FailedAccumulatorInitialization
            | ZerocoinStatus::InvalidWitness
            | ZerocoinStatus::BadSerialization
            | ZerocoinStatus::SpendV1SecLevel => ErrorCategory::Proof,
            ZerocoinStatus::TrxFundsProblems => ErrorCategory::Funds,
            ZerocoinStatus::WalletLocked => ErrorCategory::UserInput,
            ZerocoinStatus::TxTooLarge | ZerocoinStatus::TrxChange | ZerocoinStatus::TxMintGeneral => {
                ErrorCategory::Construction
            }
            ZerocoinStatus::SpendError
            | ZerocoinStatus::SpendOkay
            | ZerocoinStatus::SpendPrepared => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ZerocoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

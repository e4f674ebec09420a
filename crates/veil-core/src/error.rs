//! Error types for Veil Core
//!
//! Every failure carries a stable code and a category so callers can map it to a
//! user message or a log field without matching on text.

use crate::primitives::DecodeError;
use crate::store::StoreError;
use crate::zerocoin::ZerocoinStatus;
use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Veil Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Negative, empty or out-of-range amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Recipient or change amount below what the policy can carry
    #[error("{0}")]
    AmountTooSmall(String),

    /// Unusable destination
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed serialized data
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Not enough spendable coins
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Preselected input that is unknown, locked or already spent
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Required fee is below the relay minimum
    #[error("Transaction too large for fee policy")]
    FeePolicy,

    /// Final transaction exceeds the standard weight
    #[error("Transaction too large")]
    TransactionTooLarge,

    /// Dummy or real signing failed
    #[error("Signing transaction failed")]
    SigningFailed,

    /// Requested change position beyond the output count
    #[error("Change index out of range")]
    ChangeIndexOutOfRange,

    /// Fee loop could not settle
    #[error("Transaction fee and change calculation failed")]
    FeeCalculation,

    /// Fee above the configured maximum
    #[error("Fee exceeds maximum configured by -maxtxfee")]
    FeeTooHigh,

    /// Mempool refused the transaction
    #[error("Transaction rejected by mempool: {0}")]
    MempoolRejected(String),

    /// Zerocoin spend protocol failure
    #[error("{message}")]
    Zerocoin {
        /// Protocol status
        status: ZerocoinStatus,
        /// Human-readable reason
        message: String,
        /// Batches already committed before the failure
        committed_batches: usize,
    },

    /// Transaction is confirmed or still in the mempool
    #[error("Transaction not eligible for abandonment: {0}")]
    AbandonNotAllowed(String),

    /// Unknown transaction hash
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Unknown wallet id
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Zerocoin failure with no batches committed.
    pub fn zerocoin(status: ZerocoinStatus, message: impl Into<String>) -> Self {
        Error::Zerocoin {
            status,
            message: message.into(),
            committed_batches: 0,
        }
    }

    /// Zerocoin protocol status, if this is a zerocoin failure.
    pub fn zerocoin_status(&self) -> Option<ZerocoinStatus> {
        match self {
            Error::Zerocoin { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::AmountTooSmall(_) => "amount_too_small",
            Error::InvalidAddress(_) => "invalid_address",
            Error::Decode(_) => "decode",
            Error::Config(_) => "config",
            Error::InsufficientFunds(_) => "insufficient_funds",
            Error::InvalidInput(_) => "invalid_input",
            Error::FeePolicy => "fee_policy",
            Error::TransactionTooLarge => "tx_too_large",
            Error::SigningFailed => "signing_failed",
            Error::ChangeIndexOutOfRange => "change_index_out_of_range",
            Error::FeeCalculation => "fee_calculation",
            Error::FeeTooHigh => "fee_too_high",
            Error::MempoolRejected(_) => "mempool_rejected",
            Error::Zerocoin { status, .. } => status.code(),
            Error::AbandonNotAllowed(_) => "abandon_not_allowed",
            Error::TransactionNotFound(_) => "tx_not_found",
            Error::WalletNotFound(_) => "wallet_not_found",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Other(_) => "other",
        }
    }

    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::UserInput | ErrorCategory::Funds
        ) || matches!(self, Error::FeeTooHigh | Error::MempoolRejected(_))
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::InsufficientFunds(_) => {
                "You don't have enough funds for this transaction. Please check your balance and try again.".to_string()
            }
            Error::InvalidAddress(_) => {
                "The recipient address is invalid. Please check and try again.".to_string()
            }
            Error::InvalidAmount(_) => {
                "The amount is invalid. Please enter a valid amount.".to_string()
            }
            Error::FeeTooHigh => {
                "The transaction fee exceeds the configured maximum. Please review.".to_string()
            }
            Error::MempoolRejected(_) => {
                "The network rejected this transaction. Please try again later.".to_string()
            }
            Error::Zerocoin {
                status: ZerocoinStatus::WalletLocked,
                ..
            } => "The wallet is locked. Unlock it and try again.".to_string(),
            _ => self.to_string(),
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidAmount(_)
            | Error::AmountTooSmall(_)
            | Error::InvalidAddress(_)
            | Error::Decode(_)
            | Error::Config(_)
            | Error::InvalidInput(_) => ErrorCategory::UserInput,
            Error::InsufficientFunds(_) => ErrorCategory::Funds,
            Error::FeePolicy
            | Error::TransactionTooLarge
            | Error::SigningFailed
            | Error::ChangeIndexOutOfRange
            | Error::FeeCalculation
            | Error::FeeTooHigh => ErrorCategory::Construction,
            Error::MempoolRejected(_) => ErrorCategory::Commit,
            Error::Zerocoin { status, .. } => status.category(),
            Error::AbandonNotAllowed(_)
            | Error::TransactionNotFound(_)
            | Error::WalletNotFound(_) => ErrorCategory::Consistency,
            Error::Storage(_) => ErrorCategory::Storage,
            Error::Io(_) | Error::Serialization(_) | Error::Other(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad amounts, addresses or encodings supplied by the caller
    UserInput,
    /// Not enough spendable value
    Funds,
    /// Transaction could not be assembled
    Construction,
    /// Zerocoin proof or witness failure
    Proof,
    /// Mempool acceptance or commit failure
    Commit,
    /// Wallet and chain disagree
    Consistency,
    /// Persistence failure
    Storage,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::UserInput => write!(f, "UserInput"),
            ErrorCategory::Funds => write!(f, "Funds"),
            ErrorCategory::Construction => write!(f, "Construction"),
            ErrorCategory::Proof => write!(f, "Proof"),
            ErrorCategory::Commit => write!(f, "Commit"),
            ErrorCategory::Consistency => write!(f, "Consistency"),
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

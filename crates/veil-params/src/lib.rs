//! Veil network parameters and constants
//!
//! This crate provides network-specific constants, consensus parameters,
//! relay policy limits, and the monetary unit used across the wallet.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod consensus;
pub mod network;
pub mod policy;

pub use amount::{money_range, Amount, CENT, COIN, MAX_MONEY};
pub use consensus::ConsensusParams;
pub use network::NetworkType;

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;

//! SQLite storage for the Veil wallet
//!
//! Implements the wallet persistence trait on a WAL-mode SQLite database with
//! versioned migrations. Records are kept as JSON payloads next to their key
//! columns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod database;
pub mod error;
pub mod migrations;
pub mod repository;
pub mod store;

pub use database::Database;
pub use error::{Error, Result};
pub use repository::Repository;
pub use store::SqliteStore;

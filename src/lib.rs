//! X10V Wallet Bridge Library
//!
//! Links a page embedded in a host container to an external Algorand
//! signing authority and carries a single payment from construction through
//! signature to on-chain confirmation.

pub mod address;
pub mod cache;
pub mod cli;
pub mod config;
pub mod connect;
pub mod error;
pub mod flow;
pub mod host;
pub mod ledger;
pub mod mode;
pub mod session;
pub mod signer;
pub mod txn;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};

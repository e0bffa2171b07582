//! Append-only vote ledger replicated between peers with a
//! longest-valid-chain rule.

pub mod api;
pub mod config;
pub mod consensus;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod models;
pub mod node;
pub mod peers;
pub mod pow;
pub mod store;
pub mod validator;

#[cfg(test)]
mod test_utils;

pub use error::{ChainValidationError, LedgerError, PeerError, PersistenceError};
pub use ledger::Ledger;
pub use models::{Block, BlockMode, ChainResponse, MineOutcome, Vote};
pub use node::VotingNode;

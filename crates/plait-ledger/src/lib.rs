//! A minimal proof-of-work ledger built on the trie.
//!
//! Every mined block carries two trie snapshots: settled transactions
//! keyed by id, and the full balance state keyed by account address.
//! The chain treats the trie as opaque; it only stores snapshots and
//! their root commitments and rehydrates them for lookups.

pub mod block;
pub mod chain;
pub mod config;
pub mod logging;
pub mod transaction;

pub use block::{Block, TrieArchive};
pub use chain::{Blockchain, ChainError};
pub use config::{Config, ConfigError};
pub use transaction::{Transaction, TxStatus};

//! Merkle Patricia Trie with batch path compression.
//!
//! This crate provides the authenticated key-value store the ledger
//! builds on:
//! - Upsert, get and delete over nibble-decomposed keys
//! - A content-addressed node index and a root commitment hash
//! - Deferred folding of single-child chains into encoded-path shortcuts
//! - Snapshot serialization of the root plus the whole node index

mod codec;
mod nibbles;
mod node;
mod trie;

pub use codec::{PackError, Packer, UnpackError, Unpacker};
pub use nibbles::Nibbles;
pub use node::{Node, NodeHash};
pub use trie::{PatriciaTrie, TrieError};

use base64::encode as base64_encode;
use sha2::{Digest, Sha256};

/// The sentinel hash a freshly created trie's root is indexed under.
pub const EMPTY_ROOT_HASH: &str = "0";

/// Hashes arbitrary bytes to the fixed-width text form used for node
/// identity: base64 of the SHA-256 digest.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    base64_encode(hasher.finalize())
}

//! Blocks and trie snapshots.

use plait_trie::{hash_bytes, Packer, PatriciaTrie, TrieError};

/// A serialized trie snapshot together with its Merkle root.
///
/// Blocks store state this way so the chain never holds live tries:
/// snapshots are immutable, and the root alone is enough to compare
/// state without rehydrating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieArchive {
    /// Merkle root of the archived trie.
    pub root: String,
    /// Serialized trie bytes.
    pub bytes: Vec<u8>,
}

impl TrieArchive {
    /// Snapshots a live trie.
    pub fn from_trie(trie: &PatriciaTrie) -> Result<Self, TrieError> {
        Ok(Self {
            root: trie.root_hash(),
            bytes: trie.serialize()?,
        })
    }

    /// Rehydrates the snapshot into a fresh trie.
    pub fn open(&self) -> Result<PatriciaTrie, TrieError> {
        let trie = PatriciaTrie::new();
        trie.deserialize(&self.bytes)?;
        Ok(trie)
    }
}

/// One block of the chain.
#[derive(Debug, Clone)]
pub struct Block {
    /// Height of this block; the genesis block is 0.
    pub index: u64,
    /// Creation time, nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Proof-of-work answer for this block.
    pub proof: u64,
    /// Hash of the preceding block; empty for genesis.
    pub prev_hash: String,
    /// Hash of this block's header fields and state roots.
    pub hash: String,
    /// Transactions settled in this block, keyed by id.
    pub txs: Option<TrieArchive>,
    /// Full balance state as of this block, keyed by address.
    pub balances: Option<TrieArchive>,
}

impl Block {
    /// Computes the block hash over the header fields and the state
    /// roots. The trie roots commit to the snapshot contents, so the
    /// snapshot bytes themselves stay out of the hash.
    pub fn compute_hash(&self) -> String {
        let mut packer = Packer::new(128);
        packer.pack_long(self.index);
        packer.pack_long(self.timestamp as u64);
        packer.pack_long(self.proof);
        packer.pack_str(&self.prev_hash);
        packer.pack_str(self.txs.as_ref().map_or("", |a| a.root.as_str()));
        packer.pack_str(self.balances.as_ref().map_or("", |a| a.root.as_str()));
        hash_bytes(packer.bytes())
    }

    /// Seals the block by filling in its hash.
    pub fn seal(mut self) -> Self {
        self.hash = self.compute_hash();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> TrieArchive {
        let trie = PatriciaTrie::new();
        trie.upsert(b"acct", b"5.000000").unwrap();
        TrieArchive::from_trie(&trie).unwrap()
    }

    #[test]
    fn test_archive_roundtrip() {
        let archive = sample_archive();
        let trie = archive.open().unwrap();
        assert_eq!(trie.get(b"acct"), Some(b"5.000000".to_vec()));
        assert_eq!(trie.root_hash(), archive.root);
    }

    #[test]
    fn test_block_hash_covers_state_roots() {
        let block = Block {
            index: 1,
            timestamp: 1_700_000_000,
            proof: 42,
            prev_hash: "prev".to_string(),
            hash: String::new(),
            txs: None,
            balances: Some(sample_archive()),
        }
        .seal();

        let mut altered = block.clone();
        altered.balances = None;
        assert_ne!(altered.compute_hash(), block.hash);

        let mut reproof = block.clone();
        reproof.proof = 43;
        assert_ne!(reproof.compute_hash(), block.hash);

        assert_eq!(block.compute_hash(), block.hash);
    }
}

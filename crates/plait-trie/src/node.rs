//! Trie node representation.
//!
//! A node routes over the sixteen-nibble alphabet through two kinds of
//! edges: plain child slots in `next` (one nibble each) and compressed
//! `encoded_paths` shortcuts (a whole nibble sequence each). `count`
//! tracks the total number of outgoing edges and must stay exact: the
//! hasher keys pruning decisions off it.

use std::collections::BTreeMap;

use crate::codec::{PackError, Packer, Unpacker};
use crate::hash_bytes;

/// The text form of a node's content hash. Empty means "no node".
pub type NodeHash = String;

/// A single trie node.
///
/// Everything the hasher sees lives here; the `hash` field caches the
/// digest of the other fields as of the last [`Node::content_hash`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Terminal value; empty means no value is stored at this node.
    pub value: Vec<u8>,
    /// Child hash per nibble; an empty string means no child there.
    pub next: [NodeHash; 16],
    /// Shortcut edges: nibble sequence to descendant hash.
    ///
    /// A BTreeMap keeps the canonical marshal deterministic and makes
    /// prefix scans resolve ties in lexicographic order.
    pub encoded_paths: BTreeMap<Vec<u8>, NodeHash>,
    /// Number of outgoing edges: occupied `next` slots plus shortcut entries.
    pub count: u32,
    /// Cached content hash of this node.
    pub hash: NodeHash,
}

impl Node {
    /// Creates an empty, unlinked node.
    pub fn new() -> Self {
        Self {
            value: Vec::new(),
            next: std::array::from_fn(|_| NodeHash::new()),
            encoded_paths: BTreeMap::new(),
            count: 0,
            hash: NodeHash::new(),
        }
    }

    /// Returns true if a value is stored at this node.
    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    /// Rewrites the child slot for `nibble`, keeping `count` exact.
    ///
    /// Overwriting an occupied slot with the empty hash drops the edge;
    /// filling an empty slot adds one. Rewrites in place are neutral.
    pub fn set_child(&mut self, nibble: usize, hash: NodeHash) {
        let occupied = !self.next[nibble].is_empty();
        if hash.is_empty() {
            if occupied {
                self.count -= 1;
            }
        } else if !occupied {
            self.count += 1;
        }
        self.next[nibble] = hash;
    }

    /// Rewrites (or removes) the shortcut for `path`, keeping `count` exact.
    pub fn set_encoded_path(&mut self, path: &[u8], hash: NodeHash) {
        if hash.is_empty() {
            if self.encoded_paths.remove(path).is_some() {
                self.count -= 1;
            }
        } else if self.encoded_paths.insert(path.to_vec(), hash).is_none() {
            self.count += 1;
        }
    }

    /// Finds the shortcut whose nibble sequence prefixes `path`.
    ///
    /// Entries are disjoint by construction; scanning in map order makes
    /// any residual tie deterministic. Returns the matched sequence and
    /// the stored descendant hash.
    pub fn matching_encoded_path(&self, path: &[u8]) -> Option<(&[u8], &NodeHash)> {
        self.encoded_paths
            .iter()
            .find(|(seq, _)| path.starts_with(seq))
            .map(|(seq, hash)| (seq.as_slice(), hash))
    }

    /// Content-addresses this node.
    ///
    /// A node with no outgoing edges and no value is dead weight: it
    /// hashes to the empty string, which tells its parent to drop the
    /// edge and `update_hash` to leave it out of the index.
    pub fn content_hash(&self) -> Result<NodeHash, PackError> {
        debug_assert_eq!(
            self.count as usize,
            self.next.iter().filter(|slot| !slot.is_empty()).count() + self.encoded_paths.len(),
            "refcount out of sync with edges"
        );

        if self.count == 0 && self.value.is_empty() {
            return Ok(NodeHash::new());
        }

        let mut packer = Packer::new(128 + self.value.len());
        self.write_canonical(&mut packer);
        if let Some(err) = packer.take_error() {
            return Err(err);
        }
        Ok(hash_bytes(packer.bytes()))
    }

    /// Marshals the logical fields in canonical order.
    ///
    /// Same logical content must always produce identical bytes; the
    /// content hash and the wire record are both built on this.
    pub fn write_canonical(&self, packer: &mut Packer) {
        packer.pack_bytes(&self.value);
        for child in &self.next {
            packer.pack_str(child);
        }
        packer.pack_int(self.encoded_paths.len() as u32);
        for (path, hash) in &self.encoded_paths {
            packer.pack_bytes(path);
            packer.pack_str(hash);
        }
    }

    /// Writes the full wire record: cached hash, refcount, then the
    /// canonical fields.
    pub fn encode(&self, packer: &mut Packer) {
        packer.pack_str(&self.hash);
        packer.pack_int(self.count);
        self.write_canonical(packer);
    }

    /// Reads a wire record written by [`Node::encode`].
    pub fn decode(unpacker: &mut Unpacker<'_>) -> Result<Self, crate::codec::UnpackError> {
        let hash = unpacker.unpack_string()?;
        let count = unpacker.unpack_int()?;
        let value = unpacker.unpack_bytes()?;

        let mut next: [NodeHash; 16] = std::array::from_fn(|_| NodeHash::new());
        for slot in &mut next {
            *slot = unpacker.unpack_string()?;
        }

        let entries = unpacker.unpack_int()?;
        let mut encoded_paths = BTreeMap::new();
        for _ in 0..entries {
            let path = unpacker.unpack_bytes()?;
            let target = unpacker.unpack_string()?;
            encoded_paths.insert(path, target);
        }

        Ok(Self {
            value,
            next,
            encoded_paths,
            count,
            hash,
        })
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refcount_child_slots() {
        let mut node = Node::new();
        assert_eq!(node.count, 0);

        node.set_child(3, "h1".to_string());
        assert_eq!(node.count, 1);

        // Rewrite in place is neutral
        node.set_child(3, "h2".to_string());
        assert_eq!(node.count, 1);

        node.set_child(3, NodeHash::new());
        assert_eq!(node.count, 0);

        // Clearing an empty slot is neutral
        node.set_child(3, NodeHash::new());
        assert_eq!(node.count, 0);
    }

    #[test]
    fn test_refcount_encoded_paths() {
        let mut node = Node::new();

        node.set_encoded_path(&[1, 2, 3], "h1".to_string());
        assert_eq!(node.count, 1);

        node.set_encoded_path(&[1, 2, 3], "h2".to_string());
        assert_eq!(node.count, 1);

        node.set_encoded_path(&[1, 2, 3], NodeHash::new());
        assert_eq!(node.count, 0);
        assert!(node.encoded_paths.is_empty());
    }

    #[test]
    fn test_matching_encoded_path() {
        let mut node = Node::new();
        node.set_encoded_path(&[1, 2], "ab".to_string());
        node.set_encoded_path(&[3, 4, 5], "cd".to_string());

        let (seq, hash) = node.matching_encoded_path(&[1, 2, 9, 9]).unwrap();
        assert_eq!(seq, &[1, 2]);
        assert_eq!(hash, "ab");

        assert!(node.matching_encoded_path(&[1, 9]).is_none());
        assert!(node.matching_encoded_path(&[3, 4]).is_none());
    }

    #[test]
    fn test_empty_node_hashes_to_empty() {
        let node = Node::new();
        assert_eq!(node.content_hash().unwrap(), "");
    }

    #[test]
    fn test_valued_leaf_has_hash() {
        let mut node = Node::new();
        node.value = b"val".to_vec();
        let hash = node.content_hash().unwrap();
        assert!(!hash.is_empty());
    }

    #[test]
    fn test_content_hash_deterministic() {
        let mut a = Node::new();
        a.value = b"v".to_vec();
        a.set_child(7, "child".to_string());
        a.set_encoded_path(&[1, 2], "target".to_string());

        let b = a.clone();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_content_hash_reflects_changes() {
        let mut node = Node::new();
        node.value = b"v1".to_vec();
        let h1 = node.content_hash().unwrap();

        node.value = b"v2".to_vec();
        let h2 = node.content_hash().unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut node = Node::new();
        node.value = b"payload".to_vec();
        node.set_child(0, "zero".to_string());
        node.set_child(15, "fifteen".to_string());
        node.set_encoded_path(&[9, 9, 9], "deep".to_string());
        node.hash = node.content_hash().unwrap();

        let mut packer = Packer::new(256);
        node.encode(&mut packer);

        let bytes = packer.into_bytes();
        let mut unpacker = Unpacker::new(&bytes);
        let decoded = Node::decode(&mut unpacker).unwrap();

        assert_eq!(decoded, node);
        assert!(unpacker.is_empty());
    }
}

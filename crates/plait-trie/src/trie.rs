//! The trie engine: recursive upsert/get/delete, encoded-path shortcut
//! traversal, and the batch compressor.
//!
//! Nodes live in a slot arena and are addressed by integer id; the node
//! index maps a node's current content hash to its id and is reassigned
//! on every structural change. A single reader-writer lock covers the
//! root, the arena and the index: every public operation is one critical
//! section, and the bottom-up passes never release it mid-recursion.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::codec::{PackError, Packer, UnpackError, Unpacker};
use crate::nibbles::Nibbles;
use crate::node::{Node, NodeHash};
use crate::EMPTY_ROOT_HASH;

/// Compression runs once the index has grown by this much since the
/// last fold.
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Trie errors.
#[derive(Debug, Error)]
pub enum TrieError {
    /// Keys must be non-empty byte strings.
    #[error("empty key")]
    EmptyKey,

    /// Canonical serialization failed.
    #[error("marshal failed: {0}")]
    Marshal(#[from] PackError),

    /// A serialized buffer could not be decoded.
    #[error("unmarshal failed: {0}")]
    Unmarshal(#[from] UnpackError),

    /// A referenced node is missing from the index.
    #[error("node not found in index: {0:?}")]
    NodeNotFound(String),
}

type NodeId = usize;

/// Slot arena holding every live node. Ids stay stable for a node's
/// whole lifetime; freed slots are recycled.
#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Arena {
    fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn remove(&mut self, id: NodeId) -> Node {
        let node = self.slots[id].take().expect("removing a live node");
        self.free.push(id);
        node
    }

    fn get(&self, id: NodeId) -> &Node {
        self.slots[id].as_ref().expect("live node")
    }

    fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id].as_mut().expect("live node")
    }
}

/// How to take the next step down from a node.
enum Step {
    /// Follow a shortcut: the matched nibble sequence and its target.
    Shortcut(Vec<u8>, NodeHash),
    /// Follow the occupied child slot for the leading nibble.
    Existing(u8, NodeHash),
    /// No edge matches; a fresh node is needed at the leading nibble.
    Fresh(u8),
}

#[derive(Debug)]
struct TrieInner {
    arena: Arena,
    index: HashMap<NodeHash, NodeId>,
    root: NodeId,
    batch_size: usize,
    last_compression: usize,
}

/// A Merkle Patricia Trie with batch path compression.
///
/// The trie is an authenticated byte-string map: [`root_hash`] commits
/// to the full key-value content, and single-child chains are folded
/// into encoded-path shortcuts once the node index has grown past the
/// configured batch size. Thread-safe; writes are totally ordered and
/// readers only ever observe committed states.
///
/// [`root_hash`]: PatriciaTrie::root_hash
#[derive(Debug)]
pub struct PatriciaTrie {
    inner: RwLock<TrieInner>,
}

impl PatriciaTrie {
    /// Creates an empty trie.
    ///
    /// The root is pinned in the node index under the sentinel hash
    /// `"0"` until the first write gives it real content.
    pub fn new() -> Self {
        let mut arena = Arena::default();
        let mut root_node = Node::new();
        root_node.hash = EMPTY_ROOT_HASH.to_string();
        let root = arena.insert(root_node);

        let mut index = HashMap::new();
        index.insert(EMPTY_ROOT_HASH.to_string(), root);

        Self {
            inner: RwLock::new(TrieInner {
                arena,
                index,
                root,
                batch_size: DEFAULT_BATCH_SIZE,
                last_compression: 0,
            }),
        }
    }

    /// Returns the number of nodes in the index.
    pub fn count(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Returns the Merkle root: the root node's current hash.
    pub fn root_hash(&self) -> NodeHash {
        let inner = self.inner.read();
        inner.arena.get(inner.root).hash.clone()
    }

    /// Sets the index-growth threshold that triggers compression.
    pub fn set_batch_size(&self, batch_size: usize) {
        self.inner.write().batch_size = batch_size;
    }

    /// Gets the value stored under `key`, or `None` if absent.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if key.is_empty() {
            return None;
        }
        let path = Nibbles::from_bytes(key);
        let inner = self.inner.read();
        inner.get_at(inner.root, path.as_slice())
    }

    /// Inserts or updates `key` with `value`.
    ///
    /// An empty value is a delete. When the node index has grown past
    /// the batch size since the last fold, the compressor runs before
    /// returning.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        if key.is_empty() {
            return Err(TrieError::EmptyKey);
        }
        let path = Nibbles::from_bytes(key);
        let mut inner = self.inner.write();
        let root = inner.root;
        inner.upsert_at(root, path.as_slice(), value, true)?;

        if inner.index.len().saturating_sub(inner.last_compression) > inner.batch_size {
            inner.compress();
        }
        Ok(())
    }

    /// Removes `key` and prunes every node the removal empties.
    pub fn delete(&self, key: &[u8]) -> Result<(), TrieError> {
        if key.is_empty() {
            return Err(TrieError::EmptyKey);
        }
        let path = Nibbles::from_bytes(key);
        let mut inner = self.inner.write();
        let root = inner.root;
        inner.upsert_at(root, path.as_slice(), &[], true)?;
        Ok(())
    }

    /// Serializes the trie to an immutable snapshot: the root hash plus
    /// every node in the index.
    pub fn serialize(&self) -> Result<Vec<u8>, TrieError> {
        let inner = self.inner.read();
        let mut packer = Packer::new(128 * inner.index.len());

        packer.pack_str(&inner.arena.get(inner.root).hash);
        packer.pack_int(inner.index.len() as u32);

        // Node order is not semantic; sorting keeps snapshot bytes stable.
        let mut entries: Vec<(&NodeHash, NodeId)> =
            inner.index.iter().map(|(hash, &id)| (hash, id)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (_, id) in entries {
            inner.arena.get(id).encode(&mut packer);
        }

        if let Some(err) = packer.take_error() {
            return Err(err.into());
        }
        Ok(packer.into_bytes())
    }

    /// Replaces this trie's contents with a snapshot produced by
    /// [`PatriciaTrie::serialize`].
    pub fn deserialize(&self, bytes: &[u8]) -> Result<(), TrieError> {
        let mut inner = self.inner.write();
        let mut unpacker = Unpacker::new(bytes);

        let root_hash = unpacker.unpack_string()?;
        let node_count = unpacker.unpack_int()? as usize;

        let mut arena = Arena::default();
        let mut index = HashMap::with_capacity(node_count);
        for _ in 0..node_count {
            let node = Node::decode(&mut unpacker)?;
            let hash = node.hash.clone();
            let id = arena.insert(node);
            index.insert(hash, id);
        }

        let root = *index.get(&root_hash).ok_or_else(|| {
            TrieError::Unmarshal(UnpackError::Malformed(format!(
                "root {root_hash:?} missing from node list"
            )))
        })?;

        inner.arena = arena;
        inner.index = index;
        inner.root = root;
        inner.last_compression = inner.index.len();
        Ok(())
    }

    /// Logs the trie in DFS order at debug level.
    pub fn print(&self) {
        let inner = self.inner.read();
        inner.print_node(inner.root, 0);
    }
}

impl Default for PatriciaTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl TrieInner {
    fn lookup(&self, hash: &NodeHash) -> Result<NodeId, TrieError> {
        self.index
            .get(hash)
            .copied()
            .ok_or_else(|| TrieError::NodeNotFound(hash.clone()))
    }

    fn get_at(&self, id: NodeId, path: &[u8]) -> Option<Vec<u8>> {
        let node = self.arena.get(id);
        if path.is_empty() {
            return node.has_value().then(|| node.value.clone());
        }

        let (next_hash, consumed) =
            if let Some((seq, target)) = node.matching_encoded_path(path) {
                (target.clone(), seq.len())
            } else {
                let slot = &node.next[path[0] as usize];
                if slot.is_empty() {
                    return None;
                }
                (slot.clone(), 1)
            };

        let child = *self.index.get(&next_hash)?;
        self.get_at(child, &path[consumed..])
    }

    /// One bottom-up pass: walk down along `path`, write the value at
    /// the end, then repair edges, refcounts and hashes on the way back
    /// up. Returns this node's new hash for the caller to re-link.
    fn upsert_at(
        &mut self,
        id: NodeId,
        path: &[u8],
        value: &[u8],
        is_root: bool,
    ) -> Result<NodeHash, TrieError> {
        if path.is_empty() {
            self.arena.get_mut(id).value = value.to_vec();
            return self.update_hash(id, is_root);
        }

        let step = {
            let node = self.arena.get(id);
            if let Some((seq, target)) = node.matching_encoded_path(path) {
                Step::Shortcut(seq.to_vec(), target.clone())
            } else {
                let slot = &node.next[path[0] as usize];
                if slot.is_empty() {
                    Step::Fresh(path[0])
                } else {
                    Step::Existing(path[0], slot.clone())
                }
            }
        };

        match step {
            Step::Shortcut(seq, target) => {
                // Shortcuts are rewritten whole; a diverging key falls
                // through to the child slots instead of splitting one.
                let child = self.lookup(&target)?;
                let new_hash = self.upsert_at(child, &path[seq.len()..], value, false)?;
                self.arena.get_mut(id).set_encoded_path(&seq, new_hash);
            }
            Step::Existing(nibble, child_hash) => {
                let child = self.lookup(&child_hash)?;
                let new_hash = self.upsert_at(child, &path[1..], value, false)?;
                self.arena.get_mut(id).set_child(nibble as usize, new_hash);
            }
            Step::Fresh(nibble) => {
                let child = self.arena.insert(Node::new());
                let new_hash = self.upsert_at(child, &path[1..], value, false)?;
                self.arena.get_mut(id).set_child(nibble as usize, new_hash);
            }
        }

        self.update_hash(id, is_root)
    }

    /// Re-addresses a node after mutation: the old index entry goes, the
    /// new one comes in, and a node hashing to nothing is dropped
    /// entirely (the root is pinned instead, whatever its hash).
    fn update_hash(&mut self, id: NodeId, is_root: bool) -> Result<NodeHash, TrieError> {
        let new_hash = self.arena.get(id).content_hash()?;
        let old_hash = std::mem::take(&mut self.arena.get_mut(id).hash);
        self.index.remove(&old_hash);

        if !new_hash.is_empty() || is_root {
            if let Some(displaced) = self.index.insert(new_hash.clone(), id) {
                // Identical content elsewhere in the trie now resolves
                // here; the displaced twin is unreachable by hash. The
                // root keeps its slot either way.
                if displaced != id && displaced != self.root {
                    self.arena.remove(displaced);
                }
            }
        }

        if new_hash.is_empty() && !is_root {
            self.arena.remove(id);
        } else {
            self.arena.get_mut(id).hash = new_hash.clone();
        }
        Ok(new_hash)
    }

    /// Folds single-child chains into encoded-path shortcuts and resets
    /// the compression watermark.
    fn compress(&mut self) {
        let root = self.root;
        self.fold_node(root, 0);
        self.last_compression = self.index.len();
        debug!(nodes = self.last_compression, "compressed node index");
    }

    /// Returns the nibble sequence and terminal hash by which the caller
    /// can reach this node's deepest collapsible descendant, plus the
    /// node's own id when the sequence splices past it. The caller that
    /// installs the spliced shortcut retires that node; until then it
    /// stays wired through its parent slot.
    fn fold_node(&mut self, id: NodeId, nibble: u8) -> (Vec<u8>, NodeHash, Option<NodeId>) {
        let mut folded: Option<(Vec<u8>, NodeHash)> = None;

        for i in 0..16usize {
            let child_hash = self.arena.get(id).next[i].clone();
            if child_hash.is_empty() {
                continue;
            }
            let Some(&child) = self.index.get(&child_hash) else {
                continue;
            };
            let child_has_value = self.arena.get(child).has_value();
            let (seq, target, retired) = self.fold_node(child, i as u8);
            if !seq.is_empty() && !child_has_value {
                // Entries must stay prefix-free or lookups would shadow
                // each other; an overlapping fold leaves the child where
                // it is.
                let overlaps = self
                    .arena
                    .get(id)
                    .encoded_paths
                    .keys()
                    .any(|k| k.starts_with(&seq) || seq.starts_with(k));
                if overlaps {
                    folded = None;
                    continue;
                }
                if let Some(retired) = retired {
                    let removed = self.arena.remove(retired);
                    self.index.remove(&removed.hash);
                }
                let node = self.arena.get_mut(id);
                node.set_encoded_path(&seq, target.clone());
                node.set_child(i, NodeHash::new());
            }
            folded = Some((seq, target));
        }

        let (count, has_value) = {
            let node = self.arena.get(id);
            (node.count, node.has_value())
        };

        if count > 1 {
            // A real branching point: callers cannot collapse past it.
            return (vec![nibble], self.arena.get(id).hash.clone(), None);
        }

        if count == 1 && !has_value && id != self.root {
            // Pass-through node: splice the caller straight to whatever
            // the single surviving edge reaches. Only possible when that
            // edge was walked as a plain child this pass; a lone
            // shortcut edge already is the spliced form.
            if let Some((seq, target)) = folded {
                let mut spliced = Vec::with_capacity(seq.len() + 1);
                spliced.push(nibble);
                spliced.extend_from_slice(&seq);
                return (spliced, target, Some(id));
            }
        }

        (vec![nibble], self.arena.get(id).hash.clone(), None)
    }

    fn print_node(&self, id: NodeId, depth: usize) {
        let node = self.arena.get(id);
        debug!(
            depth,
            hash = %node.hash,
            count = node.count,
            value_len = node.value.len(),
            "node"
        );
        for slot in node.next.iter().filter(|s| !s.is_empty()) {
            if let Some(&child) = self.index.get(slot) {
                self.print_node(child, depth + 1);
            }
        }
        for (seq, target) in &node.encoded_paths {
            debug!(depth, path = %Nibbles::from_nibbles(seq), "encoded path");
            if let Some(&child) = self.index.get(target) {
                self.print_node(child, depth + 1);
            }
        }
    }
}

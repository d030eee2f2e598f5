//! The chain: mining, settlement and state lookups.
//!
//! One write lock orders all chain mutations. Mining settles the open
//! transactions against the newest balance snapshot, carries the full
//! balance state forward into the new block, and seals both state roots
//! into the block hash.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use plait_trie::{PackError, PatriciaTrie, TrieError, UnpackError};

use crate::block::{Block, TrieArchive};
use crate::config::Config;
use crate::transaction::{Transaction, TxStatus};

/// Chain errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A trie operation failed.
    #[error("trie error: {0}")]
    Trie(#[from] TrieError),

    /// Marshalling a transaction failed.
    #[error("marshal failed: {0}")]
    Marshal(#[from] PackError),

    /// A stored transaction could not be decoded.
    #[error("corrupt stored transaction: {0}")]
    CorruptTransaction(#[from] UnpackError),

    /// A stored balance was not a parseable number.
    #[error("corrupt stored balance for {account}: {value:?}")]
    CorruptBalance { account: String, value: String },
}

/// Checks a proof-of-work answer: the hex SHA-256 digest of
/// `"{last_proof}{proof}"` must start with `difficulty` zero digits.
///
/// The input is fully determined by the two proofs, so any node can
/// re-verify a mined block later.
pub fn is_valid_proof(last_proof: u64, proof: u64, difficulty: u32) -> bool {
    let guess = format!("{last_proof}{proof}");
    let digest = hex::encode(Sha256::digest(guess.as_bytes()));
    digest.bytes().take(difficulty as usize).all(|b| b == b'0')
}

fn proof_of_work(last_proof: u64, difficulty: u32) -> u64 {
    let mut proof = 0;
    while !is_valid_proof(last_proof, proof, difficulty) {
        proof += 1;
    }
    proof
}

fn format_balance(value: f64) -> Vec<u8> {
    format!("{value:.6}").into_bytes()
}

fn balance_of(trie: &PatriciaTrie, account: &str) -> Result<f64, ChainError> {
    let Some(bytes) = trie.get(account.as_bytes()) else {
        return Ok(0.0);
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();
    text.parse().map_err(|_| ChainError::CorruptBalance {
        account: account.to_string(),
        value: text,
    })
}

#[derive(Debug)]
struct ChainInner {
    blocks: Vec<Block>,
    open_txs: Vec<Transaction>,
    user: String,
    difficulty: u32,
}

impl ChainInner {
    fn latest(&self) -> &Block {
        self.blocks.last().expect("chain always has a genesis block")
    }

    /// The newest balance snapshot; every block carries the full state,
    /// so the first hit answers any account.
    fn latest_balances(&self) -> Option<&TrieArchive> {
        self.blocks.iter().rev().find_map(|b| b.balances.as_ref())
    }
}

/// The blockchain: a genesis block plus everything mined since.
#[derive(Debug)]
pub struct Blockchain {
    inner: RwLock<ChainInner>,
}

impl Blockchain {
    /// Creates a chain whose genesis block snapshots the configured
    /// initial account balances.
    pub fn new(config: &Config) -> Result<Self, ChainError> {
        let balances = PatriciaTrie::new();
        for account in &config.initial_accounts {
            balances.upsert(account.address.as_bytes(), &format_balance(account.balance))?;
        }

        let genesis = Block {
            index: 0,
            timestamp: now_nanos(),
            proof: 0,
            prev_hash: String::new(),
            hash: String::new(),
            txs: None,
            balances: Some(TrieArchive::from_trie(&balances)?),
        }
        .seal();

        info!(accounts = config.initial_accounts.len(), "created genesis block");
        Ok(Self {
            inner: RwLock::new(ChainInner {
                blocks: vec![genesis],
                open_txs: Vec::new(),
                user: config.user.address.clone(),
                difficulty: 1,
            }),
        })
    }

    /// Queues a transfer from the configured user, returning its id.
    pub fn add_transaction(&self, recipient: &str, amount: f64) -> String {
        let mut inner = self.inner.write();
        let tx = Transaction::new(&inner.user, recipient, amount);
        let id = tx.id.clone();
        debug!(id = %id, recipient, amount, "queued transaction");
        inner.open_txs.push(tx);
        id
    }

    /// Mines the next block: solves proof-of-work, settles every open
    /// transaction, and appends a block carrying the transaction trie
    /// and the carried-forward balance state.
    pub fn mine_block(&self) -> Result<(), ChainError> {
        let (last_proof, difficulty) = {
            let inner = self.inner.read();
            (inner.latest().proof, inner.difficulty)
        };
        let proof = proof_of_work(last_proof, difficulty);

        let mut inner = self.inner.write();

        let balances = match inner.latest_balances() {
            Some(archive) => archive.open()?,
            None => PatriciaTrie::new(),
        };

        let txs = PatriciaTrie::new();
        let mut settled: HashMap<String, f64> = HashMap::new();
        let open = std::mem::take(&mut inner.open_txs);
        let settled_count = open.len();

        for mut tx in open {
            let sender_balance = match settled.get(&tx.sender) {
                Some(balance) => *balance,
                None => balance_of(&balances, &tx.sender)?,
            };
            let recipient_balance = match settled.get(&tx.recipient) {
                Some(balance) => *balance,
                None => balance_of(&balances, &tx.recipient)?,
            };

            if sender_balance >= tx.amount {
                tx.status = TxStatus::Complete;
                settled.insert(tx.sender.clone(), sender_balance - tx.amount);
                settled.insert(tx.recipient.clone(), recipient_balance + tx.amount);
            } else {
                tx.status = TxStatus::Failed;
                debug!(id = %tx.id, "rejected transaction: insufficient funds");
            }
            txs.upsert(tx.id.as_bytes(), &tx.to_bytes()?)?;
        }

        for (account, balance) in &settled {
            balances.upsert(account.as_bytes(), &format_balance(*balance))?;
        }

        let prev = inner.latest();
        let block = Block {
            index: prev.index + 1,
            timestamp: now_nanos(),
            proof,
            prev_hash: prev.hash.clone(),
            hash: String::new(),
            txs: Some(TrieArchive::from_trie(&txs)?),
            balances: Some(TrieArchive::from_trie(&balances)?),
        }
        .seal();

        info!(index = block.index, proof, txs = settled_count, "mined block");
        inner.blocks.push(block);
        Ok(())
    }

    /// Looks a settled transaction up by id, newest block first.
    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, ChainError> {
        let inner = self.inner.read();
        for block in inner.blocks.iter().rev() {
            if let Some(archive) = &block.txs {
                let trie = archive.open()?;
                if let Some(bytes) = trie.get(id.as_bytes()) {
                    return Ok(Some(Transaction::from_bytes(&bytes)?));
                }
            }
        }
        Ok(None)
    }

    /// Returns an account's balance as of the newest snapshot, or 0 for
    /// an account the chain has never seen.
    pub fn get_balance(&self, account: &str) -> Result<f64, ChainError> {
        let inner = self.inner.read();
        match inner.latest_balances() {
            Some(archive) => balance_of(&archive.open()?, account),
            None => Ok(0.0),
        }
    }

    /// Height of the newest block.
    pub fn height(&self) -> u64 {
        self.inner.read().latest().index
    }

    /// Returns a clone of the newest block.
    pub fn latest_block(&self) -> Block {
        self.inner.read().latest().clone()
    }

    /// Number of transactions waiting to be mined.
    pub fn pending_count(&self) -> usize {
        self.inner.read().open_txs.len()
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

//! Transactions and their wire form.
//!
//! A settled transaction is stored as the value under its id in the
//! block's transaction trie, so the wire form uses the same
//! deterministic codec the trie itself marshals with.

use chrono::Utc;

use plait_trie::{hash_bytes, Packer, UnpackError, Unpacker};

/// Where a transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Queued, not yet mined.
    Pending,
    /// Mined and applied to balances.
    Complete,
    /// Mined but rejected for insufficient funds.
    Failed,
}

impl TxStatus {
    fn to_byte(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Complete => 1,
            Self::Failed => 2,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, UnpackError> {
        match byte {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Complete),
            2 => Ok(Self::Failed),
            other => Err(UnpackError::Malformed(format!(
                "unknown transaction status {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single transfer between two accounts.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Content hash of the transfer, assigned at creation.
    pub id: String,
    /// Sending account address.
    pub sender: String,
    /// Receiving account address.
    pub recipient: String,
    /// Transferred amount.
    pub amount: f64,
    /// Creation time, nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Settlement status.
    pub status: TxStatus,
}

impl Transaction {
    /// Creates a pending transaction and derives its id.
    pub fn new(sender: &str, recipient: &str, amount: f64) -> Self {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();

        let mut packer = Packer::new(64);
        packer.pack_str(sender);
        packer.pack_str(recipient);
        packer.pack_long(amount.to_bits());
        packer.pack_long(timestamp as u64);

        Self {
            id: hash_bytes(packer.bytes()),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            timestamp,
            status: TxStatus::Pending,
        }
    }

    /// Marshals the transaction for storage in a transaction trie.
    pub fn to_bytes(&self) -> Result<Vec<u8>, plait_trie::PackError> {
        let mut packer = Packer::new(96);
        packer.pack_str(&self.id);
        packer.pack_str(&self.sender);
        packer.pack_str(&self.recipient);
        packer.pack_long(self.amount.to_bits());
        packer.pack_long(self.timestamp as u64);
        packer.pack_byte(self.status.to_byte());

        if let Some(err) = packer.take_error() {
            return Err(err);
        }
        Ok(packer.into_bytes())
    }

    /// Restores a transaction from its wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnpackError> {
        let mut unpacker = Unpacker::new(bytes);
        let id = unpacker.unpack_string()?;
        let sender = unpacker.unpack_string()?;
        let recipient = unpacker.unpack_string()?;
        let amount = f64::from_bits(unpacker.unpack_long()?);
        let timestamp = unpacker.unpack_long()? as i64;
        let status = TxStatus::from_byte(unpacker.unpack_byte()?)?;

        Ok(Self {
            id,
            sender,
            recipient,
            amount,
            timestamp,
            status,
        })
    }
}

//! Transactions and the participants that stage work inside them
//!
//! Stores keep uncommitted work in a per-transaction overlay keyed by `TxId`.
//! On its first write inside a long-running transaction a store registers
//! itself as a `TransactionParticipant`; `Transaction::commit` then commits
//! every participant in registration order.
//!
//! Short-lived transactions have no overlay: stores apply their writes
//! immediately and reads see committed state only.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Transaction identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(Arc<str>);

impl TxId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Fresh random id
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// A store that holds staged work for a transaction
pub trait TransactionParticipant: Send + Sync {
    /// Identity used to register each store once per transaction
    fn participant_id(&self) -> usize;

    /// Publish the staged work of `tx`
    fn commit(&self, tx: &TxId) -> Result<()>;

    /// Discard the staged work of `tx`
    fn rollback(&self, tx: &TxId) -> Result<()>;
}

/// Unit of isolated work against the indexes
pub struct Transaction {
    id: TxId,
    short_lived: bool,
    read_only: bool,
    state: Mutex<TransactionState>,
    participants: Mutex<Vec<Arc<dyn TransactionParticipant>>>,
}

impl Transaction {
    /// New long-running transaction with a random id
    pub fn new() -> Self {
        Self::with_id(TxId::random())
    }

    /// New long-running transaction with a caller-chosen id
    pub fn with_id(id: TxId) -> Self {
        Self {
            id,
            short_lived: false,
            read_only: false,
            state: Mutex::new(TransactionState::Open),
            participants: Mutex::new(Vec::new()),
        }
    }

    /// Short-lived transaction: writes apply immediately, reads see committed state
    pub fn short_lived() -> Self {
        Self {
            short_lived: true,
            ..Self::new()
        }
    }

    /// Short-lived transaction for queries; the indexes reject its writes
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::short_lived()
        }
    }

    pub fn id(&self) -> &TxId {
        &self.id
    }

    pub fn is_short_lived(&self) -> bool {
        self.short_lived
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == TransactionState::Open
    }

    /// Register a store holding work for this transaction
    ///
    /// Registering the same store twice is a no-op.
    pub fn register(&self, participant: Arc<dyn TransactionParticipant>) {
        let mut participants = self.participants.lock();
        let pid = participant.participant_id();
        if participants.iter().all(|p| p.participant_id() != pid) {
            participants.push(participant);
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    /// Commit every registered participant
    ///
    /// If a participant fails the transaction stays open so it can be rolled back.
    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let participants = self.participants.lock().clone();
        debug!(tx = %self.id, participants = participants.len(), "committing transaction");
        for p in &participants {
            p.commit(&self.id)?;
        }
        *self.state.lock() = TransactionState::Committed;
        Ok(())
    }

    /// Roll back every registered participant
    ///
    /// All participants are attempted; the first error is returned.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        let participants = self.participants.lock().clone();
        debug!(tx = %self.id, participants = participants.len(), "rolling back transaction");
        let mut first_err = None;
        for p in &participants {
            if let Err(e) = p.rollback(&self.id) {
                first_err.get_or_insert(e);
            }
        }
        *self.state.lock() = TransactionState::RolledBack;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::transaction_closed(self.id.as_str()))
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("short_lived", &self.short_lived)
            .field("read_only", &self.read_only)
            .field("state", &self.state())
            .field("participant_count", &self.participant_count())
            .finish()
    }
}

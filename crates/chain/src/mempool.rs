//! Pending transaction queue.

use skipledger_core::{ClientTransaction, Hash};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Default capacity of the pending queue.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MempoolError {
    #[error("mempool is full")]
    Full,

    #[error("transaction {0} is already pending")]
    Duplicate(Hash),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// FIFO queue of submitted transactions awaiting a block.
///
/// Deduplicates by transaction hash while a transaction is queued; once
/// drained into a block the hash may be submitted again (replay
/// protection is the executor's job, via signer counters).
pub struct Mempool {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    queue: VecDeque<ClientTransaction>,
    pending: HashSet<Hash>,
}

impl Mempool {
    /// Create a mempool with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a mempool holding at most `capacity` transactions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                pending: HashSet::new(),
            }),
            capacity,
        }
    }

    /// Queue a transaction.
    pub fn push(&self, tx: ClientTransaction) -> Result<()> {
        let mut inner = self.inner.lock().expect("mempool lock poisoned");
        if inner.queue.len() >= self.capacity {
            return Err(MempoolError::Full);
        }
        let hash = tx.hash();
        if !inner.pending.insert(hash) {
            return Err(MempoolError::Duplicate(hash));
        }
        inner.queue.push_back(tx);
        Ok(())
    }

    /// Take up to `max` transactions in submission order.
    pub fn drain(&self, max: usize) -> Vec<ClientTransaction> {
        let mut inner = self.inner.lock().expect("mempool lock poisoned");
        let count = max.min(inner.queue.len());
        let drained: Vec<ClientTransaction> = inner.queue.drain(..count).collect();
        for tx in &drained {
            inner.pending.remove(&tx.hash());
        }
        drained
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mempool lock poisoned").queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

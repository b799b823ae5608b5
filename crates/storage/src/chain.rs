//! Link storage and chain head management.
//!
//! Links are stored by hash, with an index -> hash pointer per height.
//! Appending a link verifies every back link it carries against what is
//! already stored, then backfills the matching forward link of each
//! target block. Genesis is the exception: its single back link is
//! synthetic and never checked against storage.

use crate::db::{BatchOp, Result, Storage, StorageError};
use skipledger_core::{back_link_count, ChainLink, Hash};
use std::sync::Arc;

/// Key for the chain head pointer.
const CHAIN_HEAD_KEY: &[u8] = b"chain:head";

/// Manages link storage and the chain head.
///
/// Cloning shares the underlying database, so long-lived readers (the
/// pagination tasks) can hold their own handle.
#[derive(Clone)]
pub struct ChainStore {
    storage: Arc<Storage>,
}

impl ChainStore {
    /// Create a new ChainStore wrapping the given storage.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    // =========================================================================
    // Genesis
    // =========================================================================

    /// Initialize the chain with a genesis link. Fails if the link is
    /// not a well-formed genesis or the chain already exists.
    pub fn init_genesis(&self, genesis: &ChainLink) -> Result<()> {
        if genesis.index != 0 {
            return Err(StorageError::InvalidGenesis(
                "genesis link must have index 0".into(),
            ));
        }
        if genesis.back_links.len() != 1 {
            return Err(StorageError::InvalidGenesis(
                "genesis link carries exactly one (synthetic) back link".into(),
            ));
        }
        if self.storage.contains(CHAIN_HEAD_KEY)? {
            return Err(StorageError::AlreadyInitialized);
        }
        self.write_link(genesis, Vec::new())
    }

    /// The chain id: the hash of the genesis link. Unique per chain
    /// thanks to the synthetic back link.
    pub fn chain_id(&self) -> Result<Hash> {
        self.storage
            .get(Storage::link_index_key(0))?
            .ok_or(StorageError::NotInitialized)
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Append a link on top of the current head.
    ///
    /// Verifies the index is head + 1 and that every back link resolves
    /// to the stored link at `index - 2^h`, then writes the link and
    /// backfills `forward_links[h]` of each of those targets, all in
    /// one atomic batch.
    pub fn append(&self, link: &ChainLink) -> Result<()> {
        let head = self.head()?.ok_or(StorageError::NotInitialized)?;
        if link.index != head.index + 1 {
            return Err(StorageError::InvalidLink(format!(
                "expected index {}, got {}",
                head.index + 1,
                link.index
            )));
        }
        let expected = back_link_count(link.index);
        if link.back_links.len() != expected {
            return Err(StorageError::InvalidLink(format!(
                "link at index {} needs {} back links, got {}",
                link.index,
                expected,
                link.back_links.len()
            )));
        }

        let link_hash = link.hash();
        let mut ops = Vec::new();
        for (h, back) in link.back_links.iter().enumerate() {
            let target_index = link.index - (1u64 << h);
            let mut target = self
                .by_index(target_index)?
                .ok_or(StorageError::NotInitialized)?;
            if target.hash() != *back {
                return Err(StorageError::InvalidLink(format!(
                    "back link at height {} does not match link {}",
                    h, target_index
                )));
            }
            // Successors arrive in index order, so heights fill in order
            if target.forward_links.len() != h {
                return Err(StorageError::InvalidLink(format!(
                    "link {} has {} forward links, expected {}",
                    target_index,
                    target.forward_links.len(),
                    h
                )));
            }
            target.forward_links.push(link_hash);
            ops.push(BatchOp::Insert {
                key: Storage::link_hash_key(back),
                value: bincode::serialize(&target)?,
            });
        }
        self.write_link(link, ops)
    }

    fn write_link(&self, link: &ChainLink, mut ops: Vec<BatchOp>) -> Result<()> {
        let hash = link.hash();
        ops.push(BatchOp::Insert {
            key: Storage::link_hash_key(&hash),
            value: bincode::serialize(link)?,
        });
        ops.push(BatchOp::Insert {
            key: Storage::link_index_key(link.index),
            value: bincode::serialize(&hash)?,
        });
        ops.push(BatchOp::Insert {
            key: CHAIN_HEAD_KEY.to_vec(),
            value: bincode::serialize(&hash)?,
        });
        self.storage.batch(ops)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Get a link by its hash.
    pub fn by_hash(&self, hash: &Hash) -> Result<Option<ChainLink>> {
        self.storage.get(Storage::link_hash_key(hash))
    }

    /// Get a link by its chain index (two lookups: index -> hash ->
    /// link).
    pub fn by_index(&self, index: u64) -> Result<Option<ChainLink>> {
        match self.storage.get::<_, Hash>(Storage::link_index_key(index))? {
            Some(hash) => self.by_hash(&hash),
            None => Ok(None),
        }
    }

    /// Whether a link with this hash is stored.
    pub fn contains(&self, hash: &Hash) -> Result<bool> {
        self.storage.contains(Storage::link_hash_key(hash))
    }

    /// The current head link, if the chain is initialized.
    pub fn head(&self) -> Result<Option<ChainLink>> {
        match self.storage.get::<_, Hash>(CHAIN_HEAD_KEY)? {
            Some(hash) => self.by_hash(&hash),
            None => Ok(None),
        }
    }
}

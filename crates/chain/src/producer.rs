//! Block production: execute, sign, seal.

use crate::executor::Executor;
use crate::signer::{CollectiveSigner, SigningError};
use skipledger_core::{
    back_link_count, ChainLink, ClientTransaction, Hash, Roster, TxResult,
};
use skipledger_state::{Snapshot, StagedStore};
use skipledger_storage::{ChainStore, StorageError};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort a whole proposal. The proposal is discarded and
/// no state is changed.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("missing ancestor at index {0}")]
    MissingAncestor(u64),
}

pub type Result<T> = std::result::Result<T, ProduceError>;

/// A signed block together with the snapshot it commits to. The caller
/// appends the link and installs the snapshot under its commit lock.
pub struct Proposal {
    pub link: ChainLink,
    pub snapshot: Snapshot,
}

/// Turns transaction batches into collectively signed chain links.
pub struct BlockProducer {
    executor: Executor,
    signer: Arc<dyn CollectiveSigner>,
    roster: Roster,
}

impl BlockProducer {
    pub fn new(executor: Executor, signer: Arc<dyn CollectiveSigner>, roster: Roster) -> Self {
        Self {
            executor,
            signer,
            roster,
        }
    }

    /// Build and sign the next link on top of `head`.
    ///
    /// Transactions execute in submission order against `base`. A
    /// failing transaction does not abort the block: it is recorded in
    /// the payload with `accepted = false` and its effects are rolled
    /// back. Follow-up transactions returned by contracts are appended
    /// to the end of the batch.
    pub fn produce(
        &self,
        base: Arc<Snapshot>,
        head: &ChainLink,
        chain: &ChainStore,
        transactions: Vec<ClientTransaction>,
    ) -> Result<Proposal> {
        let mut staged = StagedStore::new(base);
        let mut queue: VecDeque<ClientTransaction> = transactions.into();
        let mut payload = Vec::new();

        while let Some(tx) = queue.pop_front() {
            let tx_hash = tx.hash();
            match self.executor.execute(&mut staged, &tx) {
                Ok(followups) => {
                    queue.extend(followups);
                    payload.push(TxResult::new(tx, true));
                }
                Err(err) => {
                    tracing::debug!(tx = %tx_hash, %err, "transaction rejected");
                    payload.push(TxResult::new(tx, false));
                }
            }
        }

        let snapshot = staged.into_snapshot();
        let index = head.index + 1;
        let mut link = ChainLink::new(
            index,
            payload,
            snapshot.root(),
            self.back_links(chain, head, index)?,
        );
        link.signature = self.signer.sign(&link.hash(), &self.roster)?;
        Ok(Proposal { link, snapshot })
    }

    /// Back links for a link at `index`: the head at height 0, stored
    /// ancestors at the higher heights.
    fn back_links(&self, chain: &ChainStore, head: &ChainLink, index: u64) -> Result<Vec<Hash>> {
        let mut links = vec![head.hash()];
        for h in 1..back_link_count(index) {
            let target = index - (1u64 << h);
            let ancestor = chain
                .by_index(target)?
                .ok_or(ProduceError::MissingAncestor(target))?;
            links.push(ancestor.hash());
        }
        Ok(links)
    }
}

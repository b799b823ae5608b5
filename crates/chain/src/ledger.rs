//! The ledger facade: store, chain, mempool and producer in one place.

use crate::executor::Executor;
use crate::mempool::{Mempool, MempoolError};
use crate::paginate::{paginate, Canceler, PaginateRequest, PaginateResponse};
use crate::producer::{BlockProducer, ProduceError};
use crate::signer::CollectiveSigner;
use skipledger_contracts::{ContractRegistry, Darc};
use skipledger_core::{
    ChainLink, ClientTransaction, Hash, Identity, InstanceID, InstructionError, Roster,
};
use skipledger_state::{AuthenticatedStore, Proof, Snapshot, StagedStore, StateChange, StoreView};
use skipledger_storage::{ChainStore, Storage, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

/// Most transactions drained into one block.
const MAX_BLOCK_TXS: usize = 256;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Produce(#[from] ProduceError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Instruction(#[from] InstructionError),

    #[error("no block with hash {0}")]
    UnknownBlock(Hash),

    #[error(transparent)]
    State(#[from] skipledger_state::StateError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// What the genesis block starts from: one admin identity and the
/// actions its darc grants.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
    pub admin: Identity,
    pub description: String,
    pub actions: Vec<String>,
}

impl GenesisConfig {
    /// Grant the admin the standard actions of the built-in contracts.
    pub fn new(admin: Identity) -> Self {
        Self {
            admin,
            description: "genesis darc".into(),
            actions: [
                "spawn:darc",
                "spawn:value",
                "invoke:value.update",
                "delete:value",
                "spawn:credential",
                "invoke:credential.update",
                "delete:credential",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// One ledger node's view of the world.
///
/// The store's current-snapshot pointer is the only shared mutable
/// state; `produce_block` serializes commits through a lock, readers
/// take snapshot references and never block. Every committed block's
/// snapshot is archived by block hash so proofs can be generated
/// against historical state roots.
pub struct Ledger {
    store: AuthenticatedStore,
    chain: ChainStore,
    producer: BlockProducer,
    mempool: Mempool,
    genesis_darc_id: InstanceID,
    commit: Mutex<()>,
    archive: RwLock<HashMap<Hash, Arc<Snapshot>>>,
}

impl Ledger {
    /// Create a fresh ledger: build the genesis darc, commit the first
    /// snapshot and write the genesis link.
    pub fn new(
        storage: Arc<Storage>,
        registry: ContractRegistry,
        signer: Arc<dyn CollectiveSigner>,
        roster: Roster,
        genesis: GenesisConfig,
    ) -> Result<Self> {
        let actions: Vec<&str> = genesis.actions.iter().map(String::as_str).collect();
        let darc = Darc::granting(genesis.description.clone(), genesis.admin, &actions);
        let genesis_darc_id = darc.base_id();

        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged.apply(StateChange::Create {
            id: genesis_darc_id,
            contract_id: skipledger_contracts::CONTRACT_DARC.into(),
            darc_id: genesis_darc_id,
            value: darc.encode(),
        })?;
        let snapshot = Arc::new(staged.into_snapshot());

        let chain = ChainStore::new(storage);
        let link = ChainLink::genesis(snapshot.root());
        chain.init_genesis(&link)?;

        let store = AuthenticatedStore::new();
        store.commit(Arc::clone(&snapshot));
        let archive = RwLock::new(HashMap::from([(link.hash(), snapshot)]));

        tracing::info!(
            chain_id = %link.hash(),
            darc = %genesis_darc_id,
            "ledger initialized"
        );

        Ok(Self {
            store,
            chain,
            producer: BlockProducer::new(Executor::new(registry), signer, roster),
            mempool: Mempool::new(),
            genesis_darc_id,
            commit: Mutex::new(()),
            archive,
        })
    }

    /// The chain id: the genesis link's hash.
    pub fn chain_id(&self) -> Result<Hash> {
        Ok(self.chain.chain_id()?)
    }

    /// The instance id of the genesis darc.
    pub fn genesis_darc_id(&self) -> InstanceID {
        self.genesis_darc_id
    }

    /// Accept a transaction into the mempool after structural
    /// validation. Inclusion is only guaranteed once a later proof
    /// confirms it.
    pub fn submit(&self, tx: ClientTransaction) -> Result<()> {
        tx.validate()?;
        self.mempool.push(tx)?;
        Ok(())
    }

    /// Drain the mempool and commit the next block.
    ///
    /// Returns `None` when there was nothing to do. On signing failure
    /// the drained transactions are discarded and no state changes.
    pub fn produce_block(&self) -> Result<Option<ChainLink>> {
        let transactions = self.mempool.drain(MAX_BLOCK_TXS);
        if transactions.is_empty() {
            return Ok(None);
        }

        let _guard = self.commit.lock().expect("commit lock poisoned");
        let head = self.chain.head()?.ok_or(StorageError::NotInitialized)?;
        let base = self.store.snapshot();
        let proposal = self
            .producer
            .produce(base, &head, &self.chain, transactions)?;

        let link = proposal.link;
        let snapshot = Arc::new(proposal.snapshot);
        self.chain.append(&link)?;
        self.archive
            .write()
            .expect("archive lock poisoned")
            .insert(link.hash(), Arc::clone(&snapshot));
        self.store.commit(snapshot);

        tracing::info!(
            index = link.index,
            txs = link.tx_count(),
            root = %link.state_root,
            "committed block"
        );
        Ok(Some(link))
    }

    /// Look up a live entry in the current state.
    pub fn get(&self, id: &InstanceID) -> Option<skipledger_state::StoreEntry> {
        self.store.get(id)
    }

    /// Last recorded replay counter for a signer.
    pub fn counter(&self, signer: &Identity) -> u64 {
        self.store.snapshot().counter(signer)
    }

    /// Proof for `id` against the current head, together with the head
    /// link the proof verifies under.
    pub fn proof(&self, id: &InstanceID) -> Result<(Proof, ChainLink)> {
        let head = self.chain.head()?.ok_or(StorageError::NotInitialized)?;
        let proof = self.proof_at(&head.hash(), id)?;
        Ok((proof, head))
    }

    /// Proof for `id` against the state root of a specific block.
    pub fn proof_at(&self, block_hash: &Hash, id: &InstanceID) -> Result<Proof> {
        let snapshot = self
            .archive
            .read()
            .expect("archive lock poisoned")
            .get(block_hash)
            .cloned()
            .ok_or(LedgerError::UnknownBlock(*block_hash))?;
        Ok(snapshot.proof(id))
    }

    /// The current head link.
    pub fn head(&self) -> Result<ChainLink> {
        Ok(self.chain.head()?.ok_or(StorageError::NotInitialized)?)
    }

    /// A block by hash.
    pub fn block(&self, hash: &Hash) -> Result<Option<ChainLink>> {
        Ok(self.chain.by_hash(hash)?)
    }

    /// Stream a range of blocks; see [`crate::paginate`].
    pub fn paginate(
        &self,
        request: PaginateRequest,
    ) -> (mpsc::Receiver<PaginateResponse>, Canceler) {
        paginate(self.chain.clone(), request)
    }
}

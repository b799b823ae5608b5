//! Snapshot-based authenticated store.
//!
//! A [`Snapshot`] is immutable and carries its canonical root. A
//! [`StagedStore`] overlays pending changes on a snapshot without
//! touching it; materializing the overlay yields the next snapshot. The
//! [`AuthenticatedStore`] only ever swaps one `Arc` pointer on commit,
//! so concurrent readers always see a fully committed snapshot.

use crate::change::StateChange;
use crate::proof::{leaf_hash, state_commitment, Proof, ProofLeaf};
use skipledger_core::{Hash, Identity, InstanceID, MerkleTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Invalid state changes. All variants are integrity errors: the
/// transaction that produced them is rolled back.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid state change: create on live instance {0}")]
    CreateOnLive(InstanceID),

    #[error("invalid state change: update on missing instance {0}")]
    UpdateOnMissing(InstanceID),

    #[error("invalid state change: remove on missing instance {0}")]
    RemoveOnMissing(InstanceID),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// One live entry of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Contract kind governing this instance.
    pub contract_id: String,
    /// Instance id of the darc that authorizes mutations.
    pub darc_id: InstanceID,
    /// Raw contract-defined value.
    pub value: Vec<u8>,
    /// Bumped by exactly one on every mutation of this id.
    pub version: u64,
}

/// Read-only view of the store, as seen by contracts.
///
/// During execution this is the staged view: instructions within one
/// transaction observe each other's uncommitted effects in sequence.
pub trait StoreView {
    /// Look up a live entry.
    fn get_entry(&self, id: &InstanceID) -> Option<&StoreEntry>;

    /// Last seen replay counter for a signer (0 if never seen).
    fn counter(&self, signer: &Identity) -> u64;
}

/// An immutable, committed store state with its canonical root.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: BTreeMap<InstanceID, StoreEntry>,
    counters: BTreeMap<Identity, u64>,
    /// Last version of removed ids, so a version sequence is never
    /// restarted by a later re-create.
    tombstones: BTreeMap<InstanceID, u64>,
    root: Hash,
}

impl Snapshot {
    /// The empty snapshot.
    pub fn empty() -> Self {
        Self::build(BTreeMap::new(), BTreeMap::new(), BTreeMap::new())
    }

    fn build(
        entries: BTreeMap<InstanceID, StoreEntry>,
        counters: BTreeMap<Identity, u64>,
        tombstones: BTreeMap<InstanceID, u64>,
    ) -> Self {
        let leaves: Vec<Hash> = entries
            .iter()
            .map(|(id, e)| leaf_hash(id, &e.contract_id, &e.darc_id, e.version, &e.value))
            .collect();
        let root = state_commitment(&MerkleTree::new(&leaves).root(), leaves.len() as u64);
        Self {
            entries,
            counters,
            tombstones,
            root,
        }
    }

    /// The authenticated digest of this snapshot: the merkle root over
    /// the entry leaves, committed together with the leaf count.
    ///
    /// Canonical: entries are hashed in key order, so the root is
    /// independent of insertion order.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no live entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generate a proof of inclusion or exclusion for `id`, relative to
    /// this snapshot's root.
    ///
    /// Deterministic: repeated calls return identical proofs.
    pub fn proof(&self, id: &InstanceID) -> Proof {
        let ids: Vec<&InstanceID> = self.entries.keys().collect();
        let leaves: Vec<Hash> = self
            .entries
            .iter()
            .map(|(id, e)| leaf_hash(id, &e.contract_id, &e.darc_id, e.version, &e.value))
            .collect();
        let tree = MerkleTree::new(&leaves);

        let make_leaf = |pos: usize| -> (ProofLeaf, skipledger_core::MerklePath) {
            let leaf_id = *ids[pos];
            let entry = &self.entries[&leaf_id];
            let leaf = ProofLeaf {
                id: leaf_id,
                contract_id: entry.contract_id.clone(),
                darc_id: entry.darc_id,
                version: entry.version,
                value: entry.value.clone(),
            };
            let path = tree.path(pos).expect("position is in range");
            (leaf, path)
        };

        match ids.binary_search(&id) {
            Ok(pos) => {
                let (leaf, path) = make_leaf(pos);
                Proof::Inclusion {
                    leaf,
                    path,
                    leaf_count: ids.len(),
                }
            }
            Err(pos) => Proof::Exclusion {
                left: (pos > 0).then(|| make_leaf(pos - 1)),
                right: (pos < ids.len()).then(|| make_leaf(pos)),
                leaf_count: ids.len(),
            },
        }
    }
}

impl StoreView for Snapshot {
    fn get_entry(&self, id: &InstanceID) -> Option<&StoreEntry> {
        self.entries.get(id)
    }

    fn counter(&self, signer: &Identity) -> u64 {
        self.counters.get(signer).copied().unwrap_or(0)
    }
}

/// Pending changes staged on top of a snapshot.
///
/// Staging is pure: the base snapshot is never modified. Cloning a
/// staged store forks the overlay, which is how per-transaction
/// rollback works: on failure the fork is simply dropped.
#[derive(Debug, Clone)]
pub struct StagedStore {
    base: Arc<Snapshot>,
    /// Overlay: `Some` = created/updated, `None` = removed.
    entries: BTreeMap<InstanceID, Option<StoreEntry>>,
    counters: BTreeMap<Identity, u64>,
    tombstones: BTreeMap<InstanceID, u64>,
}

impl StagedStore {
    /// Start staging on top of a snapshot.
    pub fn new(base: Arc<Snapshot>) -> Self {
        Self {
            base,
            entries: BTreeMap::new(),
            counters: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }

    /// Apply one state change to the overlay.
    pub fn apply(&mut self, change: StateChange) -> Result<()> {
        match change {
            StateChange::Create {
                id,
                contract_id,
                darc_id,
                value,
            } => {
                if self.get_entry(&id).is_some() {
                    return Err(StateError::CreateOnLive(id));
                }
                // A re-created id continues its old version sequence
                let version = match self.tombstone(&id) {
                    Some(last) => last + 1,
                    None => 0,
                };
                self.tombstones.remove(&id);
                self.entries.insert(
                    id,
                    Some(StoreEntry {
                        contract_id,
                        darc_id,
                        value,
                        version,
                    }),
                );
            }
            StateChange::Update { id, value } => {
                let current = self
                    .get_entry(&id)
                    .ok_or(StateError::UpdateOnMissing(id))?;
                let next = StoreEntry {
                    contract_id: current.contract_id.clone(),
                    darc_id: current.darc_id,
                    value,
                    version: current.version + 1,
                };
                self.entries.insert(id, Some(next));
            }
            StateChange::Remove { id } => {
                let current = self
                    .get_entry(&id)
                    .ok_or(StateError::RemoveOnMissing(id))?;
                self.tombstones.insert(id, current.version);
                self.entries.insert(id, None);
            }
        }
        Ok(())
    }

    /// Apply a batch of changes, stopping at the first failure.
    pub fn apply_all(&mut self, changes: Vec<StateChange>) -> Result<()> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    /// Record a signer's replay counter.
    pub fn set_counter(&mut self, signer: Identity, value: u64) {
        self.counters.insert(signer, value);
    }

    /// Materialize the overlay into the next snapshot.
    pub fn into_snapshot(self) -> Snapshot {
        let mut entries = self.base.entries.clone();
        for (id, slot) in self.entries {
            match slot {
                Some(entry) => {
                    entries.insert(id, entry);
                }
                None => {
                    entries.remove(&id);
                }
            }
        }

        let mut counters = self.base.counters.clone();
        counters.extend(self.counters);

        let mut tombstones = self.base.tombstones.clone();
        for id in entries.keys() {
            tombstones.remove(id);
        }
        tombstones.extend(self.tombstones);

        Snapshot::build(entries, counters, tombstones)
    }

    fn tombstone(&self, id: &InstanceID) -> Option<u64> {
        self.tombstones
            .get(id)
            .or_else(|| self.base.tombstones.get(id))
            .copied()
    }
}

impl StoreView for StagedStore {
    fn get_entry(&self, id: &InstanceID) -> Option<&StoreEntry> {
        match self.entries.get(id) {
            Some(slot) => slot.as_ref(),
            None => self.base.entries.get(id),
        }
    }

    fn counter(&self, signer: &Identity) -> u64 {
        self.counters
            .get(signer)
            .copied()
            .unwrap_or_else(|| self.base.counter(signer))
    }
}

/// The shared store: one atomically swapped current-snapshot pointer.
pub struct AuthenticatedStore {
    current: RwLock<Arc<Snapshot>>,
}

impl AuthenticatedStore {
    /// Create a store holding the empty snapshot.
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::empty())
    }

    /// Create a store holding the given snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Take a reference to the current snapshot. The reference stays
    /// valid across later commits (readers never block writers).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().expect("store lock poisoned"))
    }

    /// Start staging changes on the current snapshot.
    pub fn stage(&self) -> StagedStore {
        StagedStore::new(self.snapshot())
    }

    /// Atomically install a new current snapshot.
    ///
    /// Callers serialize commits (the block producer holds a commit
    /// lock); this swap only guarantees readers never observe a store
    /// mid-mutation.
    pub fn commit(&self, next: Arc<Snapshot>) {
        *self.current.write().expect("store lock poisoned") = next;
    }

    /// Root of the current snapshot.
    pub fn root(&self) -> Hash {
        self.snapshot().root()
    }

    /// Look up a live entry in the current snapshot.
    pub fn get(&self, id: &InstanceID) -> Option<StoreEntry> {
        self.snapshot().get_entry(id).cloned()
    }

    /// Proof for `id` against the current snapshot.
    pub fn proof(&self, id: &InstanceID) -> Proof {
        self.snapshot().proof(id)
    }
}

impl Default for AuthenticatedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iid(n: u8) -> InstanceID {
        InstanceID([n; 32])
    }

    fn create(n: u8, value: &[u8]) -> StateChange {
        StateChange::Create {
            id: iid(n),
            contract_id: "value".into(),
            darc_id: iid(0xD0),
            value: value.to_vec(),
        }
    }

    #[test]
    fn test_empty_snapshot_root() {
        // The empty store commits a zero merkle root and a zero count
        assert_eq!(
            Snapshot::empty().root(),
            state_commitment(&Hash::ZERO, 0)
        );
    }

    #[test]
    fn test_create_and_get() {
        let store = AuthenticatedStore::new();
        let mut staged = store.stage();
        staged.apply(create(1, b"hello")).unwrap();
        store.commit(Arc::new(staged.into_snapshot()));

        let entry = store.get(&iid(1)).unwrap();
        assert_eq!(entry.value, b"hello");
        assert_eq!(entry.contract_id, "value");
        assert_eq!(entry.version, 0);
    }

    #[test]
    fn test_version_increments_by_one() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged.apply(create(1, b"v0")).unwrap();
        staged
            .apply(StateChange::Update {
                id: iid(1),
                value: b"v1".to_vec(),
            })
            .unwrap();
        staged
            .apply(StateChange::Update {
                id: iid(1),
                value: b"v2".to_vec(),
            })
            .unwrap();

        let snapshot = staged.into_snapshot();
        let entry = snapshot.get_entry(&iid(1)).unwrap();
        assert_eq!(entry.version, 2);
        assert_eq!(entry.value, b"v2");
    }

    #[test]
    fn test_create_on_live_fails() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged.apply(create(1, b"a")).unwrap();
        assert!(matches!(
            staged.apply(create(1, b"b")),
            Err(StateError::CreateOnLive(_))
        ));
    }

    #[test]
    fn test_update_missing_fails() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        assert!(matches!(
            staged.apply(StateChange::Update {
                id: iid(1),
                value: vec![],
            }),
            Err(StateError::UpdateOnMissing(_))
        ));
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        assert!(matches!(
            staged.apply(StateChange::Remove { id: iid(1) }),
            Err(StateError::RemoveOnMissing(_))
        ));
    }

    #[test]
    fn test_remove_then_recreate_continues_versions() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged.apply(create(1, b"v0")).unwrap();
        staged
            .apply(StateChange::Update {
                id: iid(1),
                value: b"v1".to_vec(),
            })
            .unwrap();
        staged.apply(StateChange::Remove { id: iid(1) }).unwrap();
        let snapshot = Arc::new(staged.into_snapshot());
        assert!(snapshot.get_entry(&iid(1)).is_none());

        // Re-creating the id must not restart its version sequence
        let mut staged = StagedStore::new(snapshot);
        staged.apply(create(1, b"reborn")).unwrap();
        let snapshot = staged.into_snapshot();
        assert_eq!(snapshot.get_entry(&iid(1)).unwrap().version, 2);
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let mut a = StagedStore::new(Arc::new(Snapshot::empty()));
        a.apply(create(1, b"one")).unwrap();
        a.apply(create(2, b"two")).unwrap();
        a.apply(create(3, b"three")).unwrap();

        let mut b = StagedStore::new(Arc::new(Snapshot::empty()));
        b.apply(create(3, b"three")).unwrap();
        b.apply(create(1, b"one")).unwrap();
        b.apply(create(2, b"two")).unwrap();

        assert_eq!(a.into_snapshot().root(), b.into_snapshot().root());
    }

    #[test]
    fn test_root_changes_with_state() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged.apply(create(1, b"one")).unwrap();
        let s1 = Arc::new(staged.into_snapshot());

        let mut staged = StagedStore::new(Arc::clone(&s1));
        staged
            .apply(StateChange::Update {
                id: iid(1),
                value: b"other".to_vec(),
            })
            .unwrap();
        let s2 = staged.into_snapshot();

        assert_ne!(s1.root(), s2.root());
    }

    #[test]
    fn test_staging_does_not_touch_base() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged.apply(create(1, b"one")).unwrap();
        let base = Arc::new(staged.into_snapshot());
        let base_root = base.root();

        let mut staged = StagedStore::new(Arc::clone(&base));
        staged.apply(StateChange::Remove { id: iid(1) }).unwrap();
        staged.apply(create(2, b"two")).unwrap();
        assert!(staged.get_entry(&iid(1)).is_none());
        assert!(staged.get_entry(&iid(2)).is_some());

        // Base unchanged until a commit installs the new snapshot
        assert_eq!(base.root(), base_root);
        assert!(base.get_entry(&iid(1)).is_some());
    }

    #[test]
    fn test_snapshot_isolation_across_commit() {
        let store = AuthenticatedStore::new();
        let mut staged = store.stage();
        staged.apply(create(1, b"one")).unwrap();
        store.commit(Arc::new(staged.into_snapshot()));

        let before = store.snapshot();

        let mut staged = store.stage();
        staged
            .apply(StateChange::Update {
                id: iid(1),
                value: b"changed".to_vec(),
            })
            .unwrap();
        store.commit(Arc::new(staged.into_snapshot()));

        // The old reference still reads the old state
        assert_eq!(before.get_entry(&iid(1)).unwrap().value, b"one");
        assert_eq!(store.get(&iid(1)).unwrap().value, b"changed");
    }

    #[test]
    fn test_counters_survive_materialization() {
        let signer = Identity([7; 32]);
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        assert_eq!(staged.counter(&signer), 0);
        staged.set_counter(signer, 1);
        assert_eq!(staged.counter(&signer), 1);

        let snapshot = Arc::new(staged.into_snapshot());
        assert_eq!(snapshot.counter(&signer), 1);

        let staged = StagedStore::new(snapshot);
        assert_eq!(staged.counter(&signer), 1);
    }
}

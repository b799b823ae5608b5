//! Versioned, authenticated key-value store for skipledger.
//!
//! The store is a chain of immutable snapshots: contract execution
//! stages changes onto an overlay, the overlay materializes into the
//! next snapshot, and a commit atomically swaps the current-snapshot
//! pointer. Every snapshot has a canonical merkle root over its
//! entries, and proofs of inclusion or exclusion verify offline against
//! that root.

pub mod change;
pub mod proof;
pub mod store;

// Re-export commonly used types
pub use change::StateChange;
pub use proof::{Proof, ProofError, ProofLeaf};
pub use store::{
    AuthenticatedStore, Snapshot, StagedStore, StateError, StoreEntry, StoreView,
};

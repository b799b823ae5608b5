//! Persistent storage for skipledger.
//!
//! A thin sled wrapper ([`Storage`]) plus the [`ChainStore`], which
//! appends chain links, verifies their skip links on the way in and
//! backfills the matching forward links of earlier blocks.

pub mod chain;
pub mod db;

// Re-export commonly used types
pub use chain::ChainStore;
pub use db::{BatchOp, Result, Storage, StorageError};

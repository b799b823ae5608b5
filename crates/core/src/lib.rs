//! Core ledger primitives for skipledger.
//!
//! This crate provides the fundamental types used throughout the ledger:
//! - Cryptographic primitives (hashing, signing, identities)
//! - Instructions and client transactions
//! - Chain links (blocks with multi-height skip links)
//! - Merkle trees
//! - Rosters and collective signatures

pub mod block;
pub mod crypto;
pub mod hash;
pub mod instruction;
pub mod merkle;
pub mod roster;

// Re-export commonly used types at the crate root
pub use block::{back_link_count, ChainLink, TxResult, MAX_LINK_HEIGHT};
pub use crypto::{CryptoError, Identity, Keypair, Signature};
pub use hash::{hash, hash_concat, Hash, H256};
pub use instruction::{
    Argument, ClientTransaction, InstanceID, Instruction, InstructionError, InstructionKind,
};
pub use merkle::{merkle_root, path_root, verify_path, MerklePath, MerkleTree};
pub use roster::{CollectiveSignature, Roster, RosterError};

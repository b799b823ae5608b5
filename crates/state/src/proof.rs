//! Inclusion and exclusion proofs against a snapshot root.
//!
//! An inclusion proof carries the full leaf (id, contract, darc,
//! version, value) and its authentication path. An exclusion proof
//! carries the would-be neighbors of the absent key in the canonical
//! leaf order, proving there is no room for it: the two neighbor leaves
//! verify against the root, sit at adjacent indices, and bracket the
//! key. Both verify offline against a block's state root.
//!
//! The state root commits to the merkle root and the leaf count
//! together, so boundary checks against the count ("this is the last
//! leaf") hold without trusting the responder's claimed count.

use skipledger_core::{hash_concat, path_root, Hash, InstanceID, MerklePath};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proof verification failures.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("proof is for instance {proven}, not {requested}")]
    WrongInstance {
        proven: InstanceID,
        requested: InstanceID,
    },

    #[error("authentication path does not match the root")]
    BadPath,

    #[error("neighbor leaves do not bracket the key")]
    BadNeighbors,

    #[error("neighbor leaves are not adjacent")]
    NotAdjacent,

    #[error("exclusion proof inconsistent with leaf count {0}")]
    BadLeafCount(usize),
}

/// The published state root: merkle root and leaf count, committed
/// together. The empty store commits `(Hash::ZERO, 0)`.
pub(crate) fn state_commitment(merkle_root: &Hash, leaf_count: u64) -> Hash {
    hash_concat(&[merkle_root.as_ref(), &leaf_count.to_le_bytes()])
}

/// Canonical leaf hash of one store entry.
pub(crate) fn leaf_hash(
    id: &InstanceID,
    contract_id: &str,
    darc_id: &InstanceID,
    version: u64,
    value: &[u8],
) -> Hash {
    hash_concat(&[
        id.as_ref(),
        contract_id.as_bytes(),
        darc_id.as_ref(),
        &version.to_le_bytes(),
        value,
    ])
}

/// A fully materialized store leaf inside a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofLeaf {
    pub id: InstanceID,
    pub contract_id: String,
    pub darc_id: InstanceID,
    pub version: u64,
    pub value: Vec<u8>,
}

impl ProofLeaf {
    /// The leaf's canonical hash.
    pub fn hash(&self) -> Hash {
        leaf_hash(
            &self.id,
            &self.contract_id,
            &self.darc_id,
            self.version,
            &self.value,
        )
    }
}

/// Proof that a key is present in, or absent from, a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proof {
    /// The key is present with this leaf.
    Inclusion {
        leaf: ProofLeaf,
        path: MerklePath,
        /// Total leaves in the snapshot; part of the root commitment.
        leaf_count: usize,
    },
    /// The key is absent; its would-be neighbors prove it.
    Exclusion {
        /// Greatest leaf below the key, if any.
        left: Option<(ProofLeaf, MerklePath)>,
        /// Smallest leaf above the key, if any.
        right: Option<(ProofLeaf, MerklePath)>,
        /// Total leaves in the snapshot (0 means the store was empty);
        /// part of the root commitment.
        leaf_count: usize,
    },
}

impl Proof {
    /// Whether this proof shows the key as present.
    pub fn matches(&self, id: &InstanceID) -> bool {
        matches!(self, Proof::Inclusion { leaf, .. } if leaf.id == *id)
    }

    /// The proven value, for inclusion proofs.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Proof::Inclusion { leaf, .. } => Some(&leaf.value),
            Proof::Exclusion { .. } => None,
        }
    }

    /// The proven contract id, for inclusion proofs.
    pub fn contract_id(&self) -> Option<&str> {
        match self {
            Proof::Inclusion { leaf, .. } => Some(&leaf.contract_id),
            Proof::Exclusion { .. } => None,
        }
    }

    /// The proven governing darc, for inclusion proofs.
    pub fn darc_id(&self) -> Option<&InstanceID> {
        match self {
            Proof::Inclusion { leaf, .. } => Some(&leaf.darc_id),
            Proof::Exclusion { .. } => None,
        }
    }

    /// Verify this proof for `id` against a state root, without
    /// trusting the responder.
    pub fn verify(&self, root: &Hash, id: &InstanceID) -> Result<(), ProofError> {
        match self {
            Proof::Inclusion {
                leaf,
                path,
                leaf_count,
            } => {
                if leaf.id != *id {
                    return Err(ProofError::WrongInstance {
                        proven: leaf.id,
                        requested: *id,
                    });
                }
                let merkle = path_root(&leaf.hash(), path);
                if state_commitment(&merkle, *leaf_count as u64) != *root {
                    return Err(ProofError::BadPath);
                }
                Ok(())
            }
            Proof::Exclusion {
                left,
                right,
                leaf_count,
            } => Self::verify_exclusion(root, id, left, right, *leaf_count),
        }
    }

    fn verify_exclusion(
        root: &Hash,
        id: &InstanceID,
        left: &Option<(ProofLeaf, MerklePath)>,
        right: &Option<(ProofLeaf, MerklePath)>,
        leaf_count: usize,
    ) -> Result<(), ProofError> {
        // Both neighbor paths must fold to one merkle root, and that
        // root together with the claimed count must match the
        // commitment. A forged count fails here.
        let mut merkle = None;
        for (leaf, path) in [left, right].into_iter().flatten() {
            let folded = path_root(&leaf.hash(), path);
            if *merkle.get_or_insert(folded) != folded {
                return Err(ProofError::BadPath);
            }
        }
        let merkle = merkle.unwrap_or(Hash::ZERO);
        if state_commitment(&merkle, leaf_count as u64) != *root {
            return Err(ProofError::BadPath);
        }

        match (left, right) {
            (None, None) => {
                // Only the empty store excludes everything
                if leaf_count != 0 {
                    return Err(ProofError::BadLeafCount(leaf_count));
                }
            }
            (None, Some((leaf, path))) => {
                // Key below the smallest leaf
                if path.index != 0 {
                    return Err(ProofError::NotAdjacent);
                }
                if leaf.id <= *id {
                    return Err(ProofError::BadNeighbors);
                }
            }
            (Some((leaf, path)), None) => {
                // Key above the greatest leaf
                if path.index + 1 != leaf_count {
                    return Err(ProofError::BadLeafCount(leaf_count));
                }
                if leaf.id >= *id {
                    return Err(ProofError::BadNeighbors);
                }
            }
            (Some((l, lp)), Some((r, rp))) => {
                if lp.index + 1 != rp.index {
                    return Err(ProofError::NotAdjacent);
                }
                if !(l.id < *id && *id < r.id) {
                    return Err(ProofError::BadNeighbors);
                }
            }
        }
        Ok(())
    }
}

//! Merkle tree used for state roots and block payload roots.
//!
//! Leaves are hashed pair-wise; an odd node is hashed with itself. The
//! empty tree has the zero root. Proof paths carry the leaf index so
//! that store proofs can reason about neighbor adjacency (exclusion
//! proofs need to show two leaves are adjacent in the canonical order).

use crate::hash::{hash_concat, Hash};
use serde::{Deserialize, Serialize};

/// Compute the merkle root of a list of hashes.
///
/// Returns the zero hash if the list is empty.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }
    if hashes.len() == 1 {
        return hashes[0];
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));

        for chunk in current_level.chunks(2) {
            let combined = if chunk.len() == 2 {
                hash_concat(&[chunk[0].as_ref(), chunk[1].as_ref()])
            } else {
                // Odd number of elements: hash the last one with itself
                hash_concat(&[chunk[0].as_ref(), chunk[0].as_ref()])
            };
            next_level.push(combined);
        }

        current_level = next_level;
    }

    current_level[0]
}

/// An authentication path from a leaf to the root.
///
/// The leaf index doubles as the direction bits: bit `i` of `index`
/// says whether the node at level `i` is a right child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Index of the leaf in the canonical leaf order.
    pub index: usize,
    /// Sibling hashes from leaf level to the level below the root.
    pub siblings: Vec<Hash>,
}

/// A merkle tree retaining all levels, for proof generation.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// All nodes in the tree, level by level (leaves first).
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a merkle tree from a list of leaf hashes.
    pub fn new(leaves: &[Hash]) -> Self {
        if leaves.is_empty() {
            return Self {
                levels: vec![vec![Hash::ZERO]],
            };
        }

        let mut levels = vec![leaves.to_vec()];

        while levels.last().expect("at least one level").len() > 1 {
            let current = levels.last().expect("at least one level");
            let mut next = Vec::with_capacity(current.len().div_ceil(2));

            for chunk in current.chunks(2) {
                let combined = if chunk.len() == 2 {
                    hash_concat(&[chunk[0].as_ref(), chunk[1].as_ref()])
                } else {
                    hash_concat(&[chunk[0].as_ref(), chunk[0].as_ref()])
                };
                next.push(combined);
            }

            levels.push(next);
        }

        Self { levels }
    }

    /// Get the root of the merkle tree.
    pub fn root(&self) -> Hash {
        *self
            .levels
            .last()
            .and_then(|l| l.first())
            .expect("tree always has a root")
    }

    /// Get the number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(|l| l.len()).unwrap_or(0)
    }

    /// Generate an authentication path for the leaf at the given index.
    pub fn path(&self, index: usize) -> Option<MerklePath> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };

            let sibling = if sibling_idx < level.len() {
                level[sibling_idx]
            } else {
                level[idx] // Odd node hashes with itself
            };

            siblings.push(sibling);
            idx /= 2;
        }

        Some(MerklePath { index, siblings })
    }
}

/// Fold an authentication path over a leaf hash, yielding the root the
/// path commits to.
pub fn path_root(leaf: &Hash, path: &MerklePath) -> Hash {
    let mut current = *leaf;
    let mut idx = path.index;

    for sibling in &path.siblings {
        current = if idx % 2 == 0 {
            hash_concat(&[current.as_ref(), sibling.as_ref()])
        } else {
            hash_concat(&[sibling.as_ref(), current.as_ref()])
        };
        idx /= 2;
    }

    current
}

/// Verify an authentication path for a leaf hash against a root.
pub fn verify_path(root: &Hash, leaf: &Hash, path: &MerklePath) -> bool {
    path_root(leaf, path) == *root
}

//! Chain links: blocks carrying multi-height skip links.
//!
//! Every link holds back links at several heights: `back_links[0]` is
//! the immediate predecessor, `back_links[h]` points roughly `2^h`
//! links back, which makes traversal to any ancestor logarithmic.
//! Forward links mirror this and are filled in only once the successor
//! exists, so they are not part of the link hash.
//!
//! The genesis link has no predecessor, but its `back_links[0]` is
//! populated with a random value anyway: the value flows into the
//! genesis hash and gives every chain a globally unique identifier.
//! Link-validity checks must treat that slot as synthetic.

use crate::hash::{hash, hash_concat, Hash};
use crate::instruction::ClientTransaction;
use crate::merkle::merkle_root;
use crate::roster::CollectiveSignature;
use serde::{Deserialize, Serialize};

/// Maximum number of skip-link heights kept per link.
pub const MAX_LINK_HEIGHT: usize = 8;

/// Outcome of one client transaction inside a block.
///
/// Rejected transactions stay in the payload with `accepted = false`;
/// their effects are rolled back but the rejection itself is recorded
/// and committed to by the payload root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub transaction: ClientTransaction,
    pub accepted: bool,
}

impl TxResult {
    pub fn new(transaction: ClientTransaction, accepted: bool) -> Self {
        Self {
            transaction,
            accepted,
        }
    }

    /// Hash covering the transaction and its outcome.
    pub fn hash(&self) -> Hash {
        hash_concat(&[self.transaction.hash().as_ref(), &[self.accepted as u8]])
    }
}

/// One block of the ledger's hash-linked chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Position in the chain (0 for genesis).
    pub index: u64,
    /// Transactions with their per-transaction outcomes.
    pub payload: Vec<TxResult>,
    /// Merkle root over the payload.
    pub payload_root: Hash,
    /// Root of the authenticated store after applying this block.
    pub state_root: Hash,
    /// Back links by height; slot 0 of the genesis link is synthetic.
    pub back_links: Vec<Hash>,
    /// Forward links by height; appended once successors exist, absent
    /// on the newest link. Not covered by the link hash.
    pub forward_links: Vec<Hash>,
    /// Aggregate signature from the roster; empty on genesis. Not
    /// covered by the link hash.
    pub signature: CollectiveSignature,
}

/// The hashed projection of a link: everything known at proposal time.
#[derive(Serialize)]
struct LinkHeader<'a> {
    index: u64,
    payload_root: &'a Hash,
    state_root: &'a Hash,
    back_links: &'a [Hash],
}

/// Number of back links a link at `index` carries: one per height `h`
/// with `2^h <= index`, capped at [`MAX_LINK_HEIGHT`]. Genesis carries
/// exactly its synthetic slot.
pub fn back_link_count(index: u64) -> usize {
    if index == 0 {
        return 1;
    }
    let mut count = 0;
    while count < MAX_LINK_HEIGHT && (1u64 << count) <= index {
        count += 1;
    }
    count
}

impl ChainLink {
    /// Create a new link at `index` with the given back links.
    pub fn new(
        index: u64,
        payload: Vec<TxResult>,
        state_root: Hash,
        back_links: Vec<Hash>,
    ) -> Self {
        let result_hashes: Vec<Hash> = payload.iter().map(|r| r.hash()).collect();
        Self {
            index,
            payload,
            payload_root: merkle_root(&result_hashes),
            state_root,
            back_links,
            forward_links: Vec::new(),
            signature: CollectiveSignature::empty(),
        }
    }

    /// Create the genesis link. Its single back link is a fresh random
    /// value, never a reference to another link.
    pub fn genesis(state_root: Hash) -> Self {
        Self::new(0, Vec::new(), state_root, vec![Hash::random()])
    }

    /// The link hash: hash of the header projection. Forward links and
    /// the collective signature are appended later and excluded.
    pub fn hash(&self) -> Hash {
        let header = LinkHeader {
            index: self.index,
            payload_root: &self.payload_root,
            state_root: &self.state_root,
            back_links: &self.back_links,
        };
        let encoded = bincode::serialize(&header).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Check if this is the genesis link.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Number of transactions in this link.
    pub fn tx_count(&self) -> usize {
        self.payload.len()
    }

    /// Verify the payload root matches the payload.
    pub fn verify_payload_root(&self) -> bool {
        let result_hashes: Vec<Hash> = self.payload.iter().map(|r| r.hash()).collect();
        merkle_root(&result_hashes) == self.payload_root
    }

    /// Verify this link's back links against a resolver from chain
    /// index to link hash.
    ///
    /// The genesis slot is skipped entirely: it is synthetic and must
    /// not be dereferenced.
    pub fn verify_back_links<F>(&self, resolve: F) -> bool
    where
        F: Fn(u64) -> Option<Hash>,
    {
        if self.is_genesis() {
            return self.back_links.len() == 1;
        }
        if self.back_links.len() != back_link_count(self.index) {
            return false;
        }
        for (h, link) in self.back_links.iter().enumerate() {
            let target = self.index - (1u64 << h);
            match resolve(target) {
                Some(hash) if hash == *link => {}
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::instruction::{Argument, ClientTransaction, InstanceID, Instruction};

    fn dummy_tx() -> ClientTransaction {
        let kp = Keypair::generate();
        ClientTransaction::new(vec![Instruction::spawn(
            InstanceID::ZERO,
            "value",
            vec![Argument::new("value", b"1".to_vec())],
            vec![1],
        )])
        .signed(&kp)
    }

    #[test]
    fn test_genesis_link() {
        let genesis = ChainLink::genesis(Hash::ZERO);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.back_links.len(), 1);
        assert!(genesis.forward_links.is_empty());
        assert!(genesis.signature.is_empty());
    }

    #[test]
    fn test_genesis_chain_id_unique() {
        // Two chains built from the same state differ via the synthetic
        // back link
        let g1 = ChainLink::genesis(Hash::ZERO);
        let g2 = ChainLink::genesis(Hash::ZERO);
        assert_ne!(g1.hash(), g2.hash());
    }

    #[test]
    fn test_link_hash_deterministic() {
        let link = ChainLink::genesis(Hash::ZERO);
        assert_eq!(link.hash(), link.hash());
    }

    #[test]
    fn test_forward_links_not_hashed() {
        let mut link = ChainLink::genesis(Hash::ZERO);
        let before = link.hash();
        link.forward_links.push(Hash([0xFF; 32]));
        assert_eq!(before, link.hash());
    }

    #[test]
    fn test_back_link_count() {
        assert_eq!(back_link_count(0), 1);
        assert_eq!(back_link_count(1), 1);
        assert_eq!(back_link_count(2), 2);
        assert_eq!(back_link_count(3), 2);
        assert_eq!(back_link_count(4), 3);
        assert_eq!(back_link_count(7), 3);
        assert_eq!(back_link_count(8), 4);
        assert_eq!(back_link_count(1 << 20), MAX_LINK_HEIGHT);
    }

    #[test]
    fn test_payload_root_commits_to_outcome() {
        let tx = dummy_tx();
        let accepted = ChainLink::new(
            1,
            vec![TxResult::new(tx.clone(), true)],
            Hash::ZERO,
            vec![Hash::ZERO],
        );
        let rejected = ChainLink::new(
            1,
            vec![TxResult::new(tx, false)],
            Hash::ZERO,
            vec![Hash::ZERO],
        );
        assert_ne!(accepted.payload_root, rejected.payload_root);
        assert!(accepted.verify_payload_root());
    }

    #[test]
    fn test_verify_back_links() {
        let genesis = ChainLink::genesis(Hash::ZERO);
        let genesis_hash = genesis.hash();

        let block1 = ChainLink::new(1, vec![], Hash::ZERO, vec![genesis_hash]);
        let block1_hash = block1.hash();

        let block2 = ChainLink::new(2, vec![], Hash::ZERO, vec![block1_hash, genesis_hash]);

        let resolve = |index: u64| match index {
            0 => Some(genesis_hash),
            1 => Some(block1_hash),
            _ => None,
        };

        // Genesis's synthetic slot is never dereferenced
        assert!(genesis.verify_back_links(resolve));
        assert!(block1.verify_back_links(resolve));
        assert!(block2.verify_back_links(resolve));

        let bad = ChainLink::new(1, vec![], Hash::ZERO, vec![Hash([9; 32])]);
        assert!(!bad.verify_back_links(resolve));

        let wrong_count = ChainLink::new(2, vec![], Hash::ZERO, vec![block1_hash]);
        assert!(!wrong_count.verify_back_links(resolve));
    }
}

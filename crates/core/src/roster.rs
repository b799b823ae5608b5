//! Node rosters and collective signatures.
//!
//! The collective-signing protocol itself is an external collaborator;
//! this module only defines its inputs (the roster) and its verifiable
//! output (a threshold aggregate of roster signatures over a block
//! header hash).

use crate::crypto::{Identity, Signature};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from collective signature verification.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("empty roster")]
    EmptyRoster,

    #[error("signer {0} is not a roster member")]
    UnknownSigner(Identity),

    #[error("duplicate signer {0}")]
    DuplicateSigner(Identity),

    #[error("only {got} valid signatures, threshold is {threshold}")]
    BelowThreshold { got: usize, threshold: usize },
}

/// The set of nodes expected to co-sign blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub members: Vec<Identity>,
}

impl Roster {
    /// Create a roster from a list of member identities.
    pub fn new(members: Vec<Identity>) -> Self {
        Self { members }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the identity is a roster member.
    pub fn contains(&self, id: &Identity) -> bool {
        self.members.contains(id)
    }

    /// Signature threshold: tolerates f faults out of n = 3f + 1, so a
    /// block needs n - f valid signatures.
    pub fn threshold(&self) -> usize {
        let n = self.members.len();
        n - (n.saturating_sub(1)) / 3
    }
}

/// An aggregate of per-node signatures over a block header hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CollectiveSignature {
    pub signatures: Vec<(Identity, Signature)>,
}

impl CollectiveSignature {
    /// An empty aggregate (genesis carries no collective signature).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this aggregate contains no signatures.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Verify the aggregate against a roster: every signer must be a
    /// distinct roster member with a valid signature over `message`,
    /// and at least `roster.threshold()` of them must be present.
    pub fn verify(&self, message: &Hash, roster: &Roster) -> Result<(), RosterError> {
        if roster.is_empty() {
            return Err(RosterError::EmptyRoster);
        }

        let mut seen = Vec::with_capacity(self.signatures.len());
        let mut valid = 0usize;

        for (signer, sig) in &self.signatures {
            if !roster.contains(signer) {
                return Err(RosterError::UnknownSigner(*signer));
            }
            if seen.contains(signer) {
                return Err(RosterError::DuplicateSigner(*signer));
            }
            seen.push(*signer);

            if signer.verify(message.as_ref(), sig).is_ok() {
                valid += 1;
            }
        }

        let threshold = roster.threshold();
        if valid < threshold {
            return Err(RosterError::BelowThreshold {
                got: valid,
                threshold,
            });
        }
        Ok(())
    }
}

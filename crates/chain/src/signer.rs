//! The collective-signing seam.
//!
//! The real protocol (a threshold-signing round across the roster) is
//! an external collaborator. The producer only depends on this trait:
//! given a link hash and a roster, return an aggregate that
//! [`CollectiveSignature::verify`] accepts, or fail. Failure is
//! retryable and must never leave partial state behind.

use skipledger_core::{CollectiveSignature, Hash, Keypair, Roster, RosterError};
use thiserror::Error;

/// Errors from a collective signing round.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing refused: {0}")]
    Refused(String),

    #[error(transparent)]
    Roster(#[from] RosterError),
}

pub type Result<T> = std::result::Result<T, SigningError>;

/// A collective signing collaborator.
pub trait CollectiveSigner: Send + Sync {
    /// Sign `message` on behalf of `roster`, returning an aggregate
    /// that meets the roster's threshold.
    fn sign(&self, message: &Hash, roster: &Roster) -> Result<CollectiveSignature>;
}

/// In-process signer holding the private keys of roster members.
///
/// Stands in for the network protocol when all nodes run in one
/// process, and in tests.
pub struct LocalSigner {
    keypairs: Vec<Keypair>,
}

impl LocalSigner {
    pub fn new(keypairs: Vec<Keypair>) -> Self {
        Self { keypairs }
    }
}

impl CollectiveSigner for LocalSigner {
    fn sign(&self, message: &Hash, roster: &Roster) -> Result<CollectiveSignature> {
        let aggregate = CollectiveSignature {
            signatures: self
                .keypairs
                .iter()
                .filter(|kp| roster.contains(&kp.identity()))
                .map(|kp| (kp.identity(), kp.sign(message.as_ref())))
                .collect(),
        };
        // Refuse rather than hand out an aggregate below threshold
        aggregate.verify(message, roster)?;
        Ok(aggregate)
    }
}

/// A signer that always refuses. Exercises the discard path of block
/// production.
pub struct RefusingSigner;

impl CollectiveSigner for RefusingSigner {
    fn sign(&self, _message: &Hash, _roster: &Roster) -> Result<CollectiveSignature> {
        Err(SigningError::Refused("signing disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skipledger_core::hash;

    #[test]
    fn test_local_signer_meets_threshold() {
        let keys: Vec<Keypair> = (0..4).map(|_| Keypair::generate()).collect();
        let roster = Roster::new(keys.iter().map(|k| k.identity()).collect());
        let signer = LocalSigner::new(keys);

        let msg = hash(b"link header");
        let aggregate = signer.sign(&msg, &roster).unwrap();
        assert!(aggregate.verify(&msg, &roster).is_ok());
        assert_eq!(aggregate.signatures.len(), 4);
    }

    #[test]
    fn test_local_signer_refuses_below_threshold() {
        let keys: Vec<Keypair> = (0..4).map(|_| Keypair::generate()).collect();
        let roster = Roster::new(keys.iter().map(|k| k.identity()).collect());
        // Only one of four keys available: threshold is 3
        let signer = LocalSigner::new(keys.into_iter().take(1).collect());

        assert!(matches!(
            signer.sign(&hash(b"m"), &roster),
            Err(SigningError::Roster(RosterError::BelowThreshold { .. }))
        ));
    }

    #[test]
    fn test_local_signer_skips_non_members() {
        let member = Keypair::generate();
        let outsider = Keypair::generate();
        let roster = Roster::new(vec![member.identity()]);
        let signer = LocalSigner::new(vec![member, outsider]);

        let msg = hash(b"m");
        let aggregate = signer.sign(&msg, &roster).unwrap();
        assert_eq!(aggregate.signatures.len(), 1);
    }
}

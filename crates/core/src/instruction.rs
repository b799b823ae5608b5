//! Instructions and client transactions.
//!
//! An instruction targets one instance in the authenticated store and
//! carries exactly one of three variants: spawn (create), invoke
//! (mutate) or delete. Replay protection comes from per-signer
//! monotonically increasing counters: an instruction is only valid when
//! each counter equals the last seen counter for that signer plus one.

use crate::crypto::{CryptoError, Identity, Keypair, Signature};
use crate::hash::{hash, hash_concat, Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors from instruction construction and validation.
#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("transaction has no instructions")]
    EmptyTransaction,

    #[error("duplicate argument name: {0}")]
    DuplicateArgument(String),

    #[error("instruction has no signatures")]
    MissingSignatures,

    #[error("counters ({counters}) do not match signers ({signers})")]
    CounterMismatch { counters: usize, signers: usize },

    #[error("signature verification failed for {0}")]
    BadSignature(Identity),
}

/// A 32-byte identifier naming one entry in the authenticated store.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct InstanceID(pub [u8; 32]);

impl InstanceID {
    /// The zero instance id.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an instance id from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build an instance id from an arbitrary-length slice by hashing.
    pub fn from_slice(data: &[u8]) -> Self {
        Self(hash(data).0)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for InstanceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceID(0x{})", &hex::encode(self.0)[..8])
    }
}

impl fmt::Display for InstanceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for InstanceID {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Hash> for InstanceID {
    fn from(h: Hash) -> Self {
        Self(h.0)
    }
}

/// A named argument carried by an instruction.
///
/// Names are unique within one instruction; the ordering carries no
/// meaning beyond contract-defined conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: Vec<u8>,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The three instruction variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Create a new instance.
    Spawn {
        contract_id: String,
        args: Vec<Argument>,
    },
    /// Mutate an existing instance.
    Invoke {
        contract_id: String,
        command: String,
        args: Vec<Argument>,
    },
    /// Remove an existing instance.
    Delete { contract_id: String },
}

/// One instruction against the ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The instance this instruction targets. For spawns this is the
    /// spawning darc's instance; the new instance id is derived.
    pub instance_id: InstanceID,
    /// Spawn, invoke or delete.
    pub kind: InstructionKind,
    /// Replay counters, parallel to `signers`: each must be exactly one
    /// greater than the last counter recorded for that signer.
    pub signer_counters: Vec<u64>,
    /// Identities that signed this instruction.
    pub signers: Vec<Identity>,
    /// Signatures over the signing hash, parallel to `signers`.
    pub signatures: Vec<Signature>,
}

/// Unsigned projection of an instruction (for hashing and signing).
#[derive(Serialize)]
struct UnsignedInstruction<'a> {
    instance_id: &'a InstanceID,
    kind: &'a InstructionKind,
    signer_counters: &'a [u64],
}

impl Instruction {
    /// Create a new unsigned instruction.
    pub fn new(instance_id: InstanceID, kind: InstructionKind, signer_counters: Vec<u64>) -> Self {
        Self {
            instance_id,
            kind,
            signer_counters,
            signers: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Shorthand for a spawn instruction.
    pub fn spawn(
        instance_id: InstanceID,
        contract_id: impl Into<String>,
        args: Vec<Argument>,
        signer_counters: Vec<u64>,
    ) -> Self {
        Self::new(
            instance_id,
            InstructionKind::Spawn {
                contract_id: contract_id.into(),
                args,
            },
            signer_counters,
        )
    }

    /// Shorthand for an invoke instruction.
    pub fn invoke(
        instance_id: InstanceID,
        contract_id: impl Into<String>,
        command: impl Into<String>,
        args: Vec<Argument>,
        signer_counters: Vec<u64>,
    ) -> Self {
        Self::new(
            instance_id,
            InstructionKind::Invoke {
                contract_id: contract_id.into(),
                command: command.into(),
                args,
            },
            signer_counters,
        )
    }

    /// Shorthand for a delete instruction.
    pub fn delete(
        instance_id: InstanceID,
        contract_id: impl Into<String>,
        signer_counters: Vec<u64>,
    ) -> Self {
        Self::new(
            instance_id,
            InstructionKind::Delete {
                contract_id: contract_id.into(),
            },
            signer_counters,
        )
    }

    /// The contract id this instruction targets.
    pub fn contract_id(&self) -> &str {
        match &self.kind {
            InstructionKind::Spawn { contract_id, .. } => contract_id,
            InstructionKind::Invoke { contract_id, .. } => contract_id,
            InstructionKind::Delete { contract_id } => contract_id,
        }
    }

    /// The instruction's arguments (empty for deletes).
    pub fn args(&self) -> &[Argument] {
        match &self.kind {
            InstructionKind::Spawn { args, .. } => args,
            InstructionKind::Invoke { args, .. } => args,
            InstructionKind::Delete { .. } => &[],
        }
    }

    /// Look up an argument by name.
    pub fn arg(&self, name: &str) -> Option<&[u8]> {
        self.args()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_slice())
    }

    /// The darc action string this instruction needs authorization for:
    /// `spawn:<cid>`, `invoke:<cid>.<command>` or `delete:<cid>`.
    pub fn action(&self) -> String {
        match &self.kind {
            InstructionKind::Spawn { contract_id, .. } => format!("spawn:{}", contract_id),
            InstructionKind::Invoke {
                contract_id,
                command,
                ..
            } => format!("invoke:{}.{}", contract_id, command),
            InstructionKind::Delete { contract_id } => format!("delete:{}", contract_id),
        }
    }

    /// Hash of the instruction's canonical encoding, without signatures.
    /// This is what signers sign and what instance ids derive from.
    pub fn signing_hash(&self) -> Hash {
        let unsigned = UnsignedInstruction {
            instance_id: &self.instance_id,
            kind: &self.kind,
            signer_counters: &self.signer_counters,
        };
        let encoded = bincode::serialize(&unsigned).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Derive the id of an instance spawned by this instruction.
    ///
    /// The derivation hashes the signing hash together with an optional
    /// suffix, so spawned instances have stable, collision-resistant
    /// addresses and one instruction can spawn several instances.
    pub fn derive_id(&self, suffix: &[u8]) -> InstanceID {
        InstanceID(hash_concat(&[self.signing_hash().as_ref(), suffix]).0)
    }

    /// Sign with the given keypair, appending signer and signature.
    pub fn sign_with(&mut self, keypair: &Keypair) {
        let h = self.signing_hash();
        self.signers.push(keypair.identity());
        self.signatures.push(keypair.sign(h.as_ref()));
    }

    /// Verify that every attached signature is valid for its signer.
    pub fn verify_signatures(&self) -> Result<(), InstructionError> {
        if self.signers.is_empty() || self.signers.len() != self.signatures.len() {
            return Err(InstructionError::MissingSignatures);
        }
        let h = self.signing_hash();
        for (signer, sig) in self.signers.iter().zip(&self.signatures) {
            signer
                .verify(h.as_ref(), sig)
                .map_err(|_: CryptoError| InstructionError::BadSignature(*signer))?;
        }
        Ok(())
    }

    /// Structural validation: argument names unique, counters parallel
    /// to signers, signatures present.
    pub fn validate(&self) -> Result<(), InstructionError> {
        let mut seen = HashSet::new();
        for arg in self.args() {
            if !seen.insert(arg.name.as_str()) {
                return Err(InstructionError::DuplicateArgument(arg.name.clone()));
            }
        }
        if self.signer_counters.len() != self.signers.len() {
            return Err(InstructionError::CounterMismatch {
                counters: self.signer_counters.len(),
                signers: self.signers.len(),
            });
        }
        self.verify_signatures()
    }
}

/// An ordered sequence of instructions, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTransaction {
    pub instructions: Vec<Instruction>,
}

impl ClientTransaction {
    /// Create a transaction from a list of instructions.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Hash of the full transaction (instructions with signatures).
    pub fn hash(&self) -> Hash {
        let encoded = bincode::serialize(self).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Sign every instruction with the given keypair.
    pub fn sign_with(&mut self, keypair: &Keypair) {
        for instr in &mut self.instructions {
            instr.sign_with(keypair);
        }
    }

    /// Builder form of [`sign_with`].
    pub fn signed(mut self, keypair: &Keypair) -> Self {
        self.sign_with(keypair);
        self
    }

    /// Validate the whole transaction structurally.
    pub fn validate(&self) -> Result<(), InstructionError> {
        if self.instructions.is_empty() {
            return Err(InstructionError::EmptyTransaction);
        }
        for instr in &self.instructions {
            instr.validate()?;
        }
        Ok(())
    }
}

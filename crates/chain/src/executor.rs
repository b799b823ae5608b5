//! Transaction execution against a staged store.

use skipledger_contracts::{verify_authorization, ContractError, ContractRegistry};
use skipledger_core::{
    ClientTransaction, Identity, Instruction, InstructionError, InstructionKind,
};
use skipledger_state::{StagedStore, StateError, StoreView};
use thiserror::Error;

/// Why a transaction was rejected. Any of these rolls back the whole
/// transaction; previously executed transactions in the same block are
/// unaffected.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("bad counter for {signer}: expected {expected}, got {got}")]
    BadCounter {
        signer: Identity,
        expected: u64,
        got: u64,
    },
}

pub type Result<T> = std::result::Result<T, ExecuteError>;

/// Runs client transactions instruction by instruction.
///
/// Each transaction executes on a fork of the staged store; the fork is
/// only folded back on success, so a failing instruction discards every
/// effect of its transaction. Instructions within one transaction see
/// each other's staged effects in order.
pub struct Executor {
    registry: ContractRegistry,
}

impl Executor {
    /// Create an executor dispatching through the given registry.
    pub fn new(registry: ContractRegistry) -> Self {
        Self { registry }
    }

    /// Execute one transaction on top of `staged`.
    ///
    /// On success the staged store contains the transaction's effects
    /// and any follow-up transactions are returned for the producer to
    /// schedule. On failure `staged` is left exactly as it was.
    pub fn execute(
        &self,
        staged: &mut StagedStore,
        tx: &ClientTransaction,
    ) -> Result<Vec<ClientTransaction>> {
        tx.validate()?;

        let mut fork = staged.clone();
        let mut followups = Vec::new();
        for instruction in &tx.instructions {
            followups.extend(self.step(&mut fork, instruction)?);
        }
        *staged = fork;
        Ok(followups)
    }

    fn step(
        &self,
        fork: &mut StagedStore,
        instruction: &Instruction,
    ) -> Result<Vec<ClientTransaction>> {
        // Replay protection: each signer's counter must be exactly one
        // past the last one recorded
        for (signer, &counter) in instruction.signers.iter().zip(&instruction.signer_counters) {
            let expected = fork.counter(signer) + 1;
            if counter != expected {
                return Err(ExecuteError::BadCounter {
                    signer: *signer,
                    expected,
                    got: counter,
                });
            }
        }

        self.authorize(fork, instruction)?;

        let execution = self.registry.execute(fork, instruction)?;
        fork.apply_all(execution.changes)?;
        for (signer, &counter) in instruction.signers.iter().zip(&instruction.signer_counters) {
            fork.set_counter(*signer, counter);
        }
        Ok(execution.followups)
    }

    /// Resolve the governing darc and check the instruction's signers
    /// against it. Spawns run under the darc they target; invokes and
    /// deletes run under the darc of the existing instance.
    fn authorize(&self, view: &StagedStore, instruction: &Instruction) -> Result<()> {
        let darc_id = match &instruction.kind {
            InstructionKind::Spawn { .. } => instruction.instance_id,
            _ => {
                view.get_entry(&instruction.instance_id)
                    .ok_or(ContractError::InstanceNotFound(instruction.instance_id))?
                    .darc_id
            }
        };
        verify_authorization(view, &darc_id, &instruction.action(), &instruction.signers)?;
        Ok(())
    }
}

//! The contract seam between instructions and state changes.

use crate::credential::CredentialContract;
use crate::darc::DarcContract;
use crate::value::ValueContract;
use skipledger_core::{ClientTransaction, InstanceID, Instruction, InstructionKind};
use skipledger_state::{StateChange, StoreEntry, StoreView};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while executing an instruction against a contract.
/// Any of these rejects the whole transaction.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("no contract registered as {0}")]
    UnknownContract(String),

    #[error("contract {contract_id} has no command {command}")]
    UnknownCommand {
        contract_id: String,
        command: String,
    },

    #[error("contract {0} does not allow deletion")]
    DeleteForbidden(String),

    #[error("missing argument {0}")]
    MissingArgument(String),

    #[error("malformed value: {0}")]
    MalformedValue(String),

    #[error("instance {0} not found")]
    InstanceNotFound(InstanceID),

    #[error("instance {id} belongs to contract {actual}, not {expected}")]
    WrongContract {
        id: InstanceID,
        expected: String,
        actual: String,
    },

    #[error("action {action} not authorized by darc {darc}")]
    Unauthorized { action: String, darc: InstanceID },
}

pub type Result<T> = std::result::Result<T, ContractError>;

/// What one instruction produced: state changes applied atomically with
/// the rest of the transaction, plus follow-up transactions the
/// producer schedules into the same proposal.
#[derive(Debug, Default)]
pub struct Execution {
    pub changes: Vec<StateChange>,
    pub followups: Vec<ClientTransaction>,
}

impl Execution {
    /// An execution carrying only state changes.
    pub fn with_changes(changes: Vec<StateChange>) -> Self {
        Self {
            changes,
            followups: Vec::new(),
        }
    }

    /// Attach a follow-up transaction.
    pub fn and_followup(mut self, tx: ClientTransaction) -> Self {
        self.followups.push(tx);
        self
    }
}

/// Executable logic bound to a contract id.
///
/// Contracts observe state through the staged [`StoreView`], so
/// instructions within one transaction see each other's effects in
/// order. They never mutate state directly; all effects go through the
/// returned [`Execution`].
pub trait Contract: Send + Sync {
    /// Create a new instance.
    fn spawn(&self, view: &dyn StoreView, instruction: &Instruction) -> Result<Execution>;

    /// Mutate an existing instance.
    fn invoke(
        &self,
        view: &dyn StoreView,
        instruction: &Instruction,
        command: &str,
    ) -> Result<Execution>;

    /// Remove an existing instance.
    fn delete(&self, view: &dyn StoreView, instruction: &Instruction) -> Result<Execution>;
}

/// Look up an instance and check it belongs to the expected contract.
pub(crate) fn load_entry<'a>(
    view: &'a dyn StoreView,
    id: &InstanceID,
    expected: &str,
) -> Result<&'a StoreEntry> {
    let entry = view
        .get_entry(id)
        .ok_or(ContractError::InstanceNotFound(*id))?;
    if entry.contract_id != expected {
        return Err(ContractError::WrongContract {
            id: *id,
            expected: expected.into(),
            actual: entry.contract_id.clone(),
        });
    }
    Ok(entry)
}

/// Maps contract ids to their implementations.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, Arc<dyn Contract>>,
}

impl ContractRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in contracts: darc, value, credential.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(crate::darc::CONTRACT_DARC, Arc::new(DarcContract));
        registry.register(crate::value::CONTRACT_VALUE, Arc::new(ValueContract));
        registry.register(
            crate::credential::CONTRACT_CREDENTIAL,
            Arc::new(CredentialContract),
        );
        registry
    }

    /// Register a contract under an id, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, contract: Arc<dyn Contract>) {
        self.contracts.insert(id.into(), contract);
    }

    /// Whether a contract id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.contracts.contains_key(id)
    }

    /// Look up a contract by id.
    pub fn get(&self, id: &str) -> Result<&Arc<dyn Contract>> {
        self.contracts
            .get(id)
            .ok_or_else(|| ContractError::UnknownContract(id.into()))
    }

    /// Dispatch one instruction to its contract.
    pub fn execute(&self, view: &dyn StoreView, instruction: &Instruction) -> Result<Execution> {
        let contract = self.get(instruction.contract_id())?;
        match &instruction.kind {
            InstructionKind::Spawn { .. } => contract.spawn(view, instruction),
            InstructionKind::Invoke { command, .. } => contract.invoke(view, instruction, command),
            InstructionKind::Delete { .. } => contract.delete(view, instruction),
        }
    }
}

impl fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.contracts.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_tuple("ContractRegistry").field(&ids).finish()
    }
}

//! The value contract: an uninterpreted byte string per instance.

use crate::contract::{load_entry, Contract, ContractError, Execution, Result};
use skipledger_core::Instruction;
use skipledger_state::{StateChange, StoreView};

/// Contract id of the value contract.
pub const CONTRACT_VALUE: &str = "value";

/// Stores whatever bytes the client sends. Useful on its own and as
/// the smallest possible contract to test the executor with.
pub struct ValueContract;

impl Contract for ValueContract {
    fn spawn(&self, _view: &dyn StoreView, instruction: &Instruction) -> Result<Execution> {
        let value = instruction
            .arg("value")
            .ok_or_else(|| ContractError::MissingArgument("value".into()))?;
        Ok(Execution::with_changes(vec![StateChange::Create {
            id: instruction.derive_id(b""),
            contract_id: CONTRACT_VALUE.into(),
            // New instances inherit the darc the spawn ran under
            darc_id: instruction.instance_id,
            value: value.to_vec(),
        }]))
    }

    fn invoke(
        &self,
        view: &dyn StoreView,
        instruction: &Instruction,
        command: &str,
    ) -> Result<Execution> {
        if command != "update" {
            return Err(ContractError::UnknownCommand {
                contract_id: CONTRACT_VALUE.into(),
                command: command.into(),
            });
        }
        load_entry(view, &instruction.instance_id, CONTRACT_VALUE)?;
        let value = instruction
            .arg("value")
            .ok_or_else(|| ContractError::MissingArgument("value".into()))?;
        Ok(Execution::with_changes(vec![StateChange::Update {
            id: instruction.instance_id,
            value: value.to_vec(),
        }]))
    }

    fn delete(&self, view: &dyn StoreView, instruction: &Instruction) -> Result<Execution> {
        load_entry(view, &instruction.instance_id, CONTRACT_VALUE)?;
        Ok(Execution::with_changes(vec![StateChange::Remove {
            id: instruction.instance_id,
        }]))
    }
}

//! The credential contract: named attribute sets per instance.

use crate::contract::{load_entry, Contract, ContractError, Execution, Result};
use skipledger_core::Instruction;
use skipledger_state::{StateChange, StoreView};
use serde::{Deserialize, Serialize};

/// Contract id of the credential contract.
pub const CONTRACT_CREDENTIAL: &str = "credential";

/// One named attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Vec<u8>,
}

/// A named group of attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

/// The stored value of a credential instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStruct {
    pub credentials: Vec<Credential>,
}

impl CredentialStruct {
    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization should not fail")
    }

    /// Decode from a stored value.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| ContractError::MalformedValue(format!("credential: {}", e)))
    }

    /// Look up an attribute as `<credential>/<attribute>`.
    pub fn attribute(&self, credential: &str, attribute: &str) -> Option<&[u8]> {
        self.credentials
            .iter()
            .find(|c| c.name == credential)?
            .attributes
            .iter()
            .find(|a| a.name == attribute)
            .map(|a| a.value.as_slice())
    }
}

/// Holds one [`CredentialStruct`] per instance. The optional
/// `credentialID` spawn argument salts the instance id, so one
/// instruction hash can host several credentials.
pub struct CredentialContract;

impl Contract for CredentialContract {
    fn spawn(&self, _view: &dyn StoreView, instruction: &Instruction) -> Result<Execution> {
        let bytes = instruction
            .arg("credential")
            .ok_or_else(|| ContractError::MissingArgument("credential".into()))?;
        let credentials = CredentialStruct::decode(bytes)?;
        let id = instruction.derive_id(instruction.arg("credentialID").unwrap_or(b""));
        Ok(Execution::with_changes(vec![StateChange::Create {
            id,
            contract_id: CONTRACT_CREDENTIAL.into(),
            darc_id: instruction.instance_id,
            value: credentials.encode(),
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
                contract_id: CONTRACT_CREDENTIAL.into(),
                command: command.into(),
            });
        }
        load_entry(view, &instruction.instance_id, CONTRACT_CREDENTIAL)?;
        let bytes = instruction
            .arg("credential")
            .ok_or_else(|| ContractError::MissingArgument("credential".into()))?;
        let credentials = CredentialStruct::decode(bytes)?;
        Ok(Execution::with_changes(vec![StateChange::Update {
            id: instruction.instance_id,
            value: credentials.encode(),
        }]))
    }

    fn delete(&self, view: &dyn StoreView, instruction: &Instruction) -> Result<Execution> {
        load_entry(view, &instruction.instance_id, CONTRACT_CREDENTIAL)?;
        Ok(Execution::with_changes(vec![StateChange::Remove {
            id: instruction.instance_id,
        }]))
    }
}

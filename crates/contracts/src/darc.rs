//! Distributed access rights controls.
//!
//! A darc maps action strings (`spawn:value`, `invoke:darc.evolve`, ...)
//! to the identities allowed to perform them. Every store instance
//! points at the darc that governs it; the executor consults that darc
//! before any contract runs. Darcs are themselves store instances,
//! governed by themselves, and evolve through `invoke:darc.evolve`.

use crate::contract::{load_entry, Contract, ContractError, Execution, Result};
use skipledger_core::{hash, Identity, InstanceID, Instruction};
use skipledger_state::{StateChange, StoreView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contract id of the darc contract.
pub const CONTRACT_DARC: &str = "darc";

/// An access control instance: action -> identities allowed to sign
/// for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darc {
    pub description: String,
    pub rules: BTreeMap<String, Vec<Identity>>,
}

impl Darc {
    /// Create a darc with explicit rules.
    pub fn new(description: impl Into<String>, rules: BTreeMap<String, Vec<Identity>>) -> Self {
        Self {
            description: description.into(),
            rules,
        }
    }

    /// Create a darc granting a single owner every listed action, plus
    /// the right to evolve the darc itself.
    pub fn granting(description: impl Into<String>, owner: Identity, actions: &[&str]) -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(format!("invoke:{}.evolve", CONTRACT_DARC), vec![owner]);
        for action in actions {
            rules.insert((*action).into(), vec![owner]);
        }
        Self::new(description, rules)
    }

    /// The instance id this darc lives under, derived from its
    /// canonical encoding.
    pub fn base_id(&self) -> InstanceID {
        InstanceID(hash(&self.encode()).0)
    }

    /// Canonical encoding (rules are a BTreeMap, so this is stable).
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization should not fail")
    }

    /// Decode a darc from its stored value.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| ContractError::MalformedValue(format!("darc: {}", e)))
    }

    /// Whether any of `signers` is allowed to perform `action`.
    /// Signatures are assumed verified; the rule is an any-of set.
    pub fn can(&self, action: &str, signers: &[Identity]) -> bool {
        match self.rules.get(action) {
            Some(allowed) => signers.iter().any(|s| allowed.contains(s)),
            None => false,
        }
    }
}

/// Check that the darc at `darc_id` authorizes `signers` to perform
/// `action`.
pub fn verify_authorization(
    view: &dyn StoreView,
    darc_id: &InstanceID,
    action: &str,
    signers: &[Identity],
) -> Result<()> {
    let entry = load_entry(view, darc_id, CONTRACT_DARC)?;
    let darc = Darc::decode(&entry.value)?;
    if !darc.can(action, signers) {
        return Err(ContractError::Unauthorized {
            action: action.into(),
            darc: *darc_id,
        });
    }
    Ok(())
}

/// The darc contract: spawn new darcs, evolve existing ones.
pub struct DarcContract;

impl Contract for DarcContract {
    fn spawn(&self, _view: &dyn StoreView, instruction: &Instruction) -> Result<Execution> {
        let bytes = instruction
            .arg("darc")
            .ok_or_else(|| ContractError::MissingArgument("darc".into()))?;
        let darc = Darc::decode(bytes)?;
        // A darc governs itself and lives under its base id
        let id = darc.base_id();
        Ok(Execution::with_changes(vec![StateChange::Create {
            id,
            contract_id: CONTRACT_DARC.into(),
            darc_id: id,
            value: darc.encode(),
        }]))
    }

    fn invoke(
        &self,
        view: &dyn StoreView,
        instruction: &Instruction,
        command: &str,
    ) -> Result<Execution> {
        if command != "evolve" {
            return Err(ContractError::UnknownCommand {
                contract_id: CONTRACT_DARC.into(),
                command: command.into(),
            });
        }
        load_entry(view, &instruction.instance_id, CONTRACT_DARC)?;
        let bytes = instruction
            .arg("darc")
            .ok_or_else(|| ContractError::MissingArgument("darc".into()))?;
        let darc = Darc::decode(bytes)?;
        Ok(Execution::with_changes(vec![StateChange::Update {
            id: instruction.instance_id,
            value: darc.encode(),
        }]))
    }

    fn delete(&self, _view: &dyn StoreView, _instruction: &Instruction) -> Result<Execution> {
        // Removing a darc would orphan every instance it governs
        Err(ContractError::DeleteForbidden(CONTRACT_DARC.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skipledger_core::Argument;
    use skipledger_state::{Snapshot, StagedStore};
    use std::sync::Arc;

    fn ident(n: u8) -> Identity {
        Identity([n; 32])
    }

    fn staged_with_darc(darc: &Darc) -> StagedStore {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged
            .apply(StateChange::Create {
                id: darc.base_id(),
                contract_id: CONTRACT_DARC.into(),
                darc_id: darc.base_id(),
                value: darc.encode(),
            })
            .unwrap();
        staged
    }

    #[test]
    fn test_base_id_tracks_content() {
        let a = Darc::granting("a", ident(1), &["spawn:value"]);
        let b = Darc::granting("b", ident(1), &["spawn:value"]);
        assert_eq!(a.base_id(), a.base_id());
        assert_ne!(a.base_id(), b.base_id());
    }

    #[test]
    fn test_can_is_any_of() {
        let darc = Darc::new(
            "multi",
            BTreeMap::from([("spawn:value".to_string(), vec![ident(1), ident(2)])]),
        );
        assert!(darc.can("spawn:value", &[ident(2)]));
        assert!(darc.can("spawn:value", &[ident(9), ident(1)]));
        assert!(!darc.can("spawn:value", &[ident(9)]));
        assert!(!darc.can("spawn:value", &[]));
        assert!(!darc.can("delete:value", &[ident(1)]));
    }

    #[test]
    fn test_verify_authorization() {
        let darc = Darc::granting("root", ident(1), &["spawn:value"]);
        let staged = staged_with_darc(&darc);

        verify_authorization(&staged, &darc.base_id(), "spawn:value", &[ident(1)]).unwrap();
        assert!(matches!(
            verify_authorization(&staged, &darc.base_id(), "spawn:value", &[ident(2)]),
            Err(ContractError::Unauthorized { .. })
        ));
        assert!(matches!(
            verify_authorization(&staged, &InstanceID::ZERO, "spawn:value", &[ident(1)]),
            Err(ContractError::InstanceNotFound(_))
        ));
    }

    #[test]
    fn test_verify_authorization_rejects_non_darc() {
        let mut staged = StagedStore::new(Arc::new(Snapshot::empty()));
        staged
            .apply(StateChange::Create {
                id: InstanceID([5; 32]),
                contract_id: "value".into(),
                darc_id: InstanceID::ZERO,
                value: vec![],
            })
            .unwrap();
        assert!(matches!(
            verify_authorization(&staged, &InstanceID([5; 32]), "spawn:value", &[ident(1)]),
            Err(ContractError::WrongContract { .. })
        ));
    }

    #[test]
    fn test_spawn_creates_self_governed_darc() {
        let parent = Darc::granting("root", ident(1), &["spawn:darc"]);
        let staged = staged_with_darc(&parent);

        let child = Darc::granting("child", ident(2), &["spawn:value"]);
        let instr = Instruction::spawn(
            parent.base_id(),
            CONTRACT_DARC,
            vec![Argument::new("darc", child.encode())],
            vec![1],
        );
        let execution = DarcContract.spawn(&staged, &instr).unwrap();
        assert_eq!(execution.changes.len(), 1);
        match &execution.changes[0] {
            StateChange::Create { id, darc_id, .. } => {
                assert_eq!(*id, child.base_id());
                assert_eq!(darc_id, id);
            }
            other => panic!("unexpected change: {:?}", other),
        }
    }

    #[test]
    fn test_evolve_replaces_rules() {
        let darc = Darc::granting("root", ident(1), &["spawn:value"]);
        let mut staged = staged_with_darc(&darc);

        let mut evolved = darc.clone();
        evolved
            .rules
            .insert("spawn:credential".into(), vec![ident(1)]);
        let instr = Instruction::invoke(
            darc.base_id(),
            CONTRACT_DARC,
            "evolve",
            vec![Argument::new("darc", evolved.encode())],
            vec![2],
        );
        let execution = DarcContract.invoke(&staged, &instr, "evolve").unwrap();
        staged.apply_all(execution.changes).unwrap();

        verify_authorization(&staged, &darc.base_id(), "spawn:credential", &[ident(1)]).unwrap();
    }

    #[test]
    fn test_unknown_command_and_delete_rejected() {
        let darc = Darc::granting("root", ident(1), &[]);
        let staged = staged_with_darc(&darc);
        let instr = Instruction::invoke(darc.base_id(), CONTRACT_DARC, "shrink", vec![], vec![1]);
        assert!(matches!(
            DarcContract.invoke(&staged, &instr, "shrink"),
            Err(ContractError::UnknownCommand { .. })
        ));

        let instr = Instruction::delete(darc.base_id(), CONTRACT_DARC, vec![1]);
        assert!(matches!(
            DarcContract.delete(&staged, &instr),
            Err(ContractError::DeleteForbidden(_))
        ));
    }

    #[test]
    fn test_missing_darc_argument() {
        let darc = Darc::granting("root", ident(1), &["spawn:darc"]);
        let staged = staged_with_darc(&darc);
        let instr = Instruction::spawn(darc.base_id(), CONTRACT_DARC, vec![], vec![1]);
        assert!(matches!(
            DarcContract.spawn(&staged, &instr),
            Err(ContractError::MissingArgument(_))
        ));
    }
}

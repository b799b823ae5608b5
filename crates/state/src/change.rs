//! State changes produced by contract execution.

use skipledger_core::InstanceID;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One mutation of the authenticated store.
///
/// Contracts return lists of these; the executor folds them into the
/// staged store, where the validity rules live: Create requires the id
/// to be free, Update and Remove require it to be live.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChange {
    /// Create a new instance with version 0.
    Create {
        id: InstanceID,
        contract_id: String,
        darc_id: InstanceID,
        value: Vec<u8>,
    },
    /// Replace an instance's value, bumping its version by one.
    Update { id: InstanceID, value: Vec<u8> },
    /// Remove an instance. Its version sequence is never reused.
    Remove { id: InstanceID },
}

impl StateChange {
    /// The instance this change targets.
    pub fn id(&self) -> &InstanceID {
        match self {
            StateChange::Create { id, .. } => id,
            StateChange::Update { id, .. } => id,
            StateChange::Remove { id } => id,
        }
    }
}

impl fmt::Debug for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateChange::Create {
                id, contract_id, ..
            } => write!(f, "Create({:?}, {})", id, contract_id),
            StateChange::Update { id, value } => {
                write!(f, "Update({:?}, {} bytes)", id, value.len())
            }
            StateChange::Remove { id } => write!(f, "Remove({:?})", id),
        }
    }
}

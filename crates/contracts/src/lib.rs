//! Contracts for skipledger.
//!
//! A contract is the only code allowed to produce state changes. The
//! executor resolves each instruction to a registered contract through
//! the [`ContractRegistry`], checks darc authorization, and folds the
//! returned changes into the staged store. Three contracts ship built
//! in: `darc` (access control), `value` (raw bytes) and `credential`
//! (named attribute sets).

pub mod contract;
pub mod credential;
pub mod darc;
pub mod value;

// Re-export commonly used types
pub use contract::{Contract, ContractError, ContractRegistry, Execution};
pub use credential::{Attribute, Credential, CredentialContract, CredentialStruct, CONTRACT_CREDENTIAL};
pub use darc::{verify_authorization, Darc, DarcContract, CONTRACT_DARC};
pub use value::{ValueContract, CONTRACT_VALUE};

//! Chain orchestration for skipledger.
//!
//! Ties the other crates together: the [`Executor`] runs transactions
//! against a staged store, the [`BlockProducer`] turns batches of
//! transactions into collectively signed chain links, the [`Ledger`]
//! facade owns the store, the chain and the mempool, and the
//! [`paginate`] service streams block ranges to clients.

pub mod executor;
pub mod ledger;
pub mod mempool;
pub mod paginate;
pub mod producer;
pub mod signer;

// Re-export commonly used types
pub use executor::{ExecuteError, Executor};
pub use ledger::{GenesisConfig, Ledger, LedgerError};
pub use mempool::{Mempool, MempoolError};
pub use paginate::{
    paginate, Canceler, PaginateRequest, PaginateResponse, ERROR_BAD_PARAMS, ERROR_EXHAUSTED,
    ERROR_OK, ERROR_PAST_GENESIS,
};
pub use producer::{BlockProducer, ProduceError, Proposal};
pub use signer::{CollectiveSigner, LocalSigner, RefusingSigner, SigningError};

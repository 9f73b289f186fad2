//! Interfaces between the cinder coordinator and its collaborators.
//!
//! The coordinator drives a canonical chain, a block import queue, a
//! transaction queue, a peer host and a mining farm; this crate defines the
//! seams, leaving transport, validation, storage engines and the proof-of-work
//! kernel to the implementations behind them.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod chain;
mod db;
mod error;
mod executor;
mod farm;
mod host;
mod queue;
mod sync;

pub use chain::{BadBlockCallback, Blockchain, SyncOutcome};
pub use db::{MemoryStateDb, StateDatabase, WithExisting};
pub use error::{BadBlockReport, ChainError};
pub use executor::{CallRequest, EnvInfo, ExecutionError, ExecutionOutcome, TransactionExecutor};
pub use farm::{MiningFarm, MiningProgress, SolutionCallback};
pub use host::{PeerHost, SyncCapability, SyncStatus};
pub use queue::{
    BlockImportQueue, IfDropped, ImportResult, QueueStatus, ReadyCallback, TransactionQueue,
};
pub use sync::SyncState;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

//! Mock collaborator implementations shared by the workspace's tests.

mod chain;
mod executor;
mod farm;
mod host;
mod queues;

pub use chain::TestChain;
pub use executor::{signer, transfer, NoopExecutor, TransferExecutor, GAS_PER_TRANSFER};
pub use farm::TestFarm;
pub use host::TestHost;
pub use queues::{TestBlockQueue, TestTransactionQueue};

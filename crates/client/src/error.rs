use cinder_interfaces::ChainError;
use cinder_primitives::B256;

/// Errors surfaced by the coordinator's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The chain collaborator failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A state query referenced a pending transaction index that does not
    /// exist.
    #[error("no pending transaction at index {0}")]
    UnknownPendingIndex(usize),
    /// A query referenced a block the chain does not know.
    #[error("unknown block {0}")]
    UnknownBlock(B256),
    /// Replaying previously applied pending transactions produced a different
    /// result.
    #[error("pending replay diverged: {0}")]
    ReplayDiverged(String),
    /// The on-disk database could not be prepared.
    #[error("database io: {0}")]
    Io(#[from] std::io::Error),
}

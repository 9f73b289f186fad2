use crate::{
    db::{StateDatabase, WithExisting},
    error::{BadBlockReport, ChainError},
    queue::BlockImportQueue,
};
use cinder_primitives::{
    Block, BlockInfo, ChainInfo, Receipt, StateOverlay, TransactionSigned, B256,
};
use std::path::Path;

/// Invoked by the chain or the import queue when a block fails validation.
pub type BadBlockCallback = Box<dyn Fn(&BadBlockReport) + Send + Sync>;

/// The outcome of draining verified blocks from the import queue into the
/// chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Hashes that became part of the canonical chain, oldest first.
    pub imported: Vec<B256>,
    /// Hashes that fell off the canonical chain, oldest first.
    pub retracted: Vec<B256>,
    /// Whether the queue still holds verified blocks after this drain.
    pub more_available: bool,
}

/// The canonical block chain.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Blockchain: Send + Sync {
    /// The current chain head.
    fn chain_info(&self) -> ChainInfo;

    /// The hash of the current head block.
    fn current_hash(&self) -> B256;

    /// The hash of the genesis block.
    fn genesis_hash(&self) -> B256;

    /// The headline view of the block with the given hash.
    fn block_info(&self, hash: B256) -> Option<BlockInfo>;

    /// The full block with the given hash.
    fn block(&self, hash: B256) -> Option<Block>;

    /// The receipts of the block with the given hash, in transaction order.
    fn receipts(&self, hash: B256) -> Option<Vec<Receipt>>;

    /// The transactions of the block with the given hash.
    fn transactions(&self, hash: B256) -> Option<Vec<TransactionSigned>>;

    /// The transaction hashes of the block with the given hash.
    fn transaction_hashes(&self, hash: B256) -> Option<Vec<B256>>;

    /// Materialises the account state as of the block with the given hash.
    fn state_at(&self, hash: B256) -> Result<StateOverlay, ChainError>;

    /// Drains up to `max_blocks` verified blocks from `queue` into the chain,
    /// writing state through `state_db`.
    fn sync(
        &self,
        queue: &dyn BlockImportQueue,
        state_db: &dyn StateDatabase,
        max_blocks: usize,
    ) -> SyncOutcome;

    /// Prunes caches and stale side-chain data.
    fn garbage_collect(&self);

    /// Installs the callback invoked when an already-persisted block turns
    /// out to be bad during re-verification.
    fn set_on_bad(&self, callback: BadBlockCallback);

    /// Reopens the chain store at `path`, honouring `action`.
    fn reopen(&self, path: &Path, action: WithExisting) -> Result<(), ChainError>;
}

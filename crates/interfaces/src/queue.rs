use crate::chain::BadBlockCallback;
use cinder_primitives::{Block, TransactionSigned, B256};

/// The outcome of offering a block or transaction to a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportResult {
    /// Accepted and queued.
    Success,
    /// Already queued.
    AlreadyKnown,
    /// Already part of the canonical chain.
    AlreadyInChain,
    /// Timestamped too far in the future to accept yet.
    FutureTime,
    /// The parent is not known.
    UnknownParent,
    /// Exceeds the block gas limit.
    OverGasLimit,
    /// Could not be decoded.
    Malformed,
    /// Extends a chain already known to be bad.
    BadChain,
}

impl ImportResult {
    /// Returns `true` if the item was accepted.
    pub const fn is_success(&self) -> bool {
        matches!(self, ImportResult::Success)
    }
}

/// Whether a transaction that was previously dropped from the queue may be
/// imported again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IfDropped {
    /// Refuse re-import of dropped transactions.
    Discard,
    /// Accept the transaction again; used when a chain reorg returns
    /// transactions to circulation.
    Retry,
}

/// How much work a queue is holding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStatus {
    /// Items verified and ready for the chain.
    pub pending: usize,
    /// Items still being verified.
    pub verifying: usize,
}

/// Invoked by a queue whenever new work becomes ready.
pub type ReadyCallback = Box<dyn Fn() + Send + Sync>;

/// Accepts raw blocks, validates them and surfaces ready batches for chain
/// insertion.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait BlockImportQueue: Send + Sync {
    /// Offers an encoded block. `is_ours` marks blocks this node sealed.
    fn import(&self, bytes: &[u8], is_ours: bool) -> ImportResult;

    /// How much work the queue holds.
    fn status(&self) -> QueueStatus;

    /// Removes and returns up to `max` verified blocks, oldest first.
    fn drain_verified(&self, max: usize) -> Vec<Block>;

    /// Periodic maintenance: retries blocks whose parents have arrived and
    /// expires future-timestamped blocks that have come due.
    fn tick(&self);

    /// Drops everything.
    fn clear(&self);

    /// Installs the readiness callback.
    fn on_ready(&self, callback: ReadyCallback);

    /// Installs the callback invoked when a queued block fails verification.
    fn set_on_bad(&self, callback: BadBlockCallback);
}

/// Accepts transactions, deduplicates them and surfaces the ones ready for
/// inclusion.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait TransactionQueue: Send + Sync {
    /// Offers a signed transaction.
    fn import(&self, transaction: TransactionSigned, if_dropped: IfDropped) -> ImportResult;

    /// All transactions currently ready for inclusion, in priority order.
    fn ready_transactions(&self) -> Vec<TransactionSigned>;

    /// Removes a transaction, marking it dropped.
    fn drop_transaction(&self, hash: B256);

    /// Drops everything, including the dropped-set.
    fn clear(&self);

    /// Installs the readiness callback.
    fn on_ready(&self, callback: ReadyCallback);
}

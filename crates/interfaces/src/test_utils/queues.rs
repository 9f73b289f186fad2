use crate::{
    chain::BadBlockCallback,
    queue::{BlockImportQueue, IfDropped, ImportResult, QueueStatus, ReadyCallback, TransactionQueue},
};
use alloy_rlp::Decodable;
use cinder_primitives::{Block, TransactionSigned, B256};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};

/// An in-memory block import queue that treats every decodable block as
/// verified immediately.
#[derive(Default)]
pub struct TestBlockQueue {
    verified: Mutex<VecDeque<Block>>,
    known: Mutex<HashSet<B256>>,
    ours: Mutex<Vec<B256>>,
    ready: RwLock<Option<ReadyCallback>>,
    on_bad: RwLock<Option<BadBlockCallback>>,
}

impl TestBlockQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes that were imported with `is_ours = true`, in import order.
    pub fn our_blocks(&self) -> Vec<B256> {
        self.ours.lock().clone()
    }

    /// Invokes the installed bad-block callback, if any.
    pub fn report_bad(&self, report: &crate::error::BadBlockReport) {
        if let Some(callback) = self.on_bad.read().as_ref() {
            callback(report);
        }
    }

    fn notify_ready(&self) {
        if let Some(callback) = self.ready.read().as_ref() {
            callback();
        }
    }
}

impl BlockImportQueue for TestBlockQueue {
    fn import(&self, bytes: &[u8], is_ours: bool) -> ImportResult {
        let Ok(block) = Block::decode(&mut &bytes[..]) else {
            return ImportResult::Malformed
        };
        let hash = block.hash_slow();
        if !self.known.lock().insert(hash) {
            return ImportResult::AlreadyKnown
        }
        if is_ours {
            self.ours.lock().push(hash);
        }
        self.verified.lock().push_back(block);
        self.notify_ready();
        ImportResult::Success
    }

    fn status(&self) -> QueueStatus {
        QueueStatus { pending: self.verified.lock().len(), verifying: 0 }
    }

    fn drain_verified(&self, max: usize) -> Vec<Block> {
        let mut verified = self.verified.lock();
        let take = max.min(verified.len());
        verified.drain(..take).collect()
    }

    fn tick(&self) {}

    fn clear(&self) {
        self.verified.lock().clear();
        self.known.lock().clear();
        self.ours.lock().clear();
    }

    fn on_ready(&self, callback: ReadyCallback) {
        *self.ready.write() = Some(callback);
    }

    fn set_on_bad(&self, callback: BadBlockCallback) {
        *self.on_bad.write() = Some(callback);
    }
}

impl std::fmt::Debug for TestBlockQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestBlockQueue").field("pending", &self.verified.lock().len()).finish()
    }
}

/// An in-memory transaction queue preserving import order.
#[derive(Default)]
pub struct TestTransactionQueue {
    queue: Mutex<Vec<TransactionSigned>>,
    known: Mutex<HashSet<B256>>,
    dropped: Mutex<HashSet<B256>>,
    ready: RwLock<Option<ReadyCallback>>,
}

impl TestTransactionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of queued transactions.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Returns `true` if the transaction with `hash` is queued.
    pub fn contains(&self, hash: B256) -> bool {
        self.known.lock().contains(&hash)
    }

    fn notify_ready(&self) {
        if let Some(callback) = self.ready.read().as_ref() {
            callback();
        }
    }
}

impl TransactionQueue for TestTransactionQueue {
    fn import(&self, transaction: TransactionSigned, if_dropped: IfDropped) -> ImportResult {
        let hash = transaction.hash();
        if self.known.lock().contains(&hash) {
            return ImportResult::AlreadyKnown
        }
        if self.dropped.lock().contains(&hash) && if_dropped == IfDropped::Discard {
            return ImportResult::AlreadyKnown
        }
        self.dropped.lock().remove(&hash);
        self.known.lock().insert(hash);
        self.queue.lock().push(transaction);
        self.notify_ready();
        ImportResult::Success
    }

    fn ready_transactions(&self) -> Vec<TransactionSigned> {
        self.queue.lock().clone()
    }

    fn drop_transaction(&self, hash: B256) {
        self.queue.lock().retain(|tx| tx.hash() != hash);
        self.known.lock().remove(&hash);
        self.dropped.lock().insert(hash);
    }

    fn clear(&self) {
        self.queue.lock().clear();
        self.known.lock().clear();
        self.dropped.lock().clear();
    }

    fn on_ready(&self, callback: ReadyCallback) {
        *self.ready.write() = Some(callback);
    }
}

impl std::fmt::Debug for TestTransactionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestTransactionQueue").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{signer, transfer};

    #[test]
    fn dropped_transactions_need_retry_to_reenter() {
        let queue = TestTransactionQueue::new();
        let tx = transfer(1, signer(2), 0, 1, 1);
        let hash = tx.hash();

        assert!(queue.import(tx.clone(), IfDropped::Discard).is_success());
        queue.drop_transaction(hash);
        assert!(queue.is_empty());

        assert_eq!(queue.import(tx.clone(), IfDropped::Discard), ImportResult::AlreadyKnown);
        assert!(queue.import(tx, IfDropped::Retry).is_success());
        assert!(queue.contains(hash));
    }

    #[test]
    fn block_queue_rejects_garbage_and_duplicates() {
        let queue = TestBlockQueue::new();
        assert_eq!(queue.import(b"not rlp", false), ImportResult::Malformed);

        let block = Block::default();
        let bytes = block.rlp_bytes();
        assert!(queue.import(&bytes, true).is_success());
        assert_eq!(queue.import(&bytes, true), ImportResult::AlreadyKnown);
        assert_eq!(queue.our_blocks(), vec![block.hash_slow()]);
        assert_eq!(queue.status().pending, 1);
    }
}

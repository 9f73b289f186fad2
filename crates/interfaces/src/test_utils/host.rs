use crate::{
    host::{PeerHost, SyncCapability, SyncStatus},
    sync::SyncState,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// A peer host that records notifications instead of talking to a network.
#[derive(Default)]
pub struct TestHost {
    capability: RwLock<Option<SyncCapability>>,
    syncing: AtomicBool,
    network_id: AtomicU64,
    new_transaction_notes: AtomicUsize,
    new_block_notes: AtomicUsize,
    resets: AtomicUsize,
}

impl TestHost {
    /// Creates an idle host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the network as syncing or idle.
    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::Relaxed);
    }

    /// The registered capability, if any.
    pub fn capability(&self) -> Option<SyncCapability> {
        self.capability.read().clone()
    }

    /// How many times the coordinator announced new transactions.
    pub fn new_transaction_notes(&self) -> usize {
        self.new_transaction_notes.load(Ordering::Relaxed)
    }

    /// How many times the coordinator announced new blocks.
    pub fn new_block_notes(&self) -> usize {
        self.new_block_notes.load(Ordering::Relaxed)
    }

    /// How many times the coordinator reset the sync state.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    /// The last network id set.
    pub fn network_id(&self) -> u64 {
        self.network_id.load(Ordering::Relaxed)
    }
}

impl PeerHost for TestHost {
    fn register_capability(&self, capability: SyncCapability) {
        self.network_id.store(capability.network_id, Ordering::Relaxed);
        *self.capability.write() = Some(capability);
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            state: if self.is_syncing() { SyncState::Syncing } else { SyncState::Idle },
            ..Default::default()
        }
    }

    fn set_network_id(&self, network_id: u64) {
        self.network_id.store(network_id, Ordering::Relaxed);
    }

    fn note_new_transactions(&self) {
        self.new_transaction_notes.fetch_add(1, Ordering::Relaxed);
    }

    fn note_new_blocks(&self) {
        self.new_block_notes.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHost").field("syncing", &self.is_syncing()).finish()
    }
}

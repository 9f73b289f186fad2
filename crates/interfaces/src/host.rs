use crate::{chain::Blockchain, queue::{BlockImportQueue, TransactionQueue}, sync::SyncState};
use std::sync::Weak;

/// Sync progress as reported to peers and RPC callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether the node is idle or syncing.
    pub state: SyncState,
    /// The wire protocol version in use.
    pub protocol_version: u64,
    /// The block height sync started from.
    pub start_block_number: u64,
    /// The block height reached so far.
    pub current_block_number: u64,
    /// The best block height seen on the network.
    pub highest_block_number: u64,
}

/// The chain-sync capability handed to the peer host.
///
/// The coordinator owns the chain and the queues; the capability only holds
/// non-owning handles, so tearing the coordinator down is never blocked by
/// the peer layer.
#[derive(Clone)]
pub struct SyncCapability {
    /// The canonical chain.
    pub chain: Weak<dyn Blockchain>,
    /// The block import queue peers feed.
    pub block_queue: Weak<dyn BlockImportQueue>,
    /// The transaction queue peers feed.
    pub transaction_queue: Weak<dyn TransactionQueue>,
    /// The network this capability serves.
    pub network_id: u64,
}

impl std::fmt::Debug for SyncCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCapability").field("network_id", &self.network_id).finish()
    }
}

/// The peer-to-peer host.
///
/// Transport, discovery and session management are entirely behind this
/// trait; the coordinator only registers its capability and nudges peers
/// when it has news.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait PeerHost: Send + Sync {
    /// Registers the chain-sync capability.
    fn register_capability(&self, capability: SyncCapability);

    /// Current sync progress.
    fn status(&self) -> SyncStatus;

    /// Switches the network this node participates in.
    fn set_network_id(&self, network_id: u64);

    /// Notifies peers that new pending transactions are available.
    fn note_new_transactions(&self);

    /// Notifies peers that new blocks are available.
    fn note_new_blocks(&self);

    /// Drops all sync state, e.g. after the chain was wiped.
    fn reset(&self);

    /// Returns `true` while the network is downloading chain history.
    fn is_syncing(&self) -> bool;
}

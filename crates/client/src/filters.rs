//! Installed log filters and polled watches.
//!
//! Filters accumulate matching log entries as the coordinator drains its
//! queues; watches are the polled subscriptions on top of them. Two sentinel
//! filter ids exist process-wide and collect raw hashes instead of log
//! entries: one for pending-transaction changes and one for chain changes.

use cinder_primitives::{
    keccak256, Address, BlockInfo, LocalizedLog, Log, Receipt, B256,
};
use alloy_rlp::RlpEncodable;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};
use tracing::trace;

/// Sentinel filter id fed a transaction hash whenever the pending set grows.
pub const PENDING_CHANGED_FILTER: B256 = B256::ZERO;

/// Sentinel filter id fed a block hash whenever the chain advances.
pub const CHAIN_CHANGED_FILTER: B256 = B256::with_last_byte(1);

/// What a watch subscribes to.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Match logs emitted by any of these addresses; empty matches all.
    pub addresses: Vec<Address>,
    /// Positional topic constraints; an empty set at a position matches any
    /// topic there.
    pub topics: Vec<Vec<B256>>,
}

impl FilterCriteria {
    /// Restricts the filter to logs from `address`.
    pub fn address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    /// Appends a positional topic constraint.
    pub fn topic(mut self, alternatives: Vec<B256>) -> Self {
        self.topics.push(alternatives);
        self
    }

    /// The id this criteria installs under.
    pub fn id(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }

    /// Whether `log` satisfies every constraint.
    pub fn matches(&self, log: &Log) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false
        }
        for (position, alternatives) in self.topics.iter().enumerate() {
            if alternatives.is_empty() {
                continue
            }
            match log.topics.get(position) {
                Some(topic) if alternatives.contains(topic) => {}
                _ => return false,
            }
        }
        true
    }
}

/// A single change delivered to a watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterChange {
    /// A matching log entry.
    Log(LocalizedLog),
    /// A raw hash, delivered by the sentinel filters.
    Hash(B256),
}

struct InstalledFilter {
    criteria: FilterCriteria,
    refs: usize,
    changes: Vec<LocalizedLog>,
}

enum LastPoll {
    At(Instant),
    /// Opted out of garbage collection.
    Exempt,
}

struct Watch {
    filter_id: B256,
    last_poll: LastPoll,
    changes: Vec<FilterChange>,
}

/// Installed filters, their sentinel siblings, and the watches polling them.
pub struct FilterRegistry {
    filters: HashMap<B256, InstalledFilter>,
    sentinels: HashMap<B256, Vec<B256>>,
    watches: HashMap<u64, Watch>,
    next_watch_id: u64,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut sentinels = HashMap::new();
        sentinels.insert(PENDING_CHANGED_FILTER, Vec::new());
        sentinels.insert(CHAIN_CHANGED_FILTER, Vec::new());
        FilterRegistry { filters: HashMap::new(), sentinels, watches: HashMap::new(), next_watch_id: 0 }
    }
}

impl FilterRegistry {
    /// Creates an empty registry with the two sentinel filters installed.
    pub fn new() -> Self {
        Self::default()
    }

    fn new_watch(&mut self, filter_id: B256) -> u64 {
        let id = self.next_watch_id;
        self.next_watch_id += 1;
        self.watches.insert(
            id,
            Watch { filter_id, last_poll: LastPoll::At(Instant::now()), changes: Vec::new() },
        );
        id
    }

    /// Installs a watch over `criteria`, sharing the underlying filter with
    /// any watch of identical criteria.
    pub fn install_watch(&mut self, criteria: FilterCriteria) -> u64 {
        let filter_id = criteria.id();
        self.filters
            .entry(filter_id)
            .or_insert_with(|| InstalledFilter { criteria, refs: 0, changes: Vec::new() })
            .refs += 1;
        trace!(target: "client::filter", %filter_id, "installed filter watch");
        self.new_watch(filter_id)
    }

    /// Installs a watch over a sentinel filter; returns `None` for an id that
    /// is not a sentinel.
    pub fn install_sentinel_watch(&mut self, filter_id: B256) -> Option<u64> {
        if !self.sentinels.contains_key(&filter_id) {
            return None
        }
        Some(self.new_watch(filter_id))
    }

    /// Excludes a watch from garbage collection.
    pub fn exempt_from_gc(&mut self, watch_id: u64) {
        if let Some(watch) = self.watches.get_mut(&watch_id) {
            watch.last_poll = LastPoll::Exempt;
        }
    }

    /// Removes a watch; the underlying filter goes away with its last watch.
    /// Returns `false` if no such watch exists.
    pub fn uninstall_watch(&mut self, watch_id: u64) -> bool {
        let Some(watch) = self.watches.remove(&watch_id) else { return false };
        if let Some(filter) = self.filters.get_mut(&watch.filter_id) {
            filter.refs -= 1;
            if filter.refs == 0 {
                self.filters.remove(&watch.filter_id);
            }
        }
        trace!(target: "client::filter", watch_id, "uninstalled watch");
        true
    }

    /// Returns `true` if the watch exists.
    pub fn has_watch(&self, watch_id: u64) -> bool {
        self.watches.contains_key(&watch_id)
    }

    /// Returns the accumulated changes without draining them.
    pub fn peek_watch(&mut self, watch_id: u64) -> Option<Vec<FilterChange>> {
        let watch = self.watches.get_mut(&watch_id)?;
        if let LastPoll::At(_) = watch.last_poll {
            watch.last_poll = LastPoll::At(Instant::now());
        }
        Some(watch.changes.clone())
    }

    /// Drains and returns the accumulated changes.
    pub fn check_watch(&mut self, watch_id: u64) -> Option<Vec<FilterChange>> {
        let watch = self.watches.get_mut(&watch_id)?;
        if let LastPoll::At(_) = watch.last_poll {
            watch.last_poll = LastPoll::At(Instant::now());
        }
        Some(std::mem::take(&mut watch.changes))
    }

    /// Matches a freshly applied pending transaction's receipt against every
    /// filter, and records the transaction hash with the pending sentinel.
    pub fn append_from_new_pending(
        &mut self,
        receipt: &Receipt,
        transaction_hash: B256,
        transaction_index: u64,
        changed: &mut HashSet<B256>,
    ) {
        changed.insert(PENDING_CHANGED_FILTER);
        self.sentinels
            .get_mut(&PENDING_CHANGED_FILTER)
            .expect("sentinels are always installed")
            .push(transaction_hash);

        for (filter_id, filter) in &mut self.filters {
            let mut caught = false;
            for (log_index, log) in receipt.logs.iter().enumerate() {
                if filter.criteria.matches(log) {
                    filter.changes.push(LocalizedLog {
                        log: log.clone(),
                        block_hash: B256::ZERO,
                        block_number: 0,
                        transaction_hash,
                        transaction_index,
                        log_index: log_index as u64,
                    });
                    caught = true;
                }
            }
            if caught {
                changed.insert(*filter_id);
            }
        }
    }

    /// Matches an imported block's receipts against every filter, and records
    /// the block hash with the chain sentinel.
    ///
    /// Log indices are assigned monotonically across the whole block.
    pub fn append_from_new_block(
        &mut self,
        info: &BlockInfo,
        receipts: &[Receipt],
        transaction_hashes: &[B256],
        changed: &mut HashSet<B256>,
    ) {
        changed.insert(CHAIN_CHANGED_FILTER);
        self.sentinels
            .get_mut(&CHAIN_CHANGED_FILTER)
            .expect("sentinels are always installed")
            .push(info.hash);

        let mut log_index = 0u64;
        for (transaction_index, receipt) in receipts.iter().enumerate() {
            let transaction_hash =
                transaction_hashes.get(transaction_index).copied().unwrap_or_default();
            for log in &receipt.logs {
                for (filter_id, filter) in &mut self.filters {
                    if filter.criteria.matches(log) {
                        filter.changes.push(LocalizedLog {
                            log: log.clone(),
                            block_hash: info.hash,
                            block_number: info.number,
                            transaction_hash,
                            transaction_index: transaction_index as u64,
                            log_index,
                        });
                        changed.insert(*filter_id);
                    }
                }
                log_index += 1;
            }
        }
    }

    /// Moves the buffered changes of every filter in `changed` into the
    /// watches polling it, then clears all filter buffers.
    pub fn note_changed(&mut self, changed: &HashSet<B256>) {
        if changed.is_empty() {
            return
        }

        for watch in self.watches.values_mut() {
            if !changed.contains(&watch.filter_id) {
                continue
            }
            if let Some(filter) = self.filters.get(&watch.filter_id) {
                watch.changes.extend(filter.changes.iter().cloned().map(FilterChange::Log));
            } else if let Some(hashes) = self.sentinels.get(&watch.filter_id) {
                watch.changes.extend(hashes.iter().copied().map(FilterChange::Hash));
            }
        }

        for filter in self.filters.values_mut() {
            filter.changes.clear();
        }
        for hashes in self.sentinels.values_mut() {
            hashes.clear();
        }
    }

    /// Uninstalls every watch that has not been polled within `ttl`.
    /// Returns the removed watch ids.
    pub fn garbage_collect(&mut self, ttl: Duration) -> Vec<u64> {
        let now = Instant::now();
        let stale: Vec<u64> = self
            .watches
            .iter()
            .filter(|(_, watch)| match watch.last_poll {
                LastPoll::At(at) => now.duration_since(at) > ttl,
                LastPoll::Exempt => false,
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            trace!(target: "client::filter", watch_id = id, "evicting stale watch");
            self.uninstall_watch(*id);
        }
        stale
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.filters.len())
            .field("watches", &self.watches.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_primitives::Bytes;

    fn log_from(address: Address) -> Log {
        Log { address, topics: vec![B256::repeat_byte(0xaa)], data: Bytes::new() }
    }

    fn receipt_with(logs: Vec<Log>) -> Receipt {
        Receipt { success: true, gas_used: 21_000, cumulative_gas_used: 21_000, logs }
    }

    #[test]
    fn criteria_matches_positionally() {
        let log = log_from(Address::repeat_byte(1));
        assert!(FilterCriteria::default().matches(&log));
        assert!(FilterCriteria::default().address(log.address).matches(&log));
        assert!(!FilterCriteria::default().address(Address::repeat_byte(2)).matches(&log));
        assert!(FilterCriteria::default().topic(vec![B256::repeat_byte(0xaa)]).matches(&log));
        assert!(!FilterCriteria::default().topic(vec![B256::repeat_byte(0xbb)]).matches(&log));
        // a constraint on a position the log does not have fails
        assert!(!FilterCriteria::default()
            .topic(vec![])
            .topic(vec![B256::repeat_byte(0xaa)])
            .matches(&log));
    }

    #[test]
    fn identical_criteria_share_a_filter() {
        let mut registry = FilterRegistry::new();
        let criteria = FilterCriteria::default().address(Address::repeat_byte(1));
        let a = registry.install_watch(criteria.clone());
        let b = registry.install_watch(criteria);
        assert_ne!(a, b);
        assert_eq!(registry.filters.len(), 1);

        registry.uninstall_watch(a);
        assert_eq!(registry.filters.len(), 1);
        registry.uninstall_watch(b);
        assert!(registry.filters.is_empty());
    }

    #[test]
    fn pending_changes_flow_to_watches() {
        let mut registry = FilterRegistry::new();
        let address = Address::repeat_byte(1);
        let watch = registry.install_watch(FilterCriteria::default().address(address));
        let pending = registry.install_sentinel_watch(PENDING_CHANGED_FILTER).unwrap();

        let mut changed = HashSet::new();
        let tx_hash = B256::repeat_byte(0x77);
        registry.append_from_new_pending(
            &receipt_with(vec![log_from(address)]),
            tx_hash,
            0,
            &mut changed,
        );
        registry.note_changed(&changed);

        let changes = registry.check_watch(watch).unwrap();
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            FilterChange::Log(entry) => {
                assert_eq!(entry.transaction_hash, tx_hash);
                assert_eq!(entry.block_number, 0);
            }
            other => panic!("expected a log change, got {other:?}"),
        }
        assert_eq!(
            registry.check_watch(pending).unwrap(),
            vec![FilterChange::Hash(tx_hash)]
        );

        // buffers were cleared by note_changed
        assert!(registry.check_watch(watch).unwrap().is_empty());
    }

    #[test]
    fn block_changes_number_logs_across_the_block() {
        let mut registry = FilterRegistry::new();
        let address = Address::repeat_byte(1);
        let watch = registry.install_watch(FilterCriteria::default().address(address));

        let receipts = vec![
            receipt_with(vec![log_from(address), log_from(address)]),
            receipt_with(vec![log_from(address)]),
        ];
        let tx_hashes = vec![B256::repeat_byte(2), B256::repeat_byte(3)];
        let info = BlockInfo { hash: B256::repeat_byte(9), number: 5, ..Default::default() };

        let mut changed = HashSet::new();
        registry.append_from_new_block(&info, &receipts, &tx_hashes, &mut changed);
        registry.note_changed(&changed);

        let changes = registry.check_watch(watch).unwrap();
        let indices: Vec<(u64, u64)> = changes
            .iter()
            .map(|change| match change {
                FilterChange::Log(entry) => (entry.transaction_index, entry.log_index),
                other => panic!("expected a log change, got {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![(0, 0), (0, 1), (1, 2)]);
    }

    #[test]
    fn peek_does_not_drain() {
        let mut registry = FilterRegistry::new();
        let watch = registry.install_sentinel_watch(CHAIN_CHANGED_FILTER).unwrap();

        let mut changed = HashSet::new();
        registry.append_from_new_block(
            &BlockInfo { hash: B256::repeat_byte(4), ..Default::default() },
            &[],
            &[],
            &mut changed,
        );
        registry.note_changed(&changed);

        assert_eq!(registry.peek_watch(watch).unwrap().len(), 1);
        assert_eq!(registry.peek_watch(watch).unwrap().len(), 1);
        assert_eq!(registry.check_watch(watch).unwrap().len(), 1);
        assert!(registry.check_watch(watch).unwrap().is_empty());
    }

    #[test]
    fn unpolled_watches_are_collected() {
        let mut registry = FilterRegistry::new();
        let polled = registry.install_watch(FilterCriteria::default());
        let stale = registry.install_sentinel_watch(PENDING_CHANGED_FILTER).unwrap();
        let exempt = registry.install_sentinel_watch(CHAIN_CHANGED_FILTER).unwrap();
        registry.exempt_from_gc(exempt);

        // nothing is stale within the horizon
        assert!(registry.garbage_collect(Duration::from_secs(20)).is_empty());

        // with a zero horizon, a fresh poll is the only thing keeping a watch
        registry.check_watch(polled);
        let _ = registry.watches.get_mut(&stale).map(|w| {
            w.last_poll = LastPoll::At(Instant::now() - Duration::from_secs(21));
        });
        let removed = registry.garbage_collect(Duration::from_secs(20));
        assert_eq!(removed, vec![stale]);
        assert!(registry.has_watch(polled));
        assert!(registry.has_watch(exempt));
        assert!(!registry.has_watch(stale));
        assert!(registry.check_watch(stale).is_none());
    }
}

//! The client coordinator.
//!
//! Binds the canonical chain, the block import queue, the transaction queue,
//! the peer host and the mining farm together and keeps them mutually
//! consistent: inbound blocks and transactions are drained into the three
//! state snapshots, watchers are told what changed, and mining work is
//! re-seeded whenever the post-state moves.

use crate::{
    config::ClientConfig,
    db_version::VersionChecker,
    error::ClientError,
    filters::{FilterChange, FilterCriteria, FilterRegistry},
    gas_price::GasPricer,
    report,
    state::PendingState,
    worker::{self, WorkSignal, Worker, MIN_SYNC_BLOCKS},
};
use cinder_interfaces::{
    BadBlockReport, BlockImportQueue, Blockchain, CallRequest, EnvInfo, IfDropped, MiningFarm,
    MiningProgress, PeerHost, StateDatabase, SyncCapability, SyncOutcome, SyncStatus,
    TransactionExecutor, TransactionQueue, WithExisting,
};
use cinder_primitives::{
    pow, Address, Bytes, ChainInfo, Log, PowSolution, StateOverlay, TransactionSigned,
    WorkPackage, B256, U256,
};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, trace, warn};

/// The well-known address whose storage slot zero signals network-wide
/// health. A non-zero value marks the chain bad; the value two additionally
/// asks for a client upgrade.
pub const CANARY_ADDRESS: Address = Address::ZERO;

/// How long after the last `get_work` poll a remote miner is considered
/// active.
const REMOTE_WORK_WINDOW: Duration = Duration::from_secs(30);

/// Cadence of the maintenance tick.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of watch garbage collection.
const GC_INTERVAL: Duration = Duration::from_secs(5);

/// Watches unpolled for longer than this are evicted.
const WATCH_TTL: Duration = Duration::from_secs(20);

/// The longest the worker sleeps between iterations without a signal.
const MAX_IDLE_WAIT: Duration = Duration::from_secs(1);

/// The collaborators a [`Client`] is built from.
pub struct ClientComponents {
    /// The canonical chain.
    pub chain: Arc<dyn Blockchain>,
    /// The content-addressed state store.
    pub state_db: Arc<dyn StateDatabase>,
    /// The block import queue.
    pub block_queue: Arc<dyn BlockImportQueue>,
    /// The transaction queue.
    pub transaction_queue: Arc<dyn TransactionQueue>,
    /// The peer host.
    pub host: Arc<dyn PeerHost>,
    /// The mining farm.
    pub farm: Arc<dyn MiningFarm>,
    /// The transaction executor.
    pub executor: Arc<dyn TransactionExecutor>,
    /// The gas price estimator.
    pub gas_pricer: Box<dyn GasPricer>,
}

impl std::fmt::Debug for ClientComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientComponents").finish_non_exhaustive()
    }
}

/// The result of a simulated call.
///
/// Simulation failures do not propagate; the failure indication rides along
/// in [`CallResult::error`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallResult {
    /// Whether the simulated execution completed without reverting.
    pub success: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Return data.
    pub output: Bytes,
    /// Logs emitted.
    pub logs: Vec<Log>,
    /// Set when simulation could not run at all.
    pub error: Option<String>,
}

/// A coarse liveness counter for the worker loop.
#[derive(Clone, Copy, Debug)]
pub struct ActivityReport {
    /// Maintenance ticks since start.
    pub ticks: u64,
    /// When counting started.
    pub since: Instant,
}

impl Default for ActivityReport {
    fn default() -> Self {
        ActivityReport { ticks: 0, since: Instant::now() }
    }
}

impl std::fmt::Display for ActivityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ticks over {}s", self.ticks, self.since.elapsed().as_secs())
    }
}

/// The client coordinator.
///
/// All methods may be called concurrently from RPC handlers, peer callbacks
/// and mining workers; a dedicated worker thread drains the queues.
pub struct Client {
    inner: Arc<ClientInner>,
    worker: Mutex<Option<Worker>>,
}

struct ClientInner {
    config: ClientConfig,
    db_path: PathBuf,

    chain: Arc<dyn Blockchain>,
    state_db: Arc<dyn StateDatabase>,
    block_queue: Arc<dyn BlockImportQueue>,
    transaction_queue: Arc<dyn TransactionQueue>,
    host: Arc<dyn PeerHost>,
    farm: Arc<dyn MiningFarm>,
    executor: Arc<dyn TransactionExecutor>,
    gas_pricer: Mutex<Box<dyn GasPricer>>,

    // Lock order: `pre_mine` before `working` before `post_mine`.
    pre_mine: RwLock<PendingState>,
    working: RwLock<PendingState>,
    post_mine: RwLock<PendingState>,
    mining_info: RwLock<Option<cinder_primitives::BlockInfo>>,

    filters: Mutex<FilterRegistry>,

    signal: Arc<WorkSignal>,
    sync_block_requested: AtomicBool,
    sync_transaction_requested: AtomicBool,
    sync_amount: AtomicUsize,

    would_mine: AtomicBool,
    force_mining: AtomicBool,
    mine_on_bad_chain: AtomicBool,
    turbo_mining: AtomicBool,
    remote_working: AtomicBool,
    last_get_work: Mutex<Option<Instant>>,

    last_tick: Mutex<Instant>,
    last_gc: Mutex<Instant>,
    report: Mutex<ActivityReport>,
}

impl Client {
    /// Builds and starts a coordinator over the given collaborators.
    ///
    /// The persisted database version is checked first; `force` can escalate
    /// (never soften) the resulting action. Construction finishes with the
    /// snapshots synced to the chain head, all callbacks wired, one
    /// synchronous work iteration, and the worker thread running.
    pub fn new(
        components: ClientComponents,
        db_path: &Path,
        force: WithExisting,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let ClientComponents {
            chain,
            state_db,
            block_queue,
            transaction_queue,
            host,
            farm,
            executor,
            gas_pricer,
        } = components;

        let checker = VersionChecker::new(db_path, chain.genesis_hash());
        let action = checker.action().max(force);
        info!(target: "client", ?action, path = %db_path.display(), "opening chain database");
        chain.reopen(db_path, action)?;
        if action == WithExisting::Kill {
            state_db.clear();
        }

        let signal = Arc::new(WorkSignal::new());
        let blank = PendingState::new(config.miner_address, config.extra_data.clone());
        let inner = Arc::new(ClientInner {
            force_mining: AtomicBool::new(config.force_mining),
            mine_on_bad_chain: AtomicBool::new(config.mine_on_bad_chain),
            turbo_mining: AtomicBool::new(config.turbo_mining),
            config,
            db_path: db_path.to_path_buf(),
            chain,
            state_db,
            block_queue,
            transaction_queue,
            host,
            farm,
            executor,
            gas_pricer: Mutex::new(gas_pricer),
            pre_mine: RwLock::new(blank.clone()),
            working: RwLock::new(blank.clone()),
            post_mine: RwLock::new(blank),
            mining_info: RwLock::new(None),
            filters: Mutex::new(FilterRegistry::new()),
            signal: signal.clone(),
            sync_block_requested: AtomicBool::new(false),
            sync_transaction_requested: AtomicBool::new(false),
            sync_amount: AtomicUsize::new(MIN_SYNC_BLOCKS),
            would_mine: AtomicBool::new(false),
            remote_working: AtomicBool::new(false),
            last_get_work: Mutex::new(None),
            last_tick: Mutex::new(Instant::now()),
            last_gc: Mutex::new(Instant::now()),
            report: Mutex::new(ActivityReport::default()),
        });

        inner.wire_callbacks();
        inner.gas_pricer.lock().update(&*inner.chain);
        inner.host.register_capability(SyncCapability {
            chain: Arc::downgrade(&inner.chain),
            block_queue: Arc::downgrade(&inner.block_queue),
            transaction_queue: Arc::downgrade(&inner.transaction_queue),
            network_id: inner.config.network_id,
        });

        checker.set_ok();
        inner.started_working()?;
        inner.work_cycle();

        let client = Client { inner, worker: Mutex::new(None) };
        client.start_worker();
        Ok(client)
    }

    fn start_worker(&self) {
        let inner = self.inner.clone();
        *self.worker.lock() =
            Some(Worker::spawn("cinder-client", self.inner.signal.clone(), move || {
                inner.do_work()
            }));
    }

    fn stop_worker(&self) {
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
        }
    }

    /// Stops the worker thread and the mining farm.
    pub fn stop(&self) {
        self.stop_worker();
        self.inner.farm.stop();
    }

    /// Simulates a call against a copy of the published post-state.
    ///
    /// The caller is credited with `value + gas_price * gas` up front so the
    /// simulation cannot fail for lack of funds.
    pub fn call(&self, request: CallRequest) -> CallResult {
        let (mut state, env) = {
            let post_mine = self.inner.post_mine.read();
            (post_mine.state().clone(), post_mine.env())
        };
        state.add_balance(
            request.from,
            request.value + U256::from(request.gas_price) * U256::from(request.gas),
        );

        match self.inner.executor.simulate(&env, &mut state, &request) {
            Ok(outcome) => CallResult {
                success: outcome.success,
                gas_used: outcome.gas_used,
                output: outcome.output,
                logs: outcome.logs,
                error: None,
            },
            Err(err) => {
                debug!(target: "client", %err, "call simulation failed");
                CallResult { error: Some(err.to_string()), ..Default::default() }
            }
        }
    }

    /// Reads a storage slot, against the post-state when no block is given.
    pub fn storage_at(
        &self,
        address: Address,
        key: B256,
        block: Option<B256>,
    ) -> Result<B256, ClientError> {
        match block {
            None => Ok(self.inner.post_mine.read().storage(&address, &key)),
            Some(hash) => Ok(self.state_at_block(hash)?.storage(&address, &key)),
        }
    }

    /// Re-materialises the account state as of the given block.
    ///
    /// Failures are attached to the block and reported through the bad-block
    /// pipeline before being returned.
    pub fn state_at_block(&self, block: B256) -> Result<StateOverlay, ClientError> {
        match self.inner.chain.state_at(block) {
            Ok(state) => Ok(state),
            Err(err) => {
                let block_bytes = self
                    .inner
                    .chain
                    .block(block)
                    .map(|b| b.rlp_bytes())
                    .unwrap_or_default();
                self.inner.on_bad_block(&BadBlockReport::new(block_bytes, err.to_string()));
                Err(err.into())
            }
        }
    }

    /// The account state after the first `count` pending transactions of the
    /// post-state (no block given) or of the given block.
    pub fn state_at_transaction(
        &self,
        count: usize,
        block: Option<B256>,
    ) -> Result<StateOverlay, ClientError> {
        let Some(hash) = block else {
            let post_mine = self.inner.post_mine.read();
            return post_mine.state_after(count, &*self.inner.executor)
        };

        let block_data = self.inner.chain.block(hash).ok_or(ClientError::UnknownBlock(hash))?;
        if count > block_data.body.len() {
            return Err(ClientError::UnknownPendingIndex(count))
        }
        let mut state = self.state_at_block(block_data.header.parent_hash)?;
        let mut env = EnvInfo {
            beneficiary: block_data.header.beneficiary,
            number: block_data.header.number,
            timestamp: block_data.header.timestamp,
            gas_limit: block_data.header.gas_limit,
            gas_used: 0,
            difficulty: block_data.header.difficulty,
        };
        for tx in &block_data.body[..count] {
            let outcome = self
                .inner
                .executor
                .execute(&env, &mut state, tx)
                .map_err(|err| ClientError::ReplayDiverged(err.to_string()))?;
            env.gas_used += outcome.gas_used;
        }
        Ok(state)
    }

    /// The current mining work package.
    ///
    /// Marks a remote miner active and, if work was not being prepared yet,
    /// triggers preparation. Returns the empty package while the chain is
    /// bad and mining on a bad chain is disabled.
    pub fn get_work(&self) -> WorkPackage {
        self.inner.get_work()
    }

    /// Offers a proof-of-work solution for the outstanding work package.
    pub fn submit_work(&self, solution: PowSolution) -> bool {
        self.inner.submit_work(solution)
    }

    /// Starts local mining.
    pub fn start_mining(&self) {
        self.inner.would_mine.store(true, Ordering::Release);
        self.inner.rejig_mining();
    }

    /// Stops local mining.
    pub fn stop_mining(&self) {
        self.inner.would_mine.store(false, Ordering::Release);
        self.inner.rejig_mining();
    }

    /// Returns `true` while the farm is searching.
    pub fn is_mining(&self) -> bool {
        self.inner.farm.is_mining()
    }

    /// Toggles preparing work even when no transactions are pending.
    ///
    /// Accepted for API compatibility: work preparation is currently never
    /// gated on pending transactions.
    pub fn set_force_mining(&self, enable: bool) {
        self.inner.force_mining.store(enable, Ordering::Release);
        if self.is_mining() {
            self.start_mining();
        }
    }

    /// Toggles ignoring the canary.
    pub fn set_mine_on_bad_chain(&self, enable: bool) {
        self.inner.mine_on_bad_chain.store(enable, Ordering::Release);
    }

    /// Toggles preferring GPU workers.
    pub fn set_turbo_mining(&self, enable: bool) {
        self.inner.turbo_mining.store(enable, Ordering::Release);
    }

    /// Progress of the current search; zero while not mining.
    pub fn mining_progress(&self) -> MiningProgress {
        if self.inner.farm.is_mining() {
            self.inner.farm.progress()
        } else {
            MiningProgress::default()
        }
    }

    /// The current hash rate; zero while not mining.
    pub fn hashrate(&self) -> u64 {
        self.mining_progress().rate()
    }

    /// Historical per-round mining statistics. Always empty.
    pub fn mining_history(&self) -> Vec<MiningProgress> {
        Vec::new()
    }

    /// Returns `true` if the canary signals a bad chain.
    pub fn is_chain_bad(&self) -> bool {
        !self.inner.canary_value().is_zero()
    }

    /// Returns `true` if the canary asks for a client upgrade.
    pub fn is_upgrade_needed(&self) -> bool {
        self.inner.canary_value() == B256::with_last_byte(2)
    }

    /// Installs a watch over the given log criteria.
    pub fn install_watch(&self, criteria: FilterCriteria) -> u64 {
        self.inner.filters.lock().install_watch(criteria)
    }

    /// Installs a watch over one of the sentinel filters.
    pub fn install_sentinel_watch(&self, filter_id: B256) -> Option<u64> {
        self.inner.filters.lock().install_sentinel_watch(filter_id)
    }

    /// Removes a watch. Returns `false` if no such watch exists.
    pub fn uninstall_watch(&self, watch_id: u64) -> bool {
        self.inner.filters.lock().uninstall_watch(watch_id)
    }

    /// Returns a watch's accumulated changes without draining them.
    pub fn peek_watch(&self, watch_id: u64) -> Option<Vec<FilterChange>> {
        self.inner.filters.lock().peek_watch(watch_id)
    }

    /// Drains and returns a watch's accumulated changes.
    pub fn check_watch(&self, watch_id: u64) -> Option<Vec<FilterChange>> {
        self.inner.filters.lock().check_watch(watch_id)
    }

    /// Drops every pending transaction, re-seeds the work cycle from the
    /// chain head and notifies pending watchers.
    pub fn clear_pending(&self) {
        if self.inner.post_mine.read().pending().is_empty() {
            return
        }
        self.inner.transaction_queue.clear();
        let pre_mine = self.inner.pre_mine.read().clone();
        *self.inner.post_mine.write() = pre_mine;

        // work is re-prepared per the existing mining intent
        self.inner.on_post_state_changed();

        let mut changed = HashSet::new();
        changed.insert(crate::filters::PENDING_CHANGED_FILTER);
        self.inner.note_changed(changed);
    }

    /// Runs one worker iteration synchronously.
    pub fn flush_transactions(&self) {
        self.inner.work_cycle();
    }

    /// Stops everything, wipes the on-disk chain and state, reopens fresh and
    /// restarts mining if it was on.
    pub fn kill_chain(&self) -> Result<(), ClientError> {
        let was_mining = self.inner.would_mine();
        if was_mining {
            self.stop_mining();
        }
        self.stop_worker();

        self.inner.transaction_queue.clear();
        self.inner.block_queue.clear();
        self.inner.farm.stop();

        {
            let mut pre_mine = self.inner.pre_mine.write();
            let mut working = self.inner.working.write();
            let mut post_mine = self.inner.post_mine.write();

            let blank = PendingState::new(
                self.inner.config.miner_address,
                self.inner.config.extra_data.clone(),
            );
            *pre_mine = blank.clone();
            *working = blank.clone();
            *post_mine = blank;
            *self.inner.mining_info.write() = None;

            self.inner.state_db.clear();
            self.inner.chain.reopen(&self.inner.db_path, WithExisting::Kill)?;
        }

        self.inner.host.reset();
        self.inner.started_working()?;
        self.inner.work_cycle();
        self.start_worker();
        if was_mining {
            self.start_mining();
        }
        Ok(())
    }

    /// The chain head as the coordinator sees it.
    pub fn chain_info(&self) -> ChainInfo {
        self.inner.chain.chain_info()
    }

    /// The transactions applied to the published post-state.
    pub fn pending_transactions(&self) -> Vec<TransactionSigned> {
        self.inner.post_mine.read().pending().to_vec()
    }

    /// The sync status of the peer network.
    pub fn sync_status(&self) -> SyncStatus {
        self.inner.host.status()
    }

    /// Returns `true` while the peer network is syncing.
    pub fn is_syncing(&self) -> bool {
        self.inner.host.is_syncing()
    }

    /// Switches the peer network this node participates in.
    pub fn set_network_id(&self, network_id: u64) {
        self.inner.host.set_network_id(network_id);
    }

    /// The recommended selling gas price.
    pub fn gas_price_ask(&self) -> U256 {
        self.inner.gas_pricer.lock().ask()
    }

    /// The recommended buying gas price.
    pub fn gas_price_bid(&self) -> U256 {
        self.inner.gas_pricer.lock().bid()
    }

    /// The current adaptive import batch size.
    pub fn sync_batch_size(&self) -> usize {
        self.inner.sync_amount.load(Ordering::Relaxed)
    }

    /// Worker loop liveness.
    pub fn activity_report(&self) -> ActivityReport {
        *self.inner.report.lock()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("chain", &self.inner.chain.chain_info()).finish()
    }
}

impl ClientInner {
    fn wire_callbacks(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);

        let on_tq = weak.clone();
        self.transaction_queue.on_ready(Box::new(move || {
            if let Some(inner) = on_tq.upgrade() {
                inner.on_transaction_queue_ready();
            }
        }));

        let on_bq = weak.clone();
        self.block_queue.on_ready(Box::new(move || {
            if let Some(inner) = on_bq.upgrade() {
                inner.on_block_queue_ready();
            }
        }));

        let bq_bad = weak.clone();
        self.block_queue.set_on_bad(Box::new(move |report| {
            if let Some(inner) = bq_bad.upgrade() {
                inner.on_bad_block(report);
            }
        }));

        let chain_bad = weak.clone();
        self.chain.set_on_bad(Box::new(move |report| {
            if let Some(inner) = chain_bad.upgrade() {
                inner.on_bad_block(report);
            }
        }));

        self.farm.on_solution(Box::new(move |solution| {
            weak.upgrade().map(|inner| inner.submit_work(solution)).unwrap_or(false)
        }));
    }

    /// Syncs all three snapshots to the chain head.
    fn started_working(&self) -> Result<(), ClientError> {
        let snapshot = {
            let mut pre_mine = self.pre_mine.write();
            pre_mine.sync_to_head(&*self.chain)?;
            pre_mine.clone()
        };
        *self.working.write() = snapshot.clone();
        *self.post_mine.write() = snapshot;
        Ok(())
    }

    fn would_mine(&self) -> bool {
        self.would_mine.load(Ordering::Acquire)
    }

    fn mine_on_bad_chain(&self) -> bool {
        self.mine_on_bad_chain.load(Ordering::Acquire)
    }

    fn turbo_mining(&self) -> bool {
        self.turbo_mining.load(Ordering::Acquire)
    }

    fn remote_active(&self) -> bool {
        match *self.last_get_work.lock() {
            Some(at) => at.elapsed() < REMOTE_WORK_WINDOW,
            None => false,
        }
    }

    fn should_serve_work(&self) -> bool {
        self.would_mine() || self.remote_active()
    }

    fn canary_value(&self) -> B256 {
        self.post_mine.read().storage(&CANARY_ADDRESS, &B256::ZERO)
    }

    fn is_chain_bad(&self) -> bool {
        !self.canary_value().is_zero()
    }

    fn on_transaction_queue_ready(&self) {
        self.sync_transaction_requested.store(true, Ordering::Release);
        self.signal.notify();
    }

    fn on_block_queue_ready(&self) {
        self.sync_block_requested.store(true, Ordering::Release);
        self.signal.notify();
    }

    fn on_bad_block(&self, bad: &BadBlockReport) {
        report::submit_report(self.config.sentinel_url.as_deref(), bad);
    }

    fn note_changed(&self, changed: HashSet<B256>) {
        self.filters.lock().note_changed(&changed);
    }

    /// One iteration of the worker loop: drain, then sleep until signalled.
    fn do_work(&self) {
        self.work_cycle();

        if !self.sync_block_requested.load(Ordering::Acquire) &&
            !self.sync_transaction_requested.load(Ordering::Acquire)
        {
            self.signal.wait(MAX_IDLE_WAIT);
        }
    }

    /// Drains whatever the queues have raised, then runs maintenance.
    fn work_cycle(&self) {
        if self
            .sync_block_requested
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.sync_block_queue();
        }

        // the request is consumed even when skipped; the next import or chain
        // change raises it again
        if self
            .sync_transaction_requested
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok() &&
            !self.remote_working.load(Ordering::Acquire) &&
            !self.host.is_syncing()
        {
            self.sync_transaction_queue();
        }

        self.tick();
    }

    /// Drains one adaptive batch of verified blocks into the chain.
    fn sync_block_queue(&self) {
        let amount = self.sync_amount.load(Ordering::Relaxed);
        let started = Instant::now();
        let outcome = self.chain.sync(&*self.block_queue, &*self.state_db, amount);
        let elapsed = started.elapsed().as_secs_f64();

        debug!(
            target: "client",
            amount,
            elapsed_ms = (elapsed * 1000.0) as u64,
            imported = outcome.imported.len(),
            retracted = outcome.retracted.len(),
            "drained block queue batch"
        );
        self.sync_amount.store(worker::next_batch_size(amount, elapsed), Ordering::Relaxed);

        if outcome.more_available {
            // only ever raise the flag here: a ready signal that arrived
            // during the drain must not be clobbered with `false`
            self.sync_block_requested.store(true, Ordering::Release);
        }
        if outcome.imported.is_empty() {
            return
        }
        self.on_chain_changed(outcome);
    }

    /// Applies ready transactions to the working copy and publishes it.
    fn sync_transaction_queue(&self) {
        let min_gas_price = self.gas_pricer.lock().bid();
        let fresh = self.working.write().apply_ready_transactions(
            &*self.transaction_queue,
            &*self.executor,
            min_gas_price,
        );
        if fresh.is_empty() {
            return
        }

        let pending_total = {
            let working = self.working.read();
            *self.post_mine.write() = working.clone();
            working.pending().len()
        };

        let mut changed = HashSet::new();
        {
            let mut filters = self.filters.lock();
            let first_index = pending_total - fresh.len();
            for (offset, (hash, receipt)) in fresh.iter().enumerate() {
                filters.append_from_new_pending(
                    receipt,
                    *hash,
                    (first_index + offset) as u64,
                    &mut changed,
                );
            }
        }

        self.on_post_state_changed();
        self.note_changed(changed);
        self.host.note_new_transactions();
    }

    /// Reconciles the pending pipeline with a chain change.
    fn on_chain_changed(&self, outcome: SyncOutcome) {
        // transactions of retracted blocks return to circulation
        for hash in &outcome.retracted {
            debug!(target: "client", block = %hash, "dead block");
            for tx in self.chain.transactions(*hash).unwrap_or_default() {
                trace!(target: "client", tx = %tx.hash(), "resubmitting dead-block transaction");
                let _ = self.transaction_queue.import(tx, IfDropped::Retry);
            }
        }
        // transactions of imported blocks are canonical now
        for hash in &outcome.imported {
            trace!(target: "client", block = %hash, "live block");
            for tx_hash in self.chain.transaction_hashes(*hash).unwrap_or_default() {
                self.transaction_queue.drop_transaction(tx_hash);
            }
        }

        self.host.note_new_blocks();

        let mut changed = HashSet::new();
        {
            let mut filters = self.filters.lock();
            for hash in &outcome.imported {
                let (Some(info), Some(receipts), Some(tx_hashes)) = (
                    self.chain.block_info(*hash),
                    self.chain.receipts(*hash),
                    self.chain.transaction_hashes(*hash),
                ) else {
                    continue
                };
                filters.append_from_new_block(&info, &receipts, &tx_hashes, &mut changed);
            }
        }

        if self.block_queue.status().pending == 0 {
            let mut new_pre_mine = self.pre_mine.read().clone();
            let pre_changed = match new_pre_mine.sync_to_head(&*self.chain) {
                Ok(moved) => moved,
                Err(err) => {
                    warn!(target: "client", %err, "failed to resync head state");
                    false
                }
            };
            let pre_author = self.pre_mine.read().beneficiary();
            let post_author = self.post_mine.read().beneficiary();

            if pre_changed || pre_author != post_author {
                if self.would_mine() {
                    debug!(target: "client", "new block on chain");
                }
                *self.pre_mine.write() = new_pre_mine.clone();
                *self.working.write() = new_pre_mine;

                // prior pending transactions go back through the queue
                let prior = self.post_mine.read().pending().to_vec();
                for tx in prior {
                    trace!(target: "client", tx = %tx.hash(), "resubmitting post-mine transaction");
                    if !self.transaction_queue.import(tx, IfDropped::Retry).is_success() {
                        self.on_transaction_queue_ready();
                    }
                }
                {
                    let working = self.working.read();
                    *self.post_mine.write() = working.clone();
                }

                changed.insert(crate::filters::PENDING_CHANGED_FILTER);
                self.on_post_state_changed();
            }

            // the queue already holds the prior pending transactions again;
            // schedule a drain to resync with it
            self.on_transaction_queue_ready();
        }

        self.note_changed(changed);
    }

    fn on_post_state_changed(&self) {
        trace!(target: "client", "post state changed");
        self.rejig_mining();
        self.remote_working.store(false, Ordering::Release);
    }

    /// The single decision point for mining activity.
    fn rejig_mining(&self) {
        if self.should_serve_work() &&
            self.block_queue.status().pending == 0 &&
            (!self.is_chain_bad() || self.mine_on_bad_chain())
        {
            debug!(target: "client::miner", "preparing mining work");
            let snapshot = {
                let mut working = self.working.write();
                working.commit_to_mine();
                working.clone()
            };
            *self.post_mine.write() = snapshot.clone();
            let info = snapshot.mining_info();
            *self.mining_info.write() = info.clone();

            if self.would_mine() {
                if let Some(info) = info {
                    self.farm.set_work(WorkPackage::new(&info));
                    if self.turbo_mining() {
                        self.farm.start_gpu();
                    } else {
                        self.farm.start_cpu();
                    }
                    self.farm.prepare_dataset(pow::epoch(info.number));
                }
            }
        }
        if !self.would_mine() {
            self.farm.stop();
        }
    }

    fn get_work(&self) -> WorkPackage {
        let served_before = self.should_serve_work();
        *self.last_get_work.lock() = Some(Instant::now());

        if !self.mine_on_bad_chain() && self.is_chain_bad() {
            return WorkPackage::default()
        }

        // a request that turns serving on, or arrives before any work was
        // ever prepared, preps immediately; otherwise preparation is deferred
        // to the next post-state change
        if (!served_before && self.should_serve_work()) || self.mining_info.read().is_none() {
            self.on_post_state_changed();
        } else {
            self.remote_working.store(true, Ordering::Release);
        }

        self.mining_info.read().as_ref().map(WorkPackage::new).unwrap_or_default()
    }

    /// Seals the working copy with `solution` and feeds the block back
    /// through the import queue.
    fn submit_work(&self, solution: PowSolution) -> bool {
        {
            let mut working = self.working.write();
            if !working.seal(&solution) {
                debug!(target: "client::miner", nonce = solution.nonce, "rejected mining solution");
                return false
            }
        }

        let block_bytes = {
            let working = self.working.read();
            *self.post_mine.write() = working.clone();
            working.block_bytes()
        };
        let Some(block_bytes) = block_bytes else { return false };

        let result = self.block_queue.import(&block_bytes, true);
        debug!(target: "client::miner", ?result, "sealed block offered for import");
        true
    }

    /// Once-a-second maintenance.
    fn tick(&self) {
        {
            let mut last_tick = self.last_tick.lock();
            if last_tick.elapsed() < TICK_INTERVAL {
                return
            }
            *last_tick = Instant::now();
        }

        let ticks = {
            let mut report = self.report.lock();
            report.ticks += 1;
            report.ticks
        };

        self.check_watch_garbage();
        self.block_queue.tick();

        if ticks % 15 == 0 {
            let report = *self.report.lock();
            trace!(target: "client", %report, "activity");
        }
    }

    /// Every five seconds: evict stale watches and let the chain prune.
    fn check_watch_garbage(&self) {
        {
            let mut last_gc = self.last_gc.lock();
            if last_gc.elapsed() < GC_INTERVAL {
                return
            }
            *last_gc = Instant::now();
        }

        let removed = self.filters.lock().garbage_collect(WATCH_TTL);
        if !removed.is_empty() {
            debug!(target: "client::filter", count = removed.len(), "collected stale watches");
        }
        self.chain.garbage_collect();
    }
}

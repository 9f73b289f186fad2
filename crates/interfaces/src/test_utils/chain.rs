use crate::{
    chain::{BadBlockCallback, Blockchain, SyncOutcome},
    db::{StateDatabase, WithExisting},
    error::{BadBlockReport, ChainError},
    executor::{EnvInfo, TransactionExecutor},
    queue::BlockImportQueue,
};
use cinder_primitives::{
    constants::MINIMUM_DIFFICULTY, logs_bloom, pow::calculate_difficulty, proofs, Address, Block,
    BlockInfo, ChainInfo, Header, Receipt, StateOverlay, TransactionSigned, B256, U256,
};
use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

/// Per-block gas allowance used by every test chain.
pub(crate) const TEST_GAS_LIMIT: u64 = 8_000_000;

struct ChainStore {
    blocks: HashMap<B256, Block>,
    states: HashMap<B256, StateOverlay>,
    receipts: HashMap<B256, Vec<Receipt>>,
    total_difficulty: HashMap<B256, U256>,
    canonical: Vec<B256>,
    genesis: B256,
}

impl ChainStore {
    fn head(&self) -> B256 {
        *self.canonical.last().expect("canonical chain always holds genesis")
    }

    fn canonical_path_to(&self, head: B256) -> Vec<B256> {
        let mut path = Vec::new();
        let mut cursor = head;
        while let Some(block) = self.blocks.get(&cursor) {
            path.push(cursor);
            if block.header.number == 0 {
                break
            }
            cursor = block.header.parent_hash;
        }
        path.reverse();
        path
    }
}

/// An in-memory canonical chain with per-block state snapshots and real
/// total-difficulty reorg handling.
///
/// Block verification internals are out of scope; the import queue is assumed
/// to have checked seals before a block reaches [`Blockchain::sync`]. State
/// transitions are replayed through the configured executor, so a block whose
/// state root does not match its re-execution is reported bad.
pub struct TestChain {
    store: RwLock<ChainStore>,
    executor: Arc<dyn TransactionExecutor>,
    on_bad: RwLock<Option<BadBlockCallback>>,
    reopens: Mutex<Vec<WithExisting>>,
    gc_runs: Mutex<usize>,
    import_delay: Duration,
}

impl TestChain {
    /// Creates a chain with the given genesis state.
    pub fn new(genesis_state: StateOverlay, executor: Arc<dyn TransactionExecutor>) -> Self {
        let genesis_header = Header {
            number: 0,
            gas_limit: TEST_GAS_LIMIT,
            difficulty: U256::from(MINIMUM_DIFFICULTY),
            state_root: genesis_state.state_root(),
            ..Default::default()
        };
        let genesis_block =
            Block { header: genesis_header, body: Vec::new(), ommers: Vec::new() };
        let genesis = genesis_block.hash_slow();

        let mut blocks = HashMap::new();
        blocks.insert(genesis, genesis_block);
        let mut states = HashMap::new();
        states.insert(genesis, genesis_state);
        let mut receipts = HashMap::new();
        receipts.insert(genesis, Vec::new());
        let mut total_difficulty = HashMap::new();
        total_difficulty.insert(genesis, U256::from(MINIMUM_DIFFICULTY));

        TestChain {
            store: RwLock::new(ChainStore {
                blocks,
                states,
                receipts,
                total_difficulty,
                canonical: vec![genesis],
                genesis,
            }),
            executor,
            on_bad: RwLock::new(None),
            reopens: Mutex::new(Vec::new()),
            gc_runs: Mutex::new(0),
            import_delay: Duration::ZERO,
        }
    }

    /// Makes every imported block cost roughly `delay` of wall time, for
    /// exercising the adaptive drain batching.
    pub fn with_import_delay(mut self, delay: Duration) -> Self {
        self.import_delay = delay;
        self
    }

    /// Builds a fully valid child of `parent_hash` carrying `transactions`.
    ///
    /// Returns `None` if the parent is unknown or a transaction cannot be
    /// applied.
    pub fn build_block(
        &self,
        parent_hash: B256,
        beneficiary: Address,
        timestamp: u64,
        transactions: Vec<TransactionSigned>,
    ) -> Option<Block> {
        let store = self.store.read();
        let parent = store.blocks.get(&parent_hash)?.header.clone();
        let mut state = store.states.get(&parent_hash)?.clone();
        drop(store);

        let difficulty = calculate_difficulty(parent.difficulty, parent.timestamp, timestamp);
        let mut env = EnvInfo {
            beneficiary,
            number: parent.number + 1,
            timestamp,
            gas_limit: parent.gas_limit,
            gas_used: 0,
            difficulty,
        };

        let mut receipts = Vec::with_capacity(transactions.len());
        for tx in &transactions {
            let outcome = self.executor.execute(&env, &mut state, tx).ok()?;
            env.gas_used += outcome.gas_used;
            receipts.push(Receipt {
                success: outcome.success,
                gas_used: outcome.gas_used,
                cumulative_gas_used: env.gas_used,
                logs: outcome.logs,
            });
        }

        let header = Header {
            parent_hash,
            beneficiary,
            state_root: state.state_root(),
            transactions_root: proofs::ordered_root(&transactions),
            receipts_root: proofs::ordered_root(&receipts),
            logs_bloom: logs_bloom(receipts.iter().flat_map(|r| r.logs.iter())),
            difficulty,
            number: parent.number + 1,
            gas_limit: parent.gas_limit,
            gas_used: env.gas_used,
            timestamp,
            ..Default::default()
        };

        Some(Block { header, body: transactions, ommers: Vec::new() })
    }

    /// The recorded `reopen` actions, in call order.
    pub fn reopen_actions(&self) -> Vec<WithExisting> {
        self.reopens.lock().clone()
    }

    /// How many times garbage collection ran.
    pub fn gc_runs(&self) -> usize {
        *self.gc_runs.lock()
    }

    fn report_bad(&self, report: BadBlockReport) {
        if let Some(callback) = self.on_bad.read().as_ref() {
            callback(&report);
        }
    }

    /// Replays `block` on its parent state. Returns the post-state and
    /// receipts, or a report describing the failure.
    fn replay(&self, block: &Block) -> Result<(StateOverlay, Vec<Receipt>), BadBlockReport> {
        let store = self.store.read();
        let Some(parent_state) = store.states.get(&block.header.parent_hash) else {
            return Err(BadBlockReport::new(block.rlp_bytes(), "unknown parent")
                .with_hint("parentHash", serde_json::json!(block.header.parent_hash.to_string())))
        };
        let mut state = parent_state.clone();
        drop(store);

        let mut env = EnvInfo {
            beneficiary: block.header.beneficiary,
            number: block.header.number,
            timestamp: block.header.timestamp,
            gas_limit: block.header.gas_limit,
            gas_used: 0,
            difficulty: block.header.difficulty,
        };

        let mut receipts = Vec::with_capacity(block.body.len());
        for (index, tx) in block.body.iter().enumerate() {
            match self.executor.execute(&env, &mut state, tx) {
                Ok(outcome) => {
                    env.gas_used += outcome.gas_used;
                    receipts.push(Receipt {
                        success: outcome.success,
                        gas_used: outcome.gas_used,
                        cumulative_gas_used: env.gas_used,
                        logs: outcome.logs,
                    });
                }
                Err(err) => {
                    return Err(BadBlockReport::new(block.rlp_bytes(), err.to_string())
                        .with_hint("transactionIndex", serde_json::json!(index)))
                }
            }
        }

        let computed = state.state_root();
        if computed != block.header.state_root {
            return Err(BadBlockReport::new(block.rlp_bytes(), "state root mismatch")
                .with_hint("required", serde_json::json!(block.header.state_root.to_string()))
                .with_hint("got", serde_json::json!(computed.to_string())))
        }

        Ok((state, receipts))
    }
}

impl Blockchain for TestChain {
    fn chain_info(&self) -> ChainInfo {
        let store = self.store.read();
        let head = store.head();
        let number = store.blocks[&head].header.number;
        ChainInfo { best_hash: head, best_number: number }
    }

    fn current_hash(&self) -> B256 {
        self.store.read().head()
    }

    fn genesis_hash(&self) -> B256 {
        self.store.read().genesis
    }

    fn block_info(&self, hash: B256) -> Option<BlockInfo> {
        self.store.read().blocks.get(&hash).map(|b| BlockInfo::from(&b.header))
    }

    fn block(&self, hash: B256) -> Option<Block> {
        self.store.read().blocks.get(&hash).cloned()
    }

    fn receipts(&self, hash: B256) -> Option<Vec<Receipt>> {
        self.store.read().receipts.get(&hash).cloned()
    }

    fn transactions(&self, hash: B256) -> Option<Vec<TransactionSigned>> {
        self.store.read().blocks.get(&hash).map(|b| b.body.clone())
    }

    fn transaction_hashes(&self, hash: B256) -> Option<Vec<B256>> {
        self.store
            .read()
            .blocks
            .get(&hash)
            .map(|b| b.body.iter().map(|tx| tx.hash()).collect())
    }

    fn state_at(&self, hash: B256) -> Result<StateOverlay, ChainError> {
        self.store.read().states.get(&hash).cloned().ok_or(ChainError::UnknownState(hash))
    }

    fn sync(
        &self,
        queue: &dyn BlockImportQueue,
        state_db: &dyn StateDatabase,
        max_blocks: usize,
    ) -> SyncOutcome {
        let before = {
            let store = self.store.read();
            store.canonical.clone()
        };

        for block in queue.drain_verified(max_blocks) {
            if !self.import_delay.is_zero() {
                std::thread::sleep(self.import_delay);
            }

            let hash = block.hash_slow();
            if self.store.read().blocks.contains_key(&hash) {
                continue
            }

            let (state, receipts) = match self.replay(&block) {
                Ok(result) => result,
                Err(report) => {
                    self.report_bad(report);
                    continue
                }
            };

            state_db.put(hash, block.rlp_bytes());

            let mut store = self.store.write();
            let parent_td = store
                .total_difficulty
                .get(&block.header.parent_hash)
                .copied()
                .unwrap_or_default();
            let td = parent_td + block.header.difficulty;
            let best_td =
                store.total_difficulty.get(&store.head()).copied().unwrap_or_default();

            store.states.insert(hash, state);
            store.receipts.insert(hash, receipts);
            store.total_difficulty.insert(hash, td);
            store.blocks.insert(hash, block);

            if td > best_td {
                let path = store.canonical_path_to(hash);
                store.canonical = path;
            }
        }

        let after = self.store.read().canonical.clone();
        let shared = before.iter().zip(after.iter()).take_while(|(a, b)| a == b).count();

        SyncOutcome {
            imported: after[shared..].to_vec(),
            retracted: before[shared..].to_vec(),
            more_available: queue.status().pending > 0,
        }
    }

    fn garbage_collect(&self) {
        *self.gc_runs.lock() += 1;
    }

    fn set_on_bad(&self, callback: BadBlockCallback) {
        *self.on_bad.write() = Some(callback);
    }

    fn reopen(&self, _path: &Path, action: WithExisting) -> Result<(), ChainError> {
        self.reopens.lock().push(action);
        if action == WithExisting::Kill {
            let mut store = self.store.write();
            let genesis = store.genesis;
            store.blocks.retain(|hash, _| *hash == genesis);
            store.states.retain(|hash, _| *hash == genesis);
            store.receipts.retain(|hash, _| *hash == genesis);
            store.total_difficulty.retain(|hash, _| *hash == genesis);
            store.canonical = vec![genesis];
        }
        Ok(())
    }
}

impl std::fmt::Debug for TestChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.chain_info();
        f.debug_struct("TestChain")
            .field("best_number", &info.best_number)
            .field("best_hash", &info.best_hash)
            .finish()
    }
}

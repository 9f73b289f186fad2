//! The mining workspace: the state a pending block is assembled in.
//!
//! The coordinator keeps three of these side by side: `pre_mine` tracks the
//! chain head, `working` is the copy under mutation, and `post_mine` is the
//! last published copy readers see. All three are plain values replaced under
//! their locks; none of them is ever mutated while visible to a reader.

use crate::error::ClientError;
use cinder_interfaces::{
    Blockchain, ChainError, EnvInfo, TransactionExecutor, TransactionQueue,
};
use cinder_primitives::{
    logs_bloom,
    pow::{self, PowSolution},
    proofs, Address, Block, BlockInfo, Bytes, Header, Receipt, StateOverlay,
    TransactionSigned, B256, U256,
};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Where the working copy is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkingPhase {
    /// Equal to the chain head; no pending transactions applied.
    #[default]
    SyncedToHead,
    /// One or more pending transactions have been applied.
    WithPending,
    /// A candidate header has been prepared for the mining farm.
    CommittedToMine,
    /// A proof-of-work solution has been attached.
    Sealed,
}

/// A receipt freshly produced by draining the transaction queue.
pub type FreshReceipt = (B256, Receipt);

/// The state a pending block is assembled in.
#[derive(Clone, Debug, Default)]
pub struct PendingState {
    base: BlockInfo,
    base_overlay: StateOverlay,
    overlay: StateOverlay,
    pending: Vec<TransactionSigned>,
    receipts: Vec<Receipt>,
    beneficiary: Address,
    extra_data: Bytes,
    timestamp: u64,
    gas_used: u64,
    phase: WorkingPhase,
    committed: Option<Header>,
    sealed: Option<Block>,
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

impl PendingState {
    /// Creates an empty workspace mining to `beneficiary`.
    pub fn new(beneficiary: Address, extra_data: Bytes) -> Self {
        PendingState { beneficiary, extra_data, ..Default::default() }
    }

    /// The chain head this workspace is based on.
    pub fn base_hash(&self) -> B256 {
        self.base.hash
    }

    /// The beneficiary of the block under assembly.
    pub const fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    /// The lifecycle phase.
    pub const fn phase(&self) -> WorkingPhase {
        self.phase
    }

    /// Applied pending transactions, in application order.
    pub fn pending(&self) -> &[TransactionSigned] {
        &self.pending
    }

    /// Receipts parallel to [`Self::pending`].
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// The account state including every applied pending transaction.
    pub const fn state(&self) -> &StateOverlay {
        &self.overlay
    }

    /// A storage read against the post-pending state.
    pub fn storage(&self, address: &Address, key: &B256) -> B256 {
        self.overlay.storage(address, key)
    }

    /// The block environment the next transaction would execute in.
    pub(crate) fn env(&self) -> EnvInfo {
        EnvInfo {
            beneficiary: self.beneficiary,
            number: self.base.number + 1,
            timestamp: self.timestamp,
            gas_limit: self.base.gas_limit,
            gas_used: self.gas_used,
            difficulty: pow::calculate_difficulty(
                self.base.difficulty,
                self.base.timestamp,
                self.timestamp,
            ),
        }
    }

    /// Rebases the workspace onto the current chain head, discarding any
    /// applied transactions. Returns whether the base actually moved.
    pub fn sync_to_head(&mut self, chain: &dyn Blockchain) -> Result<bool, ChainError> {
        let info = chain.chain_info();
        if self.base.hash == info.best_hash {
            return Ok(false)
        }

        let base =
            chain.block_info(info.best_hash).ok_or(ChainError::UnknownBlock(info.best_hash))?;
        let overlay = chain.state_at(info.best_hash)?;

        self.timestamp = unix_now().max(base.timestamp + 1);
        self.base = base;
        self.base_overlay = overlay.clone();
        self.overlay = overlay;
        self.pending.clear();
        self.receipts.clear();
        self.gas_used = 0;
        self.phase = WorkingPhase::SyncedToHead;
        self.committed = None;
        self.sealed = None;
        Ok(true)
    }

    /// Drains ready transactions from the queue into the workspace.
    ///
    /// Transactions priced under `min_gas_price` or not fitting the remaining
    /// block gas stay queued, as do nonce-future transactions; transactions
    /// that cannot ever apply are dropped from the queue. Returns the
    /// `(hash, receipt)` pairs of freshly applied transactions.
    pub fn apply_ready_transactions(
        &mut self,
        queue: &dyn TransactionQueue,
        executor: &dyn TransactionExecutor,
        min_gas_price: U256,
    ) -> Vec<FreshReceipt> {
        let applied: HashSet<B256> = self.pending.iter().map(|tx| tx.hash()).collect();
        let mut fresh = Vec::new();

        for tx in queue.ready_transactions() {
            let hash = tx.hash();
            if applied.contains(&hash) {
                continue
            }
            if U256::from(tx.gas_price) < min_gas_price {
                trace!(target: "client::state", %hash, "transaction below minimum gas price, leaving queued");
                continue
            }
            if self.gas_used + tx.gas_limit > self.base.gas_limit {
                continue
            }

            match executor.execute(&self.env(), &mut self.overlay, &tx) {
                Ok(outcome) => {
                    self.gas_used += outcome.gas_used;
                    let receipt = Receipt {
                        success: outcome.success,
                        gas_used: outcome.gas_used,
                        cumulative_gas_used: self.gas_used,
                        logs: outcome.logs,
                    };
                    self.pending.push(tx);
                    self.receipts.push(receipt.clone());
                    fresh.push((hash, receipt));
                }
                Err(err) if err.is_retryable() => {
                    trace!(target: "client::state", %hash, %err, "transaction not yet applicable");
                }
                Err(err) => {
                    debug!(target: "client::state", %hash, %err, "dropping unapplicable transaction");
                    queue.drop_transaction(hash);
                }
            }
        }

        if !fresh.is_empty() {
            self.phase = WorkingPhase::WithPending;
            self.committed = None;
            self.sealed = None;
        }
        fresh
    }

    /// Finalises the candidate header so mining work can be handed out.
    pub fn commit_to_mine(&mut self) -> BlockInfo {
        let header = Header {
            parent_hash: self.base.hash,
            beneficiary: self.beneficiary,
            state_root: self.overlay.state_root(),
            transactions_root: proofs::ordered_root(&self.pending),
            receipts_root: proofs::ordered_root(&self.receipts),
            logs_bloom: logs_bloom(self.receipts.iter().flat_map(|r| r.logs.iter())),
            difficulty: pow::calculate_difficulty(
                self.base.difficulty,
                self.base.timestamp,
                self.timestamp,
            ),
            number: self.base.number + 1,
            gas_limit: self.base.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            ..Default::default()
        };
        let info = BlockInfo::from(&header);
        self.committed = Some(header);
        self.sealed = None;
        self.phase = WorkingPhase::CommittedToMine;
        info
    }

    /// The headline view of the committed candidate, if any.
    pub fn mining_info(&self) -> Option<BlockInfo> {
        self.committed.as_ref().map(BlockInfo::from)
    }

    /// Attaches a proof-of-work solution to the committed candidate.
    ///
    /// Returns `false` if there is no committed candidate or the solution
    /// does not satisfy the candidate's difficulty.
    pub fn seal(&mut self, solution: &PowSolution) -> bool {
        let Some(header) = self.committed.as_ref() else { return false };
        if !pow::verify_solution(header.seal_hash(), header.difficulty, solution) {
            return false
        }

        let mut sealed_header = header.clone();
        sealed_header.mix_hash = solution.mix_hash;
        sealed_header.nonce = solution.nonce;
        self.sealed = Some(Block {
            header: sealed_header,
            body: self.pending.clone(),
            ommers: Vec::new(),
        });
        self.phase = WorkingPhase::Sealed;
        true
    }

    /// The wire encoding of the sealed block, if sealing succeeded.
    pub fn block_bytes(&self) -> Option<Bytes> {
        self.sealed.as_ref().map(Block::rlp_bytes)
    }

    /// The account state with only the first `count` pending transactions
    /// applied.
    pub fn state_after(
        &self,
        count: usize,
        executor: &dyn TransactionExecutor,
    ) -> Result<StateOverlay, ClientError> {
        if count > self.pending.len() {
            return Err(ClientError::UnknownPendingIndex(count))
        }
        if count == self.pending.len() {
            return Ok(self.overlay.clone())
        }

        let mut overlay = self.base_overlay.clone();
        let mut env = self.env();
        env.gas_used = 0;
        for tx in &self.pending[..count] {
            let outcome = executor
                .execute(&env, &mut overlay, tx)
                .map_err(|err| ClientError::ReplayDiverged(err.to_string()))?;
            env.gas_used += outcome.gas_used;
        }
        Ok(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_interfaces::{
        test_utils::{signer, transfer, TestChain, TestTransactionQueue, TransferExecutor},
        IfDropped, TransactionQueue,
    };
    use std::sync::Arc;

    fn harness() -> (PendingState, TestChain, TestTransactionQueue, Arc<TransferExecutor>) {
        let mut genesis_state = StateOverlay::new();
        genesis_state.add_balance(signer(1), U256::from(u64::MAX));
        let executor = Arc::new(TransferExecutor::new());
        let chain = TestChain::new(genesis_state, executor.clone());

        let mut state = PendingState::new(Address::repeat_byte(0xcc), Bytes::new());
        state.sync_to_head(&chain).unwrap();
        (state, chain, TestTransactionQueue::new(), executor)
    }

    #[test]
    fn sync_is_idempotent_until_head_moves() {
        let (mut state, chain, _, _) = harness();
        assert_eq!(state.base_hash(), chain.current_hash());
        assert!(!state.sync_to_head(&chain).unwrap());
    }

    #[test]
    fn drains_queue_in_order_and_skips_future_nonces() {
        let (mut state, _, queue, executor) = harness();
        let t0 = transfer(1, signer(9), 0, 100, 1);
        let t1 = transfer(1, signer(9), 1, 100, 1);
        let gap = transfer(1, signer(9), 7, 100, 1);

        queue.import(t0.clone(), IfDropped::Discard);
        queue.import(t1.clone(), IfDropped::Discard);
        queue.import(gap.clone(), IfDropped::Discard);

        let fresh = state.apply_ready_transactions(&queue, &*executor, U256::ZERO);
        assert_eq!(
            fresh.iter().map(|(h, _)| *h).collect::<Vec<_>>(),
            vec![t0.hash(), t1.hash()]
        );
        assert_eq!(state.phase(), WorkingPhase::WithPending);
        assert_eq!(state.pending().len(), 2);
        // the nonce-future transaction stays queued for the next pass
        assert!(queue.contains(gap.hash()));

        // a second drain applies nothing new
        assert!(state.apply_ready_transactions(&queue, &*executor, U256::ZERO).is_empty());
    }

    #[test]
    fn underpriced_transactions_stay_queued() {
        let (mut state, _, queue, executor) = harness();
        let cheap = transfer(1, signer(9), 0, 100, 2);
        queue.import(cheap.clone(), IfDropped::Discard);

        let fresh = state.apply_ready_transactions(&queue, &*executor, U256::from(10u64));
        assert!(fresh.is_empty());
        assert!(queue.contains(cheap.hash()));
    }

    #[test]
    fn invalid_transactions_are_dropped_from_queue() {
        let (mut state, _, queue, executor) = harness();
        // signer 5 has no balance at all
        let broke = transfer(5, signer(9), 0, 100, 1);
        queue.import(broke.clone(), IfDropped::Discard);

        let fresh = state.apply_ready_transactions(&queue, &*executor, U256::ZERO);
        assert!(fresh.is_empty());
        assert!(!queue.contains(broke.hash()));
    }

    #[test]
    fn commit_then_seal_produces_a_block() {
        let (mut state, _, queue, executor) = harness();
        queue.import(transfer(1, signer(9), 0, 100, 1), IfDropped::Discard);
        state.apply_ready_transactions(&queue, &*executor, U256::ZERO);

        let info = state.commit_to_mine();
        assert_eq!(state.phase(), WorkingPhase::CommittedToMine);
        assert_eq!(info.number, 1);

        // an invalid solution is refused
        assert!(!state.seal(&PowSolution::default()));

        let solution = pow::solve(info.seal_hash, info.difficulty, 0, u64::MAX)
            .expect("minimum difficulty is searchable");
        assert!(state.seal(&solution));
        assert_eq!(state.phase(), WorkingPhase::Sealed);

        let bytes = state.block_bytes().unwrap();
        let block =
            <Block as alloy_rlp::Decodable>::decode(&mut bytes.as_ref()).unwrap();
        assert_eq!(block.header.number, 1);
        assert_eq!(block.body.len(), 1);
        assert_eq!(block.header.nonce, solution.nonce);
    }

    #[test]
    fn state_after_replays_a_prefix() {
        let (mut state, _, queue, executor) = harness();
        queue.import(transfer(1, signer(9), 0, 100, 1), IfDropped::Discard);
        queue.import(transfer(1, signer(9), 1, 200, 1), IfDropped::Discard);
        state.apply_ready_transactions(&queue, &*executor, U256::ZERO);

        let mid = state.state_after(1, &*executor).unwrap();
        assert_eq!(mid.balance(&signer(9)), U256::from(100u64));
        let full = state.state_after(2, &*executor).unwrap();
        assert_eq!(full.balance(&signer(9)), U256::from(300u64));
        assert!(state.state_after(3, &*executor).is_err());
    }
}

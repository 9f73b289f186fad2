//! End-to-end coordinator scenarios against the mock collaborators.

use cinder_client::{
    Client, ClientComponents, ClientConfig, FilterChange, FilterCriteria, GasPricer,
    OctileGasPricer, TrivialGasPricer, VersionChecker, CHAIN_CHANGED_FILTER,
    PENDING_CHANGED_FILTER,
};
use cinder_interfaces::{
    test_utils::{
        signer, transfer, TestBlockQueue, TestChain, TestFarm, TestHost,
        TestTransactionQueue, TransferExecutor,
    },
    BlockImportQueue, Blockchain, CallRequest, MemoryStateDb, TransactionQueue, WithExisting,
};
use cinder_primitives::{
    constants::MINIMUM_DIFFICULTY, keccak256, pow, Address, Bytes, StateOverlay,
    TransactionKind, B256, U256,
};
use std::{sync::Arc, time::Duration};

struct Harness {
    client: Client,
    chain: Arc<TestChain>,
    block_queue: Arc<TestBlockQueue>,
    transaction_queue: Arc<TestTransactionQueue>,
    farm: Arc<TestFarm>,
    host: Arc<TestHost>,
    _dir: tempfile::TempDir,
}

fn funded_genesis() -> StateOverlay {
    let mut state = StateOverlay::new();
    for seed in 1..=3 {
        state.add_balance(signer(seed), U256::from(u64::MAX));
    }
    state
}

fn harness() -> Harness {
    harness_with(funded_genesis(), ClientConfig::default(), Duration::ZERO)
}

fn harness_with(
    genesis_state: StateOverlay,
    config: ClientConfig,
    import_delay: Duration,
) -> Harness {
    let executor = Arc::new(TransferExecutor::new());
    let chain = Arc::new(
        TestChain::new(genesis_state, executor.clone()).with_import_delay(import_delay),
    );
    let block_queue = Arc::new(TestBlockQueue::new());
    let transaction_queue = Arc::new(TestTransactionQueue::new());
    let farm = Arc::new(TestFarm::new());
    let host = Arc::new(TestHost::new());
    let dir = tempfile::tempdir().expect("tempdir");

    let client = Client::new(
        ClientComponents {
            chain: chain.clone(),
            state_db: Arc::new(MemoryStateDb::new()),
            block_queue: block_queue.clone(),
            transaction_queue: transaction_queue.clone(),
            host: host.clone(),
            farm: farm.clone(),
            executor,
            gas_pricer: Box::new(TrivialGasPricer::new(U256::from(1u64))),
        },
        dir.path(),
        WithExisting::Trust,
        config,
    )
    .expect("client construction");

    // tests drive the worker loop by hand for determinism
    client.stop();

    Harness { client, chain, block_queue, transaction_queue, farm, host, _dir: dir }
}

/// Drains the block queue completely.
fn settle(harness: &Harness) {
    while harness.block_queue.status().pending > 0 {
        harness.client.flush_transactions();
    }
    harness.client.flush_transactions();
}

#[test]
fn fresh_start_writes_status_and_serves_work() {
    let harness = harness();

    // an empty db dir fails the version check, forcing a wipe on open
    assert_eq!(harness.chain.reopen_actions(), vec![WithExisting::Kill]);

    // ... but set_ok recorded the current tuple, so the next start trusts it
    let checker = VersionChecker::new(harness._dir.path(), harness.chain.genesis_hash());
    assert_eq!(checker.action(), WithExisting::Trust);

    let work = harness.client.get_work();
    assert!(!work.is_empty());
    assert!(!work.header_hash.is_zero());
    // no local mining was requested, so the farm stays idle
    assert!(!harness.client.is_mining());
}

#[test]
fn transaction_drain_publishes_post_state_and_notifies_watches() {
    let harness = harness();
    let pending_watch =
        harness.client.install_sentinel_watch(PENDING_CHANGED_FILTER).expect("sentinel");

    let txs = [
        transfer(1, signer(9), 0, 100, 10),
        transfer(1, signer(9), 1, 100, 10),
        transfer(2, signer(9), 0, 50, 10),
    ];
    for tx in &txs {
        assert!(harness
            .transaction_queue
            .import(tx.clone(), cinder_interfaces::IfDropped::Discard)
            .is_success());
    }

    harness.client.flush_transactions();

    let pending = harness.client.pending_transactions();
    assert_eq!(pending.len(), 3);
    assert_eq!(
        pending.iter().map(|tx| tx.hash()).collect::<Vec<_>>(),
        txs.iter().map(|tx| tx.hash()).collect::<Vec<_>>()
    );

    let changes = harness.client.check_watch(pending_watch).expect("watch exists");
    assert_eq!(
        changes,
        txs.iter().map(|tx| FilterChange::Hash(tx.hash())).collect::<Vec<_>>()
    );

    assert!(harness.host.new_transaction_notes() >= 1);
}

#[test]
fn log_filters_catch_pending_and_mined_logs() {
    let harness = harness();

    // a transfer with input data makes the mock executor emit a log at the
    // target address, topic'd with the keccak of the input
    let payload = Bytes::from_static(b"topic-payload");
    let target = signer(9);
    let tx = cinder_primitives::Transaction {
        nonce: 0,
        gas_price: 10,
        gas_limit: 21_000,
        to: TransactionKind::Call(target),
        value: U256::from(5u64),
        input: payload.clone(),
    }
    .into_signed(cinder_primitives::Signature {
        v: 27,
        r: U256::from_be_slice(signer(1).as_slice()),
        s: U256::from(1u64),
    });

    let watch = harness
        .client
        .install_watch(FilterCriteria::default().address(target).topic(vec![keccak256(&payload)]));
    let miss =
        harness.client.install_watch(FilterCriteria::default().address(Address::repeat_byte(0x99)));

    harness.transaction_queue.import(tx.clone(), cinder_interfaces::IfDropped::Discard);
    harness.client.flush_transactions();

    let changes = harness.client.check_watch(watch).expect("watch exists");
    assert_eq!(changes.len(), 1);
    match &changes[0] {
        FilterChange::Log(entry) => {
            assert_eq!(entry.transaction_hash, tx.hash());
            assert_eq!(entry.address, target);
            // pending logs are not yet localised to a block
            assert!(entry.block_hash.is_zero());
        }
        other => panic!("expected a log, got {other:?}"),
    }
    assert!(harness.client.check_watch(miss).expect("watch exists").is_empty());

    // mine the block carrying the same transaction and expect a localised log
    let block = harness
        .chain
        .build_block(harness.chain.genesis_hash(), Address::ZERO, 30, vec![tx.clone()])
        .expect("block builds");
    harness.block_queue.import(&block.rlp_bytes(), false);
    settle(&harness);

    let changes = harness.client.check_watch(watch).expect("watch exists");
    assert_eq!(changes.len(), 1);
    match &changes[0] {
        FilterChange::Log(entry) => {
            assert_eq!(entry.block_hash, block.hash_slow());
            assert_eq!(entry.block_number, 1);
            assert_eq!(entry.transaction_hash, tx.hash());
            assert_eq!(entry.log_index, 0);
        }
        other => panic!("expected a log, got {other:?}"),
    }
}

#[test]
fn reorg_returns_dead_transactions_and_lists_new_blocks() {
    let harness = harness();
    let chain_watch =
        harness.client.install_sentinel_watch(CHAIN_CHANGED_FILTER).expect("sentinel");
    let genesis = harness.chain.genesis_hash();

    // canonical block at height one carrying a transaction
    let tx_old = transfer(1, signer(9), 0, 100, 10);
    let b1 = harness
        .chain
        .build_block(genesis, Address::ZERO, 50, vec![tx_old.clone()])
        .expect("block builds");
    harness.block_queue.import(&b1.rlp_bytes(), false);
    settle(&harness);

    assert_eq!(harness.client.chain_info().best_hash, b1.hash_slow());
    assert_eq!(
        harness.client.check_watch(chain_watch).expect("watch exists"),
        vec![FilterChange::Hash(b1.hash_slow())]
    );

    // a faster two-block side chain outweighs it
    let s1 = harness
        .chain
        .build_block(genesis, Address::repeat_byte(0xd1), 5, vec![])
        .expect("block builds");
    let s2 = harness
        .chain
        .build_block(s1.hash_slow(), Address::repeat_byte(0xd1), 10, vec![])
        .expect("block builds");
    harness.block_queue.import(&s1.rlp_bytes(), false);
    harness.block_queue.import(&s2.rlp_bytes(), false);
    settle(&harness);

    assert_eq!(harness.client.chain_info().best_hash, s2.hash_slow());

    // the dead block's transaction went back into circulation
    assert!(harness.transaction_queue.contains(tx_old.hash()));

    // and the chain watch lists both new block hashes
    let changes = harness.client.check_watch(chain_watch).expect("watch exists");
    assert!(changes.contains(&FilterChange::Hash(s1.hash_slow())));
    assert!(changes.contains(&FilterChange::Hash(s2.hash_slow())));
    assert!(!changes.contains(&FilterChange::Hash(b1.hash_slow())));
}

#[test]
fn adaptive_batch_size_climbs_with_fast_imports() {
    // a builder chain assembles a long run of valid blocks up front
    let executor = Arc::new(TransferExecutor::new());
    let builder = TestChain::new(funded_genesis(), executor.clone());
    let builder_queue = TestBlockQueue::new();
    let builder_db = MemoryStateDb::new();

    let mut head = builder.genesis_hash();
    let mut timestamp = 0u64;
    let mut encoded = Vec::new();
    for _ in 0..900 {
        timestamp += 13;
        let block = builder.build_block(head, Address::ZERO, timestamp, vec![]).expect("builds");
        head = block.hash_slow();
        encoded.push(block.rlp_bytes());
        builder_queue.import(encoded.last().expect("just pushed"), false);
        builder.sync(&builder_queue, &builder_db, usize::MAX);
    }

    let harness = harness_with(
        funded_genesis(),
        ClientConfig::default(),
        Duration::from_millis(2),
    );
    for bytes in &encoded {
        harness.block_queue.import(bytes, false);
    }

    settle(&harness);

    assert_eq!(harness.client.chain_info().best_number, 900);
    let batch = harness.client.sync_batch_size();
    assert!((80..=100).contains(&batch), "batch size should plateau near the cap, got {batch}");
}

#[test]
fn canary_gates_work_handout() {
    let mut genesis_state = funded_genesis();
    genesis_state.set_storage(
        cinder_client::CANARY_ADDRESS,
        B256::ZERO,
        B256::with_last_byte(1),
    );
    let harness = harness_with(genesis_state, ClientConfig::default(), Duration::ZERO);

    assert!(harness.client.is_chain_bad());
    assert!(!harness.client.is_upgrade_needed());
    assert!(harness.client.get_work().is_empty());

    harness.client.set_mine_on_bad_chain(true);
    assert!(!harness.client.get_work().is_empty());
}

#[test]
fn canary_value_two_requests_upgrade() {
    let mut genesis_state = funded_genesis();
    genesis_state.set_storage(
        cinder_client::CANARY_ADDRESS,
        B256::ZERO,
        B256::with_last_byte(2),
    );
    let harness = harness_with(genesis_state, ClientConfig::default(), Duration::ZERO);
    assert!(harness.client.is_chain_bad());
    assert!(harness.client.is_upgrade_needed());
}

#[test]
fn submit_work_seals_and_reimports_own_block() {
    let harness = harness();
    harness.client.start_mining();

    assert!(harness.client.is_mining());
    assert!(!harness.farm.gpu_started());
    let work = harness.farm.current_work().expect("work was handed to the farm");
    assert_eq!(work, harness.client.get_work());

    // the genesis child is sealed at the difficulty floor, which a brute
    // force search cracks quickly
    let solution = pow::solve(work.header_hash, U256::from(MINIMUM_DIFFICULTY), 0, u64::MAX)
        .expect("difficulty floor is searchable");
    assert!(harness.farm.submit_found(solution));

    // exactly one sealed block was offered to the import queue as ours
    assert_eq!(harness.block_queue.our_blocks().len(), 1);
    settle(&harness);
    assert_eq!(harness.client.chain_info().best_number, 1);
    assert_eq!(harness.host.new_block_notes(), 1);

    // a junk solution is rejected
    assert!(!harness.farm.submit_found(pow::PowSolution::default()));
}

#[test]
fn turbo_mining_prefers_gpu_workers() {
    let mut config = ClientConfig::default();
    config.turbo_mining = true;
    let harness = harness_with(funded_genesis(), config, Duration::ZERO);
    harness.client.start_mining();
    assert!(harness.farm.gpu_started());
    harness.client.stop_mining();
    assert!(!harness.client.is_mining());
}

#[test]
fn call_simulation_cannot_run_out_of_funds_and_mutates_nothing() {
    let harness = harness();
    let broke_caller = Address::repeat_byte(0x77);
    let payload = Bytes::from_static(b"ping");

    let result = harness.client.call(CallRequest {
        from: broke_caller,
        to: TransactionKind::Call(signer(9)),
        gas: 100_000,
        gas_price: 1,
        value: U256::from(1_000u64),
        data: payload.clone(),
    });

    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.output, payload);
    assert_eq!(result.logs.len(), 1);

    // the simulation ran against a copy; the published state is untouched
    assert_eq!(
        harness.client.storage_at(signer(9), B256::ZERO, None).expect("readable"),
        B256::ZERO
    );
    let chain_state =
        harness.client.state_at_block(harness.chain.genesis_hash()).expect("genesis state");
    assert_eq!(chain_state.balance(&signer(9)), U256::ZERO);
}

#[test]
fn call_failure_is_folded_into_the_result() {
    let harness = harness();
    let result = harness.client.call(CallRequest {
        from: signer(1),
        to: TransactionKind::Call(signer(9)),
        gas: 1_000, // below the flat transfer cost
        gas_price: 1,
        value: U256::ZERO,
        data: Bytes::new(),
    });
    assert!(!result.success);
    assert!(result.error.is_some());
}

#[test]
fn state_queries_walk_pending_prefixes() {
    let harness = harness();
    for (nonce, value) in [(0u64, 100u64), (1, 200)] {
        harness.transaction_queue.import(
            transfer(1, signer(9), nonce, value, 10),
            cinder_interfaces::IfDropped::Discard,
        );
    }
    harness.client.flush_transactions();

    let none = harness.client.state_at_transaction(0, None).expect("prefix of zero");
    assert_eq!(none.balance(&signer(9)), U256::ZERO);
    let one = harness.client.state_at_transaction(1, None).expect("prefix of one");
    assert_eq!(one.balance(&signer(9)), U256::from(100u64));
    let both = harness.client.state_at_transaction(2, None).expect("prefix of two");
    assert_eq!(both.balance(&signer(9)), U256::from(300u64));
    assert!(harness.client.state_at_transaction(3, None).is_err());
}

#[test]
fn clear_pending_resets_to_the_chain_head() {
    let harness = harness();
    let pending_watch =
        harness.client.install_sentinel_watch(PENDING_CHANGED_FILTER).expect("sentinel");
    harness.transaction_queue.import(
        transfer(1, signer(9), 0, 100, 10),
        cinder_interfaces::IfDropped::Discard,
    );
    harness.client.flush_transactions();
    assert_eq!(harness.client.pending_transactions().len(), 1);
    harness.client.check_watch(pending_watch).expect("watch exists");

    harness.client.clear_pending();
    assert!(harness.client.pending_transactions().is_empty());
    assert!(harness.transaction_queue.is_empty());
    // the reset raised a pending-changed notification, and the watch is
    // still being serviced
    assert!(harness.client.check_watch(pending_watch).is_some());
    // clearing the pool does not switch local mining on
    assert!(!harness.client.is_mining());
}

#[test]
fn kill_chain_wipes_and_restarts() {
    let harness = harness();
    let genesis = harness.chain.genesis_hash();

    let block = harness
        .chain
        .build_block(genesis, Address::ZERO, 30, vec![])
        .expect("block builds");
    harness.block_queue.import(&block.rlp_bytes(), false);
    settle(&harness);
    assert_eq!(harness.client.chain_info().best_number, 1);

    harness.client.start_mining();
    harness.client.kill_chain().expect("kill chain");

    assert_eq!(harness.client.chain_info().best_hash, genesis);
    assert!(harness.transaction_queue.is_empty());
    assert_eq!(harness.host.resets(), 1);
    assert!(harness.chain.reopen_actions().contains(&WithExisting::Kill));
    // mining was on before the wipe, so it came back on
    assert!(harness.client.is_mining());
}

#[test]
fn mining_history_is_empty_and_progress_tracks_the_farm() {
    let harness = harness();
    assert!(harness.client.mining_history().is_empty());
    assert_eq!(harness.client.hashrate(), 0);

    harness.client.start_mining();
    assert_eq!(harness.client.hashrate(), 1_000);
    assert_eq!(harness.client.mining_progress().hashes, 1_000);
}

#[test]
fn uninstalled_watches_stop_reporting() {
    let harness = harness();
    let watch = harness.client.install_watch(FilterCriteria::default());
    assert!(harness.client.peek_watch(watch).is_some());
    assert!(harness.client.uninstall_watch(watch));
    assert!(!harness.client.uninstall_watch(watch));
    assert!(harness.client.check_watch(watch).is_none());
}

#[test]
fn syncing_peers_defer_transaction_drains() {
    let harness = harness();
    harness.host.set_syncing(true);
    harness.transaction_queue.import(
        transfer(1, signer(9), 0, 100, 10),
        cinder_interfaces::IfDropped::Discard,
    );
    harness.client.flush_transactions();
    assert!(harness.client.pending_transactions().is_empty());

    // once the network settles, the next ready signal drains as usual
    harness.host.set_syncing(false);
    harness.transaction_queue.import(
        transfer(2, signer(9), 0, 100, 10),
        cinder_interfaces::IfDropped::Discard,
    );
    harness.client.flush_transactions();
    assert_eq!(harness.client.pending_transactions().len(), 2);
}

#[test]
fn octile_pricer_learns_from_chain_history() {
    let executor = Arc::new(TransferExecutor::new());
    let chain = TestChain::new(funded_genesis(), executor.clone());
    let queue = TestBlockQueue::new();
    let db = MemoryStateDb::new();

    let mut head = chain.genesis_hash();
    let mut timestamp = 0;
    for (nonce, gas_price) in [(0u64, 10u128), (1, 50), (2, 400)] {
        timestamp += 20;
        let block = chain
            .build_block(head, Address::ZERO, timestamp, vec![transfer(
                1,
                signer(9),
                nonce,
                1,
                gas_price,
            )])
            .expect("builds");
        head = block.hash_slow();
        queue.import(&block.rlp_bytes(), false);
        chain.sync(&queue, &db, usize::MAX);
    }

    let mut pricer = OctileGasPricer::new(Default::default());
    pricer.update(&chain);

    let octiles = *pricer.octiles();
    assert_eq!(octiles[0], U256::from(10u64));
    assert_eq!(octiles[8], U256::from(400u64));
    for pair in octiles.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert!(pricer.ask() >= pricer.bid());
}

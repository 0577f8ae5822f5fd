//! Behavioral tests for the state façade: lifecycle, snapshot/revert,
//! commit round-trips and history reconstruction.

use crate::access_list::AccessListItem;
use crate::cached_db::CachingDb;
use crate::error::StateError;
use crate::history::HistoryDb;
use crate::statedb::StateDb;
use axion_storage::{KvBatch, KvIter, KvStore, MemoryKv, StorageError};
use axion_types::{Address, Hash, Log, U256, EMPTY_CODE_HASH};
use std::sync::Arc;

struct StateEnv {
    current_disk: Arc<MemoryKv>,
    history_disk: Arc<MemoryKv>,
    state: StateDb,
}

fn new_state_env() -> StateEnv {
    let current_disk = Arc::new(MemoryKv::new());
    let history_disk = Arc::new(MemoryKv::new());
    let state = StateDb::new(
        Arc::new(CachingDb::new(current_disk.clone() as Arc<dyn KvStore>)),
        Arc::new(HistoryDb::new(history_disk.clone() as Arc<dyn KvStore>)),
    );
    StateEnv {
        current_disk,
        history_disk,
        state,
    }
}

fn reopen(env: &StateEnv) -> StateDb {
    StateDb::new(
        Arc::new(CachingDb::new(env.current_disk.clone() as Arc<dyn KvStore>)),
        Arc::new(HistoryDb::new(env.history_disk.clone() as Arc<dyn KvStore>)),
    )
}

fn addr(b: u8) -> Address {
    Address::from_bytes([b; 20])
}

#[test]
fn test_basic_account_mutations() {
    let mut env = new_state_env();
    let state = &mut env.state;

    state.add_balance(addr(1), U256::from(22u64));
    assert_eq!(state.get_balance(addr(1)), U256::from(22u64));

    state.set_balance(addr(2), U256::from(44u64));
    assert_eq!(state.get_balance(addr(2)), U256::from(44u64));

    state.set_nonce(addr(1), 3);
    assert_eq!(state.get_nonce(addr(1)), 3);

    let code = vec![3u8; 7];
    state.set_code(addr(3), code.clone());
    assert_eq!(state.get_code(addr(3)), code);
    assert_eq!(state.get_code_hash(addr(3)), Hash::keccak(&code));
    assert_eq!(state.get_code_size(addr(3)), 7);

    // Untouched account reads as typed zero
    assert_eq!(state.get_balance(addr(9)), U256::ZERO);
    assert_eq!(state.get_nonce(addr(9)), 0);
    assert!(!state.exists(addr(9)));
    assert!(state.empty(addr(9)));
}

#[test]
fn test_commit_round_trip() {
    let mut env = new_state_env();

    let code = vec![3u8, 3, 3, 3, 3, 3, 3];
    env.state.set_balance(addr(1), U256::from(44u64));
    env.state.set_code(addr(2), code.clone());
    env.state.commit().unwrap();

    let mut fresh = reopen(&env);
    assert_eq!(fresh.get_balance(addr(1)), U256::from(44u64));
    assert_eq!(fresh.get_code(addr(2)), code);
    assert_eq!(fresh.get_code_hash(addr(2)), Hash::keccak(&code));
}

#[test]
fn test_commit_digest_deterministic() {
    let run = || {
        let mut env = new_state_env();
        // Insertion order differs from address order on purpose.
        env.state.set_state(addr(7), Hash::compute(b"k2"), Hash::compute(b"v2"));
        env.state.set_state(addr(3), Hash::compute(b"k1"), Hash::compute(b"v1"));
        env.state.set_balance(addr(5), U256::from(9u64));
        env.state.commit().unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_storage_round_trip_through_disk() {
    let mut env = new_state_env();
    let key = Hash::compute(b"slot");
    let value = Hash::compute(b"value");

    env.state.set_balance(addr(1), U256::ONE);
    env.state.set_state(addr(1), key, value);
    env.state.commit().unwrap();

    let mut fresh = reopen(&env);
    assert_eq!(fresh.get_state(addr(1), key), value);
    assert_eq!(fresh.get_committed_state(addr(1), key), value);
}

#[test]
fn test_snapshot_revert_scalars() {
    let mut env = new_state_env();
    let state = &mut env.state;
    let key = Hash::compute(b"k");

    state.set_balance(addr(1), U256::from(10u64));
    state.set_nonce(addr(1), 1);
    state.set_state(addr(1), key, Hash::compute(b"before"));

    let snap = state.snapshot();

    state.set_balance(addr(1), U256::from(99u64));
    state.set_nonce(addr(1), 9);
    state.set_state(addr(1), key, Hash::compute(b"after"));
    state.set_code(addr(1), vec![1, 2, 3]);
    state.add_refund(55);

    state.revert_to_snapshot(snap);

    assert_eq!(state.get_balance(addr(1)), U256::from(10u64));
    assert_eq!(state.get_nonce(addr(1)), 1);
    assert_eq!(state.get_state(addr(1), key), Hash::compute(b"before"));
    assert_eq!(state.get_code_hash(addr(1)), EMPTY_CODE_HASH);
    assert_eq!(state.refund(), 0);
}

#[test]
fn test_snapshot_revert_account_creation() {
    let mut env = new_state_env();
    let state = &mut env.state;

    let snap = state.snapshot();
    state.set_balance(addr(4), U256::from(7u64));
    assert!(state.exists(addr(4)));

    state.revert_to_snapshot(snap);
    assert!(!state.exists(addr(4)));
}

#[test]
fn test_nested_snapshots_revert_out_of_order() {
    let mut env = new_state_env();
    let state = &mut env.state;

    state.set_balance(addr(1), U256::from(1u64));
    let outer = state.snapshot();
    state.set_balance(addr(1), U256::from(2u64));
    let inner = state.snapshot();
    state.set_balance(addr(1), U256::from(3u64));

    state.revert_to_snapshot(inner);
    assert_eq!(state.get_balance(addr(1)), U256::from(2u64));

    state.revert_to_snapshot(outer);
    assert_eq!(state.get_balance(addr(1)), U256::from(1u64));
}

#[test]
#[should_panic(expected = "cannot be reverted")]
fn test_revert_unknown_snapshot_panics() {
    let mut env = new_state_env();
    let snap = env.state.snapshot();
    env.state.revert_to_snapshot(snap);
    // Already consumed; reverting again must panic.
    env.state.revert_to_snapshot(snap);
}

#[test]
#[should_panic(expected = "refund counter below zero")]
fn test_refund_underflow_panics() {
    let mut env = new_state_env();
    env.state.add_refund(5);
    env.state.sub_refund(10);
}

#[test]
fn test_equal_value_write_is_noop() {
    let mut env = new_state_env();
    let state = &mut env.state;
    let key = Hash::compute(b"k");

    state.set_state(addr(1), key, Hash::compute(b"v"));
    let len = state.journal_len();
    state.set_state(addr(1), key, Hash::compute(b"v"));
    assert_eq!(state.journal_len(), len);
}

#[test]
fn test_finalise_idempotent() {
    let mut env = new_state_env();
    let state = &mut env.state;
    let key = Hash::compute(b"k");

    state.set_balance(addr(1), U256::from(5u64));
    state.set_state(addr(1), key, Hash::compute(b"v"));
    state.finalise();
    let committed = state.get_committed_state(addr(1), key);
    state.finalise();
    assert_eq!(state.get_committed_state(addr(1), key), committed);
    assert_eq!(state.get_balance(addr(1)), U256::from(5u64));
}

#[test]
fn test_dirty_promoted_at_tx_boundary() {
    let mut env = new_state_env();
    let state = &mut env.state;
    let key = Hash::compute(b"k");

    state.set_balance(addr(1), U256::ONE);
    state.set_state(addr(1), key, Hash::compute(b"v1"));
    assert_eq!(state.get_committed_state(addr(1), key), Hash::ZERO);

    state.finalise();
    assert_eq!(state.get_committed_state(addr(1), key), Hash::compute(b"v1"));

    // Next transaction shadows it in dirty only
    state.set_tx_context(Hash::compute(b"tx2"), 1);
    state.set_state(addr(1), key, Hash::compute(b"v2"));
    assert_eq!(state.get_state(addr(1), key), Hash::compute(b"v2"));
    assert_eq!(state.get_committed_state(addr(1), key), Hash::compute(b"v1"));
}

#[test]
fn test_suicide_lifecycle() {
    let mut env = new_state_env();
    let state = &mut env.state;

    state.set_balance(addr(1), U256::from(100u64));
    assert!(!state.has_suicided(addr(1)));

    let snap = state.snapshot();
    assert!(state.suicide(addr(1)));
    assert!(state.has_suicided(addr(1)));
    assert_eq!(state.get_balance(addr(1)), U256::ZERO);

    state.revert_to_snapshot(snap);
    assert!(!state.has_suicided(addr(1)));
    assert_eq!(state.get_balance(addr(1)), U256::from(100u64));

    // Suicide for real this time: the account dies at the tx boundary
    assert!(state.suicide(addr(1)));
    state.finalise();
    assert!(!state.exists(addr(1)));

    // Suiciding a missing account reports false
    assert!(!state.suicide(addr(9)));
}

#[test]
fn test_create_account_carries_balance_forward() {
    let mut env = new_state_env();
    let state = &mut env.state;

    state.set_balance(addr(1), U256::from(33u64));
    state.set_nonce(addr(1), 5);
    state.set_state(addr(1), Hash::compute(b"k"), Hash::compute(b"v"));

    state.create_account(addr(1));
    assert_eq!(state.get_balance(addr(1)), U256::from(33u64));
    assert_eq!(state.get_nonce(addr(1)), 0);
    assert_eq!(state.get_state(addr(1), Hash::compute(b"k")), Hash::ZERO);
}

#[test]
fn test_access_list() {
    let mut env = new_state_env();
    let state = &mut env.state;
    let slot = Hash::compute(b"slot");

    state.prepare(
        addr(1),
        addr(9),
        Some(addr(2)),
        &[addr(3)],
        &[AccessListItem {
            address: addr(4),
            storage_keys: vec![slot],
        }],
    );

    assert!(state.address_in_access_list(&addr(1)));
    assert!(state.address_in_access_list(&addr(2)));
    assert!(state.address_in_access_list(&addr(3)));
    assert_eq!(state.slot_in_access_list(&addr(4), &slot), (true, true));
    assert!(!state.address_in_access_list(&addr(5)));

    // Mid-transaction additions are journaled and revert
    let snap = state.snapshot();
    state.add_address_to_access_list(addr(5));
    state.add_slot_to_access_list(addr(5), slot);
    assert_eq!(state.slot_in_access_list(&addr(5), &slot), (true, true));

    state.revert_to_snapshot(snap);
    assert!(!state.address_in_access_list(&addr(5)));

    // A new transaction clears the previous warm set
    state.prepare(addr(6), addr(9), None, &[], &[]);
    assert!(!state.address_in_access_list(&addr(1)));
    assert!(state.address_in_access_list(&addr(6)));
}

#[test]
fn test_logs_follow_tx_context_and_revert() {
    let mut env = new_state_env();
    let state = &mut env.state;
    let tx = Hash::compute(b"tx");

    state.set_block_info(7);
    state.set_tx_context(tx, 2);

    state.add_log(Log {
        address: addr(1),
        topics: vec![Hash::compute(b"topic")],
        data: vec![1, 2, 3],
        ..Default::default()
    });

    let logs = state.logs(&tx);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tx_hash, tx);
    assert_eq!(logs[0].tx_index, 2);
    assert_eq!(logs[0].block_number, 7);

    let snap = state.snapshot();
    state.add_log(Log::default());
    assert_eq!(state.logs(&tx).len(), 2);
    state.revert_to_snapshot(snap);
    assert_eq!(state.logs(&tx).len(), 1);
}

#[test]
fn test_history_reconstructs_current_state() {
    let mut env = new_state_env();
    let k1 = Hash::compute(b"k1");
    let k2 = Hash::compute(b"k2");

    // Block 1: two transactions touching the same account
    env.state.set_block_info(1);
    env.state.set_tx_context(Hash::compute(b"tx0"), 0);
    env.state.set_balance(addr(1), U256::from(10u64));
    env.state.set_state(addr(1), k1, Hash::compute(b"a"));
    env.state.finalise();
    env.state.set_tx_context(Hash::compute(b"tx1"), 1);
    env.state.set_state(addr(1), k1, Hash::compute(b"b"));
    env.state.set_nonce(addr(1), 1);
    env.state.commit().unwrap();

    // Block 2 over a fresh state view
    let mut state2 = reopen(&env);
    state2.set_block_info(2);
    state2.set_tx_context(Hash::compute(b"tx2"), 0);
    state2.set_balance(addr(1), U256::from(20u64));
    state2.set_state(addr(1), k2, Hash::compute(b"c"));
    state2.commit().unwrap();

    // Replaying history must reproduce the current store's image
    let history = HistoryDb::new(env.history_disk.clone() as Arc<dyn KvStore>);
    let (metadata, storage) = history.reconstruct_account(&addr(1)).unwrap().unwrap();
    assert_eq!(metadata.nonce, 1);
    assert_eq!(metadata.balance, U256::from(20u64));
    assert_eq!(storage.get(&k1), Some(&Hash::compute(b"b")));
    assert_eq!(storage.get(&k2), Some(&Hash::compute(b"c")));

    let current = CachingDb::new(env.current_disk.clone() as Arc<dyn KvStore>);
    let account = current.get_account(&addr(1)).unwrap().unwrap();
    assert_eq!(account.nonce, metadata.nonce);
    assert_eq!(account.balance, metadata.balance);
    for (slot, value) in &storage {
        assert_eq!(account.storage.get(slot), Some(value));
    }
}

#[test]
fn test_history_keeps_per_tx_view() {
    let mut env = new_state_env();
    let key = Hash::compute(b"k");

    env.state.set_block_info(1);
    env.state.set_tx_context(Hash::compute(b"tx0"), 0);
    env.state.set_state(addr(1), key, Hash::compute(b"first"));
    env.state.set_balance(addr(1), U256::ONE);
    env.state.finalise();
    env.state.set_tx_context(Hash::compute(b"tx1"), 1);
    env.state.set_state(addr(1), key, Hash::compute(b"second"));
    env.state.commit().unwrap();

    let history = HistoryDb::new(env.history_disk.clone() as Arc<dyn KvStore>);
    let tx0 = history.storage_changes(&addr(1), 1, 0).unwrap();
    assert_eq!(tx0.get(&key), Some(&Hash::compute(b"first")));
    let tx1 = history.storage_changes(&addr(1), 1, 1).unwrap();
    assert_eq!(tx1.get(&key), Some(&Hash::compute(b"second")));
}

#[test]
fn test_sub_balance_does_not_wrap() {
    let mut env = new_state_env();
    let state = &mut env.state;

    state.set_balance(addr(1), U256::from(5u64));
    state.sub_balance(addr(1), U256::from(3u64));
    assert_eq!(state.get_balance(addr(1)), U256::from(2u64));

    state.sub_balance(addr(1), U256::from(10u64));
    // Balance unchanged, error memoised, commit refuses
    assert_eq!(state.get_balance(addr(1)), U256::from(2u64));
    assert!(state.error().is_some());
    assert!(matches!(
        state.commit(),
        Err(StateError::CommitAborted(_))
    ));
}

#[test]
fn test_copy_is_independent() {
    let mut env = new_state_env();
    env.state.set_balance(addr(1), U256::from(10u64));

    let mut copy = env.state.copy();
    assert_eq!(copy.get_balance(addr(1)), U256::from(10u64));

    copy.set_balance(addr(1), U256::from(99u64));
    assert_eq!(env.state.get_balance(addr(1)), U256::from(10u64));
    assert_eq!(copy.get_balance(addr(1)), U256::from(99u64));
}

/// Store whose reads fail, for exercising the error memo.
struct FailingKv;

impl KvStore for FailingKv {
    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Err(StorageError::Database("disk gone".to_string()))
    }

    fn put(&self, _key: &[u8], _value: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Database("disk gone".to_string()))
    }

    fn has(&self, _key: &[u8]) -> Result<bool, StorageError> {
        Err(StorageError::Database("disk gone".to_string()))
    }

    fn delete(&self, _key: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Database("disk gone".to_string()))
    }

    fn iter_prefix(&self, _prefix: &[u8], _start: &[u8]) -> KvIter<'_> {
        Box::new(std::iter::once(Err(StorageError::Database(
            "disk gone".to_string(),
        ))))
    }

    fn new_batch(&self) -> Box<dyn KvBatch + '_> {
        struct FailBatch;
        impl KvBatch for FailBatch {
            fn put(&mut self, _key: &[u8], _value: &[u8]) {}
            fn delete(&mut self, _key: &[u8]) {}
            fn len(&self) -> usize {
                0
            }
            fn write(self: Box<Self>) -> Result<(), StorageError> {
                Err(StorageError::Database("disk gone".to_string()))
            }
        }
        Box::new(FailBatch)
    }
}

#[test]
fn test_read_error_memoised_and_commit_aborts() {
    let mut state = StateDb::new(
        Arc::new(CachingDb::new(Arc::new(FailingKv))),
        Arc::new(HistoryDb::new(Arc::new(MemoryKv::new()) as Arc<dyn KvStore>)),
    );

    // Read yields typed zero and sets the memo
    assert_eq!(state.get_balance(addr(1)), U256::ZERO);
    assert!(state.error().is_some());

    assert!(matches!(state.commit(), Err(StateError::CommitAborted(_))));
}

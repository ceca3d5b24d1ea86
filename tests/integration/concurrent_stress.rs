//! Multi-threaded writers and readers sharing one tree.
#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use blinktree::{BLinkOptions, BLinkTree, MemoryStore, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const NUM_THREADS: usize = 8;
const KEYS_PER_THREAD: u64 = 1_000;

fn shared_tree(max_node_size: usize) -> Result<Arc<BLinkTree<u64, u64>>> {
    let store = Arc::new(MemoryStore::new());
    let tree = BLinkTree::create(store, BLinkOptions::default().with_max_node_size(max_node_size))?;
    Ok(Arc::new(tree))
}

#[test]
fn disjoint_writers_lose_no_updates() -> Result<()> {
    let tree = shared_tree(6)?;
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let mut handles = Vec::new();

    for thread_id in 0..NUM_THREADS as u64 {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            let mut keys: Vec<u64> = (0..KEYS_PER_THREAD)
                .map(|i| i * NUM_THREADS as u64 + thread_id)
                .collect();
            keys.shuffle(&mut ChaCha8Rng::seed_from_u64(thread_id));
            barrier.wait();
            for key in keys {
                assert_eq!(tree.put(key, key * 2)?, None);
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().expect("writer panicked")?;
    }

    let total = NUM_THREADS as u64 * KEYS_PER_THREAD;
    assert_eq!(tree.locks_held(), 0);
    for key in 0..total {
        assert_eq!(tree.get(&key)?, Some(key * 2), "key {key}");
    }
    let keys: Vec<u64> = tree.keys()?.collect::<Result<_>>()?;
    assert_eq!(keys, (0..total).collect::<Vec<_>>());
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    Ok(())
}

#[test]
fn writers_and_removers_on_interleaved_keys() -> Result<()> {
    let tree = shared_tree(4)?;
    for key in 0..4_000u64 {
        tree.put(key, key)?;
    }
    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for lane in 0..4u64 {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for key in (lane..4_000).step_by(4) {
                if lane % 2 == 0 {
                    assert_eq!(tree.remove(&key)?, Some(key));
                } else {
                    assert_eq!(tree.put(key, key + 1)?, Some(key));
                    tree.put(key + 10_000, key)?;
                }
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked")?;
    }

    assert_eq!(tree.locks_held(), 0);
    let mut expected = BTreeSet::new();
    for key in 0..4_000u64 {
        if key % 2 == 1 {
            expected.insert(key);
            expected.insert(key + 10_000);
        }
    }
    let keys: BTreeSet<u64> = tree.keys()?.collect::<Result<_>>()?;
    assert_eq!(keys, expected);
    for key in (1..4_000u64).step_by(2) {
        assert_eq!(tree.get(&key)?, Some(key + 1));
    }
    assert!(tree.verify()?.success);
    Ok(())
}

#[test]
fn readers_see_sorted_snapshots_during_writes() -> Result<()> {
    let tree = shared_tree(5)?;
    for key in (0..2_000u64).step_by(2) {
        tree.put(key, key)?;
    }
    let barrier = Arc::new(Barrier::new(4));
    let mut writers = Vec::new();
    for lane in 0..2u64 {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        writers.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for key in (1 + lane * 2..2_000).step_by(4) {
                tree.put(key, key)?;
            }
            Ok(())
        }));
    }
    let mut readers = Vec::new();
    for direction in 0..2 {
        let tree = Arc::clone(&tree);
        let barrier = Arc::clone(&barrier);
        readers.push(thread::spawn(move || -> Result<()> {
            barrier.wait();
            for _ in 0..10 {
                let keys: Vec<u64> = if direction == 0 {
                    tree.keys()?.collect::<Result<_>>()?
                } else {
                    tree.keys_rev()?.collect::<Result<_>>()?
                };
                let sorted = if direction == 0 {
                    keys.windows(2).all(|pair| pair[0] < pair[1])
                } else {
                    keys.windows(2).all(|pair| pair[0] > pair[1])
                };
                assert!(sorted, "cursor produced out-of-order keys");
                for even in (0..2_000u64).step_by(2) {
                    assert!(keys.binary_search_by(|candidate| {
                        if direction == 0 {
                            candidate.cmp(&even)
                        } else {
                            even.cmp(candidate)
                        }
                    })
                    .is_ok(), "pre-existing key {even} missing");
                }
                for key in (0..2_000u64).step_by(97) {
                    if key % 2 == 0 {
                        assert_eq!(tree.get(&key)?, Some(key));
                    }
                }
            }
            Ok(())
        }));
    }
    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("thread panicked")?;
    }

    assert_eq!(tree.len()?, 2_000);
    assert_eq!(tree.locks_held(), 0);
    assert!(tree.verify()?.success);
    Ok(())
}

#[test]
fn panicking_writer_releases_its_leaf_lock() -> Result<()> {
    let tree = shared_tree(4)?;
    for key in 1..=40u64 {
        tree.put(key, key)?;
    }
    let armed = Arc::new(AtomicBool::new(true));
    let trigger = Arc::clone(&armed);
    tree.add_listener(Arc::new(
        move |key: &u64, _old: Option<&u64>, new: Option<&u64>| {
            if new.is_none() && *key == 13 && trigger.swap(false, Ordering::SeqCst) {
                panic!("listener failed while the leaf was locked");
            }
        },
    ));

    let crashing = Arc::clone(&tree);
    let crashed = thread::spawn(move || crashing.remove(&13)).join();
    assert!(crashed.is_err(), "listener panic must unwind the writer");
    assert!(!armed.load(Ordering::SeqCst));
    assert_eq!(tree.locks_held(), 0);

    let (done_tx, done_rx) = mpsc::channel();
    let follower = Arc::clone(&tree);
    thread::spawn(move || {
        let outcome = follower
            .put(13, 1313)
            .and_then(|_| follower.put(12, 1212))
            .and_then(|_| follower.remove(&14));
        let _ = done_tx.send(outcome);
    });
    let outcome = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("writer on the same leaf stayed blocked");
    assert_eq!(outcome?, Some(14));

    assert_eq!(tree.get(&13)?, Some(1313));
    assert_eq!(tree.get(&12)?, Some(1212));
    assert_eq!(tree.get(&14)?, None);
    assert_eq!(tree.locks_held(), 0);
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    Ok(())
}

#[test]
fn lookups_race_removals_of_out_of_line_values() -> Result<()> {
    const KEYS: u64 = 64;
    const ROUNDS: usize = 200;
    let store = Arc::new(MemoryStore::new());
    let options = BLinkOptions::default()
        .with_max_node_size(8)
        .with_values_outside_nodes(true);
    let tree: Arc<BLinkTree<u64, u64>> = Arc::new(BLinkTree::create(store, options)?);
    for key in 0..KEYS {
        tree.put(key, key * 10)?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for reader_id in 0..4u64 {
        let tree = Arc::clone(&tree);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || -> Result<usize> {
            let mut lookups = 0usize;
            while !stop.load(Ordering::SeqCst) {
                for key in 0..KEYS {
                    if let Some(value) = tree.get(&key)? {
                        assert_eq!(value, key * 10);
                    }
                    lookups += 1;
                }
                if reader_id % 2 == 0 {
                    for entry in tree.iter()? {
                        let (key, value) = entry?;
                        assert_eq!(value, key * 10);
                    }
                } else if let Some((key, value)) = tree.ceiling_entry(&(KEYS / 2))? {
                    assert!(key >= KEYS / 2);
                    assert_eq!(value, key * 10);
                }
            }
            Ok(lookups)
        }));
    }

    for _ in 0..ROUNDS {
        for key in 0..KEYS {
            assert_eq!(tree.remove(&key)?, Some(key * 10));
            assert_eq!(tree.put(key, key * 10)?, None);
        }
    }
    stop.store(true, Ordering::SeqCst);
    for reader in readers {
        let lookups = reader.join().expect("reader panicked")?;
        assert!(lookups > 0);
    }

    assert_eq!(tree.len()?, KEYS as usize);
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    Ok(())
}

//! Trees persisted through the append-only file store.
#![allow(missing_docs)]

use std::ops::Bound;
use std::sync::Arc;

use blinktree::{BLinkError, BLinkOptions, BLinkTree, FileStore, RecId, Result};
use tempfile::TempDir;

fn options() -> BLinkOptions {
    BLinkOptions::default().with_max_node_size(5)
}

fn populate(path: &std::path::Path, keys: impl Iterator<Item = u64>) -> Result<(RecId, Vec<RecId>)> {
    let store = Arc::new(FileStore::open(path)?);
    let tree: BLinkTree<u64, String> = BLinkTree::create(store, options())?;
    for key in keys {
        tree.put(key, format!("value-{key}"))?;
    }
    tree.commit()?;
    let root_pointer = tree.root_recid_recid();
    let edges = tree.left_edges();
    tree.close()?;
    Ok((root_pointer, edges))
}

#[test]
fn reopened_tree_serves_committed_entries() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tree.blk");
    let (root_pointer, edges) = populate(&path, (0..500u64).map(|i| (i * 37) % 500))?;

    let store = Arc::new(FileStore::open(&path)?);
    let tree: BLinkTree<u64, String> = BLinkTree::open(store, root_pointer, options())?;
    assert_eq!(tree.left_edges(), edges);
    assert_eq!(tree.len()?, 500);
    for key in 0..500u64 {
        assert_eq!(tree.get(&key)?, Some(format!("value-{key}")));
    }
    let tail: Vec<u64> = tree
        .range_rev(Bound::Excluded(490), Bound::Unbounded)?
        .map(|entry| entry.map(|(key, _)| key))
        .collect::<Result<_>>()?;
    assert_eq!(tail, (491..500).rev().collect::<Vec<_>>());
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    Ok(())
}

#[test]
fn changes_after_reopen_persist_again() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tree.blk");
    let (root_pointer, _) = populate(&path, 0..100u64)?;

    {
        let store = Arc::new(FileStore::open(&path)?);
        let tree: BLinkTree<u64, String> = BLinkTree::open(store, root_pointer, options())?;
        for key in (0..100u64).step_by(3) {
            tree.remove(&key)?;
        }
        for key in 100..200u64 {
            tree.put(key, format!("value-{key}"))?;
        }
        tree.close()?;
    }

    let store = Arc::new(FileStore::open(&path)?);
    let tree: BLinkTree<u64, String> = BLinkTree::open(store, root_pointer, options())?;
    let keys: Vec<u64> = tree.keys()?.collect::<Result<_>>()?;
    let expected: Vec<u64> = (0..200u64).filter(|key| *key >= 100 || key % 3 != 0).collect();
    assert_eq!(keys, expected);
    assert!(tree.verify()?.success);
    Ok(())
}

#[test]
fn closed_file_store_fails_fast() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(FileStore::open(dir.path().join("tree.blk"))?);
    let tree: BLinkTree<u64, u64> = BLinkTree::create(store, options())?;
    tree.put(1, 1)?;
    tree.close()?;
    assert!(matches!(tree.get(&1), Err(BLinkError::Closed)));
    assert!(matches!(tree.put(2, 2), Err(BLinkError::Closed)));
    Ok(())
}

#[test]
fn unknown_root_pointer_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("tree.blk");
    populate(&path, 0..10u64)?;
    let store = Arc::new(FileStore::open(&path)?);
    let result: Result<BLinkTree<u64, String>> = BLinkTree::open(store, RecId(9_999), options());
    assert!(result.is_err_and(|err| err.is_corruption()));
    Ok(())
}

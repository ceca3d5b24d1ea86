//! End-to-end scenarios over an in-memory store.
#![allow(missing_docs)]

use std::ops::Bound;
use std::sync::Arc;

use blinktree::{BLinkOptions, BLinkTree, MemoryStore, Result};

fn small_tree() -> Result<BLinkTree<u64, u64>> {
    let store = Arc::new(MemoryStore::new());
    BLinkTree::create(store, BLinkOptions::default().with_max_node_size(4))
}

fn collect_keys<I>(entries: I) -> Result<Vec<u64>>
where
    I: Iterator<Item = Result<(u64, u64)>>,
{
    entries.map(|entry| entry.map(|(key, _)| key)).collect()
}

#[test]
fn ascending_inserts_build_a_balanced_tree() -> Result<()> {
    let tree = small_tree()?;
    for key in 1..=1000u64 {
        assert_eq!(tree.put(key, key * 3)?, None);
    }

    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.entries, 1000);
    assert_eq!(tree.first_key()?, Some(1));
    assert_eq!(tree.last_key()?, Some(1000));
    assert_eq!(tree.len()?, 1000);

    // With four keys per node, every leaf left behind by an ascending split
    // keeps two entries and every directory at least two children.
    let leaves = report.counts.leaves;
    assert!((334..=501).contains(&leaves), "{leaves} leaves for 1000 keys");
    let height = tree.height();
    let bound = 1 + (leaves as f64).log2().ceil() as usize;
    assert!(height >= 2);
    assert!(height <= bound, "height {height} for {leaves} leaves");
    for key in 1..=1000u64 {
        assert_eq!(tree.get(&key)?, Some(key * 3));
    }
    assert_eq!(tree.get(&0)?, None);
    assert_eq!(tree.get(&1001)?, None);
    Ok(())
}

#[test]
fn descending_inserts_keep_left_edges_current() -> Result<()> {
    let tree = small_tree()?;
    for key in (1..=1000u64).rev() {
        tree.put(key, key)?;
    }
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(tree.left_edges().len(), tree.height());
    assert_eq!(report.counts.height as usize, tree.height());
    assert_eq!(collect_keys(tree.iter()?)?, (1..=1000).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn removing_even_keys_leaves_the_odd_ones() -> Result<()> {
    let tree = small_tree()?;
    for key in 1..=100u64 {
        tree.put(key, key)?;
    }
    for key in (2..=100u64).step_by(2) {
        assert_eq!(tree.remove(&key)?, Some(key));
    }
    let odd: Vec<u64> = (1..=100).step_by(2).collect();
    assert_eq!(collect_keys(tree.iter()?)?, odd);
    let mut reversed = odd.clone();
    reversed.reverse();
    assert_eq!(collect_keys(tree.iter_rev()?)?, reversed);

    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.entries, 50);
    Ok(())
}

#[test]
fn bounded_iteration_respects_inclusivity() -> Result<()> {
    let tree = small_tree()?;
    for key in [1u64, 5, 7, 10, 12] {
        tree.put(key, key * 100)?;
    }
    let entries: Vec<(u64, u64)> = tree
        .range(Bound::Included(5), Bound::Excluded(10))?
        .collect::<Result<_>>()?;
    assert_eq!(entries, vec![(5, 500), (7, 700)]);

    let entries: Vec<(u64, u64)> = tree
        .range_rev(Bound::Included(5), Bound::Excluded(10))?
        .collect::<Result<_>>()?;
    assert_eq!(entries, vec![(7, 700), (5, 500)]);
    Ok(())
}

#[test]
fn repeated_removal_changes_nothing() -> Result<()> {
    let tree = small_tree()?;
    for key in 0..50u64 {
        tree.put(key, key)?;
    }
    assert_eq!(tree.remove(&25)?, Some(25));
    let before = tree.structure_string()?;
    assert_eq!(tree.remove(&25)?, None);
    assert_eq!(tree.structure_string()?, before);
    assert_eq!(tree.len()?, 49);
    Ok(())
}

#[test]
fn descending_order_mirrors_ascending_order() -> Result<()> {
    let tree = small_tree()?;
    let mut key = 7u64;
    for _ in 0..500 {
        key = (key * 7919 + 13) % 10_007;
        tree.put(key, key + 1)?;
    }
    let mut ascending: Vec<(u64, u64)> = tree.iter()?.collect::<Result<_>>()?;
    let descending: Vec<(u64, u64)> = tree.iter_rev()?.collect::<Result<_>>()?;
    ascending.reverse();
    assert_eq!(ascending, descending);

    let keys: Vec<u64> = tree.keys_rev()?.collect::<Result<_>>()?;
    let values: Vec<u64> = tree.values_rev()?.collect::<Result<_>>()?;
    assert_eq!(keys.len(), values.len());
    assert!(keys.iter().zip(&values).all(|(k, v)| k + 1 == *v));
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let options = BLinkOptions::from_toml_str(
        "max_node_size = 6\nvalues_outside_nodes = true\n",
    )?;
    assert_eq!(options.max_node_size, 6);
    assert!(options.values_outside_nodes);

    let store = Arc::new(MemoryStore::new());
    let tree: BLinkTree<u64, String> = BLinkTree::create(store, options)?;
    for key in 0..40u64 {
        tree.put(key, format!("v{key}"))?;
    }
    assert_eq!(tree.get(&39)?, Some("v39".to_string()));
    assert!(tree.verify()?.success);
    Ok(())
}

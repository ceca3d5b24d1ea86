//! Random operation sequences checked against `std::collections::BTreeMap`.
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use blinktree::{BLinkOptions, BLinkTree, MemoryStore};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    Put { key: u16, value: u32 },
    PutIfAbsent { key: u16, value: u32 },
    Remove { key: u16 },
    RemoveIf { key: u16, value: u32 },
    ReplaceIf { key: u16, expected: u32, value: u32 },
    Get { key: u16 },
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => (0u16..300, any::<u32>()).prop_map(|(key, value)| Operation::Put { key, value }),
        1 => (0u16..300, any::<u32>()).prop_map(|(key, value)| Operation::PutIfAbsent { key, value }),
        2 => (0u16..300).prop_map(|key| Operation::Remove { key }),
        1 => (0u16..300, 0u32..4).prop_map(|(key, value)| Operation::RemoveIf { key, value }),
        1 => (0u16..300, 0u32..4, any::<u32>())
            .prop_map(|(key, expected, value)| Operation::ReplaceIf { key, expected, value }),
        1 => (0u16..300).prop_map(|key| Operation::Get { key }),
    ]
}

fn arb_bound() -> impl Strategy<Value = Bound<u64>> {
    prop_oneof![
        Just(Bound::Unbounded),
        (0u64..300).prop_map(Bound::Included),
        (0u64..300).prop_map(Bound::Excluded),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tree_matches_btreemap(
        ops in prop::collection::vec(arb_operation(), 1..400),
        max_node_size in 4usize..9,
    ) {
        let store = Arc::new(MemoryStore::new());
        let tree: BLinkTree<u64, u64> = BLinkTree::create(
            store,
            BLinkOptions::default().with_max_node_size(max_node_size),
        ).unwrap();
        let mut model: BTreeMap<u64, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Operation::Put { key, value } => {
                    let (key, value) = (u64::from(key), u64::from(value));
                    prop_assert_eq!(tree.put(key, value).unwrap(), model.insert(key, value));
                }
                Operation::PutIfAbsent { key, value } => {
                    let (key, value) = (u64::from(key), u64::from(value));
                    let expected = model.get(&key).copied();
                    if expected.is_none() {
                        model.insert(key, value);
                    }
                    prop_assert_eq!(tree.put_if_absent(key, value).unwrap(), expected);
                }
                Operation::Remove { key } => {
                    let key = u64::from(key);
                    prop_assert_eq!(tree.remove(&key).unwrap(), model.remove(&key));
                }
                Operation::RemoveIf { key, value } => {
                    let (key, value) = (u64::from(key), u64::from(value));
                    let matches = model.get(&key) == Some(&value);
                    if matches {
                        model.remove(&key);
                    }
                    prop_assert_eq!(tree.remove_if(&key, &value).unwrap(), matches);
                }
                Operation::ReplaceIf { key, expected, value } => {
                    let (key, expected, value) =
                        (u64::from(key), u64::from(expected), u64::from(value));
                    let matches = model.get(&key) == Some(&expected);
                    if matches {
                        model.insert(key, value);
                    }
                    prop_assert_eq!(tree.replace_if(&key, &expected, &value).unwrap(), matches);
                }
                Operation::Get { key } => {
                    let key = u64::from(key);
                    prop_assert_eq!(tree.get(&key).unwrap(), model.get(&key).copied());
                }
            }
        }

        let entries: Vec<(u64, u64)> = tree.iter().unwrap().map(|e| e.unwrap()).collect();
        let expected: Vec<(u64, u64)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(&entries, &expected);
        prop_assert_eq!(tree.len().unwrap(), model.len());
        let report = tree.verify().unwrap();
        prop_assert!(report.success, "{:?}", report.findings);
    }

    #[test]
    fn prop_ranges_match_btreemap(
        keys in prop::collection::btree_set(0u64..300, 0..200),
        lo in arb_bound(),
        hi in arb_bound(),
    ) {
        let store = Arc::new(MemoryStore::new());
        let tree: BLinkTree<u64, u64> = BLinkTree::create(
            store,
            BLinkOptions::default().with_max_node_size(4),
        ).unwrap();
        for key in &keys {
            tree.put(*key, key * 10).unwrap();
        }

        let empty = match (&lo, &hi) {
            (Bound::Included(a), Bound::Included(b)) => a > b,
            (Bound::Included(a), Bound::Excluded(b))
            | (Bound::Excluded(a), Bound::Included(b))
            | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
            _ => false,
        };
        let expected: Vec<u64> = if empty {
            Vec::new()
        } else {
            keys.range((lo, hi)).copied().collect()
        };

        let forward: Vec<u64> = tree
            .range(lo, hi)
            .unwrap()
            .map(|e| e.unwrap().0)
            .collect();
        prop_assert_eq!(&forward, &expected);

        let mut backward: Vec<u64> = tree
            .range_rev(lo, hi)
            .unwrap()
            .map(|e| e.unwrap().0)
            .collect();
        backward.reverse();
        prop_assert_eq!(&backward, &expected);

        if let Bound::Included(target) | Bound::Excluded(target) = lo {
            prop_assert_eq!(tree.floor_key(&target).unwrap(), keys.range(..=target).next_back().copied());
            prop_assert_eq!(tree.lower_key(&target).unwrap(), keys.range(..target).next_back().copied());
            prop_assert_eq!(tree.ceiling_key(&target).unwrap(), keys.range(target..).next().copied());
            prop_assert_eq!(
                tree.higher_key(&target).unwrap(),
                keys.range((Bound::Excluded(target), Bound::Unbounded)).next().copied()
            );
        }
    }
}

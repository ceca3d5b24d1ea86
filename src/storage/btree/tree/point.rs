use smallvec::SmallVec;
use tracing::trace;

use super::BLinkTree;
use crate::primitives::concurrency::NodeLockGuard;
use crate::storage::btree::codecs::{KeyCodec, ValCodec};
use crate::storage::btree::format::encode_value;
use crate::storage::btree::node::{LeafPosition, Node, Route, ValueSlot};
use crate::types::{BLinkError, RecId, Result};

pub(super) type Ancestors = SmallVec<[RecId; 8]>;

impl<K: KeyCodec, V: ValCodec> BLinkTree<K, V> {
    /// Looks up `key` without taking any lock.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let (mut current, mut node) = self.find_leaf(key)?;
        loop {
            match node.locate_in_leaf(key) {
                LeafPosition::Found(index) => return self.read_entry_value(&node, index, key),
                LeafPosition::HighKey | LeafPosition::Beyond => {
                    current = node.link_or_corrupt()?;
                    self.stats.inc_link_follows();
                    trace!(
                        target: "blinktree::search",
                        node = current.0,
                        "high key reached, following link"
                    );
                    node = self.read_node(current)?;
                }
                LeafPosition::Absent(_) | LeafPosition::LowBoundary => return Ok(None),
            }
        }
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.guarded(|| self.put_inner(key, value, false))
    }

    /// Inserts `key` only if it is absent. Returns the value already present,
    /// if any, in which case nothing changes.
    pub fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        self.guarded(|| self.put_inner(key, value, true))
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        self.guarded(|| self.remove_or_replace(key, None, None))
    }

    /// Removes `key` only if it currently maps to `expected`.
    pub fn remove_if(&self, key: &K, expected: &V) -> Result<bool> {
        self.guarded(|| self.remove_or_replace(key, Some(expected), None))
            .map(|old| old.is_some())
    }

    /// Replaces the value of an existing `key`, returning the old value.
    /// Absent keys are left absent.
    pub fn replace(&self, key: &K, value: &V) -> Result<Option<V>> {
        self.guarded(|| self.remove_or_replace(key, None, Some(value)))
    }

    /// Replaces the value of `key` only if it currently maps to `expected`.
    pub fn replace_if(&self, key: &K, expected: &V, value: &V) -> Result<bool> {
        self.guarded(|| self.remove_or_replace(key, Some(expected), Some(value)))
            .map(|old| old.is_some())
    }

    /// Lock-free descent to the leaf owning `key`, following right links at
    /// the leaf level until the leaf's range holds the key.
    pub(crate) fn find_leaf(&self, key: &K) -> Result<(RecId, Node<K, V>)> {
        let mut ancestors = Ancestors::new();
        self.descend(key, &mut ancestors)
    }

    /// Descends from the root to the leaf for `key`, pushing every directory
    /// the path went down from. Directories left through a right link are
    /// not pushed.
    pub(super) fn descend(&self, key: &K, ancestors: &mut Ancestors) -> Result<(RecId, Node<K, V>)> {
        let mut current = self.root_recid()?;
        loop {
            let node = self.read_node(current)?;
            if node.is_leaf() {
                if node.covers(key) {
                    self.stats.inc_leaf_searches();
                    trace!(
                        target: "blinktree::search",
                        node = current.0,
                        kind = "leaf",
                        "located target leaf"
                    );
                    return Ok((current, node));
                }
                current = node.link_or_corrupt()?;
                self.stats.inc_link_follows();
                continue;
            }
            self.stats.inc_directory_searches();
            match node.route(key)? {
                Route::Child(child) => {
                    trace!(
                        target: "blinktree::search",
                        node = current.0,
                        child = child.0,
                        "descending through directory"
                    );
                    ancestors.push(current);
                    current = child;
                }
                Route::Link(next) => {
                    self.stats.inc_link_follows();
                    trace!(
                        target: "blinktree::search",
                        node = current.0,
                        link = next.0,
                        "key beyond high key, following link"
                    );
                    current = next;
                }
            }
        }
    }

    /// Locks `current` and moves right, one lock at a time, until the locked
    /// node's range holds `key`.
    pub(super) fn lock_covering(
        &self,
        mut current: RecId,
        key: &K,
    ) -> Result<(RecId, NodeLockGuard<'_>, Node<K, V>)> {
        let mut guard = self.locks.lock(current);
        let mut node = self.read_node(current)?;
        while !node.covers(key) {
            let next = node.link_or_corrupt()?;
            drop(guard);
            self.stats.inc_link_follows();
            trace!(
                target: "blinktree::search",
                node = current.0,
                link = next.0,
                "locked node split underneath us, moving right"
            );
            current = next;
            guard = self.locks.lock(current);
            node = self.read_node(current)?;
        }
        Ok((current, guard, node))
    }

    fn put_inner(&self, key: K, value: V, only_if_absent: bool) -> Result<Option<V>> {
        let mut ancestors = Ancestors::new();
        let (leaf, _) = self.descend(&key, &mut ancestors)?;
        let (current, guard, node) = self.lock_covering(leaf, &key)?;
        if !node.is_leaf() {
            return Err(BLinkError::corruption(format!(
                "node {current} changed kind while locked"
            )));
        }

        let pos = match node.locate_in_leaf(&key) {
            LeafPosition::Found(index) => {
                let slot = node
                    .values()
                    .get(index)
                    .ok_or_else(|| BLinkError::corruption("leaf value index out of range"))?;
                let old = self.load_value(slot)?;
                if only_if_absent {
                    return Ok(Some(old));
                }
                match slot {
                    ValueSlot::Record(recid) => self.store.update(*recid, &encode_value(&value))?,
                    ValueSlot::Inline(_) => {
                        let next = node.with_value_replaced(index, ValueSlot::Inline(value.clone()))?;
                        self.write_node(current, &next)?;
                    }
                }
                self.notify(&key, Some(&old), Some(&value));
                return Ok(Some(old));
            }
            LeafPosition::HighKey => {
                let slot = self.make_slot(&value)?;
                self.discard_slot_on_error(&slot, || {
                    let next = node.with_high_key_materialized(slot.clone())?;
                    self.write_node(current, &next)
                })?;
                self.notify(&key, None, Some(&value));
                return Ok(None);
            }
            LeafPosition::Absent(pos) => pos,
            LeafPosition::Beyond | LeafPosition::LowBoundary => {
                return Err(BLinkError::corruption(format!(
                    "leaf {current} does not own the key it was locked for"
                )))
            }
        };

        // The value record belongs to the tree once the leaf holding it is
        // written; only failures before that point discard it.
        let slot = self.make_slot(&value)?;
        let split = self.discard_slot_on_error(&slot, || {
            let inserted = node.with_inserted(pos, key.clone(), slot.clone())?;
            if inserted.keys.len() < self.options.max_node_size {
                self.write_node(current, &inserted)?;
                return Ok(None);
            }
            let (separator, right) = self.split_node(current, &inserted, 0)?;
            Ok(Some((separator, right, inserted.is_root())))
        })?;
        self.notify(&key, None, Some(&value));
        drop(guard);
        if let Some((separator, right, was_root)) = split {
            self.propagate_split(current, separator, right, was_root, ancestors)?;
        }
        Ok(None)
    }

    /// Shared path of remove, compare-and-remove, replace and
    /// compare-and-replace. Returns the previous value when the change was
    /// applied.
    fn remove_or_replace(
        &self,
        key: &K,
        expected: Option<&V>,
        replacement: Option<&V>,
    ) -> Result<Option<V>> {
        let (leaf, _) = self.find_leaf(key)?;
        let (current, guard, node) = self.lock_covering(leaf, key)?;
        let index = match node.locate_in_leaf(key) {
            LeafPosition::Found(index) => index,
            LeafPosition::HighKey | LeafPosition::Absent(_) => return Ok(None),
            LeafPosition::Beyond | LeafPosition::LowBoundary => {
                return Err(BLinkError::corruption(format!(
                    "leaf {current} does not own the key it was locked for"
                )))
            }
        };
        let slot = node
            .values()
            .get(index)
            .cloned()
            .ok_or_else(|| BLinkError::corruption("leaf value index out of range"))?;
        let old = self.load_value(&slot)?;
        if expected.is_some_and(|expected| !V::same_value(expected, &old)) {
            return Ok(None);
        }

        match (replacement, slot) {
            (Some(value), ValueSlot::Record(recid)) => {
                self.store.update(recid, &encode_value(value))?;
                self.notify(key, Some(&old), Some(value));
            }
            (Some(value), ValueSlot::Inline(_)) => {
                let next = node.with_value_replaced(index, ValueSlot::Inline(value.clone()))?;
                self.write_node(current, &next)?;
                self.notify(key, Some(&old), Some(value));
            }
            (None, slot) => {
                let next = node.with_removed(index)?;
                self.write_node(current, &next)?;
                if let ValueSlot::Record(recid) = slot {
                    self.store.delete(recid)?;
                }
                self.notify(key, Some(&old), None);
            }
        }
        drop(guard);
        Ok(Some(old))
    }
}

//! The B-link tree handle: bootstrap, node I/O, and shared helpers used by
//! the point, split and navigation paths.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::codecs::{KeyCodec, ValCodec};
use super::format::{decode_node, decode_root_pointer, encode_node, encode_root_pointer, encode_value};
use super::listener::ModificationListener;
use super::node::{LeafPosition, Node, ValueSlot};
use super::options::BLinkOptions;
use super::stats::{BLinkStats, BLinkStatsSnapshot};
use crate::primitives::concurrency::NodeLocks;
use crate::primitives::store::RecordStore;
use crate::types::{BLinkError, RecId, Result};

mod navigation;
mod point;
mod split;

/// Concurrent B-link tree over a [`RecordStore`].
///
/// Readers never lock; writers lock one node at a time through the tree's
/// lock table. Every node lives in its own record and is replaced whole on
/// each change.
pub struct BLinkTree<K: KeyCodec, V: ValCodec> {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) root_recid_recid: RecId,
    pub(crate) options: BLinkOptions,
    pub(crate) locks: NodeLocks,
    /// Serializes root replacement and left-edge appends.
    pub(crate) root_lock: Mutex<()>,
    /// Leftmost node per level, index 0 is the leaf level.
    pub(crate) left_edges: RwLock<Vec<RecId>>,
    pub(crate) stats: Arc<BLinkStats>,
    listeners: RwLock<Vec<Arc<dyn ModificationListener<K, V>>>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: KeyCodec, V: ValCodec> BLinkTree<K, V> {
    /// Bootstraps an empty tree: one leaf that is both edges, plus the
    /// root-pointer record that names it.
    pub fn create(store: Arc<dyn RecordStore>, options: BLinkOptions) -> Result<Self> {
        options.validate()?;
        let root = Node::<K, V>::empty_root();
        let root_recid = store.put(&encode_node(&root))?;
        let root_recid_recid = store.put(&encode_root_pointer(root_recid))?;
        debug!(
            target: "blinktree::store",
            root = root_recid.0,
            root_pointer = root_recid_recid.0,
            "created empty tree"
        );
        let tree = Self::assemble(store, root_recid_recid, options);
        tree.left_edges.write().push(root_recid);
        Ok(tree)
    }

    /// Opens a tree previously created over `store` and rebuilds the
    /// left-edge cache from the left spine.
    pub fn open(
        store: Arc<dyn RecordStore>,
        root_recid_recid: RecId,
        options: BLinkOptions,
    ) -> Result<Self> {
        options.validate()?;
        let tree = Self::assemble(store, root_recid_recid, options);
        let spine = tree.left_spine()?;
        debug!(
            target: "blinktree::store",
            root_pointer = root_recid_recid.0,
            height = spine.len(),
            "opened tree"
        );
        *tree.left_edges.write() = spine;
        Ok(tree)
    }

    fn assemble(store: Arc<dyn RecordStore>, root_recid_recid: RecId, options: BLinkOptions) -> Self {
        let locks = NodeLocks::new(options.lock_backoff());
        Self {
            store,
            root_recid_recid,
            options,
            locks,
            root_lock: Mutex::new(()),
            left_edges: RwLock::new(Vec::new()),
            stats: Arc::new(BLinkStats::default()),
            listeners: RwLock::new(Vec::new()),
            _marker: PhantomData,
        }
    }

    /// Recid of the record holding the root pointer; pass it to
    /// [`BLinkTree::open`] to reopen the tree.
    pub fn root_recid_recid(&self) -> RecId {
        self.root_recid_recid
    }

    /// Recid of the current root node.
    pub fn root_recid(&self) -> Result<RecId> {
        let bytes = self.store.get(self.root_recid_recid)?.ok_or_else(|| {
            BLinkError::corruption(format!(
                "root pointer record {} is missing",
                self.root_recid_recid
            ))
        })?;
        decode_root_pointer(&bytes)
    }

    /// Options the tree was opened with.
    pub fn options(&self) -> &BLinkOptions {
        &self.options
    }

    /// Number of levels, leaves included.
    pub fn height(&self) -> usize {
        self.left_edges.read().len()
    }

    /// Snapshot of the left-edge cache, leaf level first.
    pub fn left_edges(&self) -> Vec<RecId> {
        self.left_edges.read().clone()
    }

    /// Number of node locks currently held by any thread.
    pub fn locks_held(&self) -> usize {
        self.locks.len()
    }

    /// Access the live statistics counters for this tree.
    pub fn stats(&self) -> Arc<BLinkStats> {
        Arc::clone(&self.stats)
    }

    /// Snapshot the current statistics counters.
    pub fn stats_snapshot(&self) -> BLinkStatsSnapshot {
        self.stats.set_lock_waits(self.locks.contended());
        self.stats.snapshot()
    }

    /// Emit the current statistics to the tracing sink.
    pub fn emit_stats(&self) {
        self.stats.set_lock_waits(self.locks.contended());
        self.stats.emit_tracing();
    }

    /// Registers a listener notified of every insert, update and removal.
    pub fn add_listener(&self, listener: Arc<dyn ModificationListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    /// Makes every completed change durable.
    pub fn commit(&self) -> Result<()> {
        self.store.commit()
    }

    /// Commits and closes the underlying store. Every later call fails with
    /// [`BLinkError::Closed`].
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    pub(crate) fn read_node(&self, recid: RecId) -> Result<Node<K, V>> {
        let bytes = self
            .store
            .get(recid)?
            .ok_or_else(|| BLinkError::corruption(format!("node {recid} is missing")))?;
        decode_node(&bytes)
    }

    pub(crate) fn write_node(&self, recid: RecId, node: &Node<K, V>) -> Result<()> {
        #[cfg(feature = "paranoid")]
        node.check_invariants()?;
        self.store.update(recid, &encode_node(node))
    }

    pub(crate) fn put_node(&self, node: &Node<K, V>) -> Result<RecId> {
        #[cfg(feature = "paranoid")]
        node.check_invariants()?;
        self.store.put(&encode_node(node))
    }

    pub(crate) fn load_value(&self, slot: &ValueSlot<V>) -> Result<V> {
        match slot {
            ValueSlot::Inline(value) => Ok(value.clone()),
            ValueSlot::Record(recid) => {
                let bytes = self.store.get(*recid)?.ok_or_else(|| {
                    BLinkError::corruption(format!("value record {recid} is missing"))
                })?;
                V::decode_val(&bytes)
            }
        }
    }

    /// Loads the value at `value_index` of a leaf image read without locks.
    ///
    /// Returns `Ok(None)` when a removal deleted the value record after the
    /// image was read. A record that is missing while the live leaf for `key`
    /// still points at it is corruption.
    pub(crate) fn read_entry_value(
        &self,
        node: &Node<K, V>,
        value_index: usize,
        key: &K,
    ) -> Result<Option<V>> {
        let slot = node
            .values()
            .get(value_index)
            .ok_or_else(|| BLinkError::corruption("leaf value index out of range"))?;
        let recid = match slot {
            ValueSlot::Inline(value) => return Ok(Some(value.clone())),
            ValueSlot::Record(recid) => *recid,
        };
        if let Some(bytes) = self.store.get(recid)? {
            return V::decode_val(&bytes).map(Some);
        }
        if self.live_value_record(key)? == Some(recid) {
            return Err(BLinkError::corruption(format!(
                "value record {recid} is missing"
            )));
        }
        trace!(
            target: "blinktree::search",
            value = recid.0,
            "value record removed after the leaf was read"
        );
        Ok(None)
    }

    /// Value record the current leaf image for `key` points at.
    fn live_value_record(&self, key: &K) -> Result<Option<RecId>> {
        let (_, mut node) = self.find_leaf(key)?;
        loop {
            match node.locate_in_leaf(key) {
                LeafPosition::Found(index) => {
                    return Ok(match node.values().get(index) {
                        Some(ValueSlot::Record(recid)) => Some(*recid),
                        _ => None,
                    })
                }
                LeafPosition::HighKey | LeafPosition::Beyond => {
                    node = self.read_node(node.link_or_corrupt()?)?;
                }
                LeafPosition::Absent(_) | LeafPosition::LowBoundary => return Ok(None),
            }
        }
    }

    fn make_slot(&self, value: &V) -> Result<ValueSlot<V>> {
        if self.options.values_outside_nodes {
            Ok(ValueSlot::Record(self.store.put(&encode_value(value))?))
        } else {
            Ok(ValueSlot::Inline(value.clone()))
        }
    }

    /// Runs the steps that publish a freshly allocated value slot. If they
    /// fail, the slot's value record is deleted again.
    fn discard_slot_on_error<T>(
        &self,
        slot: &ValueSlot<V>,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let result = op();
        if let (Err(_), ValueSlot::Record(recid)) = (&result, slot) {
            if let Err(err) = self.store.delete(*recid) {
                warn!(
                    target: "blinktree::store",
                    value = recid.0,
                    %err,
                    "failed to delete unpublished value record"
                );
            }
        }
        result
    }

    fn notify(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener.on_modification(key, old, new);
        }
    }

    /// Runs a mutating operation and makes sure no node lock outlives it.
    fn guarded<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = op();
        if result.is_err() {
            self.locks.release_all_for_current_thread();
        }
        #[cfg(feature = "paranoid")]
        assert_eq!(
            self.locks.held_by_current_thread(),
            0,
            "tree operation returned while holding node locks"
        );
        result
    }

    /// Leftmost node at `level`, waiting for a concurrent root split to
    /// publish it if the level does not exist yet.
    pub(crate) fn left_edge(&self, level: usize) -> Result<RecId> {
        loop {
            if let Some(recid) = self.left_edges.read().get(level).copied() {
                return Ok(recid);
            }
            if self.store.is_closed() {
                return Err(BLinkError::Closed);
            }
            self.stats.inc_left_edge_waits();
            trace!(target: "blinktree::split", level, "waiting for left-edge cache");
            thread::sleep(self.options.left_edge_wait());
        }
    }

    /// Leftmost leaf, from the cache when populated.
    pub(crate) fn leftmost_leaf(&self) -> Result<RecId> {
        if let Some(recid) = self.left_edges.read().first().copied() {
            return Ok(recid);
        }
        self.left_spine()?
            .first()
            .copied()
            .ok_or_else(|| BLinkError::corruption("tree has no levels"))
    }

    /// Recomputes the leftmost node per level by walking first children from
    /// the root. Leaf level first.
    pub(crate) fn left_spine(&self) -> Result<Vec<RecId>> {
        let mut spine = Vec::new();
        let mut current = self.root_recid()?;
        loop {
            let node = self.read_node(current)?;
            if !node.is_left_edge() {
                return Err(BLinkError::corruption(format!(
                    "node {current} on the left spine lacks the left-edge flag"
                )));
            }
            spine.push(current);
            if node.is_leaf() {
                break;
            }
            current = node
                .children()
                .first()
                .copied()
                .ok_or_else(|| BLinkError::corruption("directory without children"))?;
        }
        spine.reverse();
        Ok(spine)
    }
}

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;

/// Snapshot of B-link tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BLinkStatsSnapshot {
    /// Number of leaf nodes searched
    pub leaf_searches: u64,
    /// Number of directory nodes searched
    pub directory_searches: u64,
    /// Number of right links followed after a stale observation
    pub link_follows: u64,
    /// Number of leaf splits performed
    pub leaf_splits: u64,
    /// Number of directory splits performed
    pub directory_splits: u64,
    /// Number of times the tree grew a level
    pub root_splits: u64,
    /// Number of node lock acquisitions that had to wait
    pub lock_waits: u64,
    /// Number of pauses spent waiting for the left-edge cache
    pub left_edge_waits: u64,
}

/// Thread-safe statistics tracking for B-link tree operations.
#[derive(Default)]
pub struct BLinkStats {
    leaf_searches: AtomicU64,
    directory_searches: AtomicU64,
    link_follows: AtomicU64,
    leaf_splits: AtomicU64,
    directory_splits: AtomicU64,
    root_splits: AtomicU64,
    lock_waits: AtomicU64,
    left_edge_waits: AtomicU64,
}

impl BLinkStats {
    /// Returns the current count of leaf searches.
    pub fn leaf_searches(&self) -> u64 {
        self.leaf_searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of directory searches.
    pub fn directory_searches(&self) -> u64 {
        self.directory_searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of right links followed.
    pub fn link_follows(&self) -> u64 {
        self.link_follows.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of leaf splits.
    pub fn leaf_splits(&self) -> u64 {
        self.leaf_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the current count of directory splits.
    pub fn directory_splits(&self) -> u64 {
        self.directory_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of root splits.
    pub fn root_splits(&self) -> u64 {
        self.root_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node lock acquisitions that waited.
    pub fn lock_waits(&self) -> u64 {
        self.lock_waits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of left-edge cache waits.
    pub fn left_edge_waits(&self) -> u64 {
        self.left_edge_waits.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_leaf_searches(&self) {
        self.leaf_searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_directory_searches(&self) {
        self.directory_searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_link_follows(&self) {
        self.link_follows.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_directory_splits(&self) {
        self.directory_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_splits(&self) {
        self.root_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn set_lock_waits(&self, waits: u64) {
        self.lock_waits.store(waits, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_left_edge_waits(&self) {
        self.left_edge_waits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BLinkStatsSnapshot {
        BLinkStatsSnapshot {
            leaf_searches: self.leaf_searches(),
            directory_searches: self.directory_searches(),
            link_follows: self.link_follows(),
            leaf_splits: self.leaf_splits(),
            directory_splits: self.directory_splits(),
            root_splits: self.root_splits(),
            lock_waits: self.lock_waits(),
            left_edge_waits: self.left_edge_waits(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "blinktree::stats",
            leaf_searches = snapshot.leaf_searches,
            directory_searches = snapshot.directory_searches,
            link_follows = snapshot.link_follows,
            leaf_splits = snapshot.leaf_splits,
            directory_splits = snapshot.directory_splits,
            root_splits = snapshot.root_splits,
            lock_waits = snapshot.lock_waits,
            left_edge_waits = snapshot.left_edge_waits,
            "blink tree stats snapshot"
        );
    }
}

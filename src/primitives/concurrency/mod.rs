#![forbid(unsafe_code)]

//! Per-node advisory locks keyed by recid.
//!
//! Locks are claimed by inserting the owning thread's id into a concurrent
//! map; a contended `lock` spins, then yields, then sleeps until the entry
//! disappears. Readers never touch this table.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::types::RecId;

/// Backoff schedule for a contended [`NodeLocks::lock`].
#[derive(Clone, Copy, Debug)]
pub struct LockBackoff {
    /// Busy-spin attempts before yielding.
    pub spins: u32,
    /// Sleep between attempts once spinning and yielding gave up.
    pub park: Duration,
}

impl Default for LockBackoff {
    fn default() -> Self {
        Self {
            spins: 64,
            park: Duration::from_micros(50),
        }
    }
}

impl LockBackoff {
    fn pause(&self, attempt: u32) {
        if attempt < self.spins {
            std::hint::spin_loop();
        } else if attempt < self.spins.saturating_mul(2) {
            thread::yield_now();
        } else {
            thread::sleep(self.park);
        }
    }
}

/// Lock table mapping a node recid to the thread that owns it.
pub struct NodeLocks {
    owners: DashMap<RecId, ThreadId>,
    backoff: LockBackoff,
    contended: AtomicU64,
}

/// Guard for a held node lock; releases it on drop.
///
/// The guard is tied to the locking thread and cannot be sent elsewhere.
#[must_use = "dropping the guard releases the node lock"]
pub struct NodeLockGuard<'a> {
    table: &'a NodeLocks,
    recid: RecId,
    _not_send: PhantomData<*const ()>,
}

impl NodeLockGuard<'_> {
    /// The locked node.
    pub fn recid(&self) -> RecId {
        self.recid
    }
}

impl Drop for NodeLockGuard<'_> {
    fn drop(&mut self) {
        self.table.unlock(self.recid);
    }
}

impl NodeLocks {
    /// Creates an empty lock table with the given backoff.
    pub fn new(backoff: LockBackoff) -> Self {
        Self {
            owners: DashMap::new(),
            backoff,
            contended: AtomicU64::new(0),
        }
    }

    /// Blocks until `recid` is locked by the current thread.
    pub fn lock(&self, recid: RecId) -> NodeLockGuard<'_> {
        let me = thread::current().id();
        let mut attempt = 0u32;
        loop {
            if self.claim(recid, me) {
                return self.guard(recid);
            }
            if attempt == 0 {
                self.contended.fetch_add(1, AtomicOrdering::Relaxed);
                trace!(target: "blinktree::locks", node = recid.0, "waiting for node lock");
            }
            self.backoff.pause(attempt);
            attempt = attempt.saturating_add(1);
        }
    }

    /// Locks `recid` if no thread holds it.
    pub fn try_lock(&self, recid: RecId) -> Option<NodeLockGuard<'_>> {
        let me = thread::current().id();
        self.claim(recid, me).then(|| self.guard(recid))
    }

    /// Releases a lock held by the current thread.
    ///
    /// Normally called through [`NodeLockGuard`]'s drop. Unlocking a node
    /// that the current thread does not own is a programming error.
    pub fn unlock(&self, recid: RecId) {
        let me = thread::current().id();
        let removed = self.owners.remove_if(&recid, |_, owner| *owner == me);
        debug_assert!(
            removed.is_some(),
            "node {recid} unlocked by a thread that does not own it"
        );
    }

    /// Releases every lock owned by the current thread and returns how many
    /// were released.
    pub fn release_all_for_current_thread(&self) -> usize {
        let me = thread::current().id();
        let mut released = 0usize;
        self.owners.retain(|_, owner| {
            if *owner == me {
                released += 1;
                false
            } else {
                true
            }
        });
        if released > 0 {
            warn!(
                target: "blinktree::locks",
                released,
                "force-released node locks left by the current thread"
            );
        }
        released
    }

    /// Number of locks the current thread holds.
    pub fn held_by_current_thread(&self) -> usize {
        let me = thread::current().id();
        self.owners.iter().filter(|entry| *entry.value() == me).count()
    }

    /// Returns true if any thread holds `recid`.
    pub fn is_locked(&self, recid: RecId) -> bool {
        self.owners.contains_key(&recid)
    }

    /// Total number of held locks.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no lock is held.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of `lock` calls that found the node already owned.
    pub fn contended(&self) -> u64 {
        self.contended.load(AtomicOrdering::Relaxed)
    }

    fn claim(&self, recid: RecId, me: ThreadId) -> bool {
        match self.owners.entry(recid) {
            Entry::Vacant(slot) => {
                slot.insert(me);
                true
            }
            Entry::Occupied(slot) => {
                debug_assert!(
                    *slot.get() != me,
                    "node {recid} locked twice by the same thread"
                );
                false
            }
        }
    }

    fn guard(&self, recid: RecId) -> NodeLockGuard<'_> {
        NodeLockGuard {
            table: self,
            recid,
            _not_send: PhantomData,
        }
    }
}

impl Default for NodeLocks {
    fn default() -> Self {
        Self::new(LockBackoff::default())
    }
}

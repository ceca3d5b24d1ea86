//! Ordered storage engines built on the record store.

/// B-link tree ordered map.
///
/// Concurrent ordered map with lock-free readers and per-node locking for
/// writers.
pub mod btree;

pub use btree::{BLinkOptions, BLinkTree};

#![forbid(unsafe_code)]

//! Recid-addressed record stores consumed by the tree engine.
//!
//! A store persists opaque byte records under numeric ids. The tree never
//! mutates a record in place: every node change is a whole-record
//! [`RecordStore::update`] under the node's existing id.

use bytes::Bytes;

use crate::types::{RecId, Result};

mod file;
mod memory;

pub use file::{FileStore, FileStoreStats};
pub use memory::MemoryStore;

/// Persistence substrate addressed by [`RecId`].
///
/// Implementations must be safe for concurrent use from many threads. Once
/// [`RecordStore::close`] returns, every other call fails with
/// [`crate::types::BLinkError::Closed`].
pub trait RecordStore: Send + Sync + 'static {
    /// Reserves an id for a record that is written later with `update`.
    /// Until then the id reads back as an empty record.
    fn preallocate(&self) -> Result<RecId>;
    /// Stores a new record and returns its id.
    fn put(&self, record: &[u8]) -> Result<RecId>;
    /// Replaces the record stored under `id`.
    fn update(&self, id: RecId, record: &[u8]) -> Result<()>;
    /// Fetches the record under `id`; unknown or deleted ids yield `None`.
    fn get(&self, id: RecId) -> Result<Option<Bytes>>;
    /// Deletes the record under `id`.
    fn delete(&self, id: RecId) -> Result<()>;
    /// Replaces the record under `id` with `new` only if it currently equals
    /// `expected`. Returns whether the swap happened.
    fn compare_and_swap(&self, id: RecId, expected: &[u8], new: &[u8]) -> Result<bool>;
    /// Makes every completed write durable.
    fn commit(&self) -> Result<()>;
    /// Commits and releases the store.
    fn close(&self) -> Result<()>;
    /// Returns true once `close` has been called.
    fn is_closed(&self) -> bool;
}

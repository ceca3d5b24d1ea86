//! Concurrent B-link tree ordered map over a recid-addressed record store.
//!
//! Readers descend without locks and recover from concurrent splits by
//! following right links; writers lock one node at a time.

#![warn(missing_docs)]

pub mod logging;
pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::store::{FileStore, MemoryStore, RecordStore};
pub use storage::btree::{
    BLinkOptions, BLinkStats, BLinkStatsSnapshot, BLinkTree, Cursor, DescendingCursor, KeyCodec,
    ModificationListener, ValCodec, VerifyReport,
};
pub use types::{BLinkError, RecId, Result};

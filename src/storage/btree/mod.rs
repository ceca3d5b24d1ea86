#![forbid(unsafe_code)]

//! Concurrent B-link tree: node model, record format, the lock-coupled
//! mutation protocol, cursors and the structural verifier.

/// Encoding and decoding utilities for keys and values.
pub mod codecs;
mod cursor;
mod descending;
mod format;
mod listener;
mod node;
mod options;
mod stats;
mod tree;
mod verify;

pub use codecs::{KeyCodec, ValCodec};
pub use cursor::Cursor;
pub use descending::DescendingCursor;
pub use listener::ModificationListener;
pub use options::{BLinkOptions, MIN_NODE_SIZE};
pub use stats::{BLinkStats, BLinkStatsSnapshot};
pub use tree::BLinkTree;
pub use verify::{VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};

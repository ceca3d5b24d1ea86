#![forbid(unsafe_code)]

//! Identifiers and error types shared by every layer of the crate.

use std::fmt;

pub mod checksum;

pub use checksum::{record_crc32, record_crc32_matches};

/// Identifier of one record in a [`crate::primitives::store::RecordStore`].
///
/// `RecId(0)` is never handed out by a store; node links use it to mean
/// "no right sibling".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct RecId(pub u64);

impl RecId {
    /// The null id, used as the link of the rightmost node at a level.
    pub const NULL: RecId = RecId(0);

    /// Returns true for [`RecId::NULL`].
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecId {
    fn from(value: u64) -> Self {
        RecId(value)
    }
}

impl From<RecId> for u64 {
    fn from(value: RecId) -> Self {
        value.0
    }
}

/// Errors surfaced by the record stores and the tree engine.
#[derive(thiserror::Error, Debug)]
pub enum BLinkError {
    /// I/O failure in a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted structure cannot be trusted: a recid did not resolve or a
    /// record failed to decode.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Rejected argument or configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The record store was closed.
    #[error("record store is closed")]
    Closed,
}

impl BLinkError {
    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        BLinkError::Corruption(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BLinkError::InvalidArgument(message.into())
    }

    /// Returns true when this error reports persisted-structure corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, BLinkError::Corruption(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BLinkError>;

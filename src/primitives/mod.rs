//! Low-level primitives the tree engine is built on.
//!
//! Includes byte utilities, positioned file I/O, the per-node lock table,
//! and the recid-addressed record stores.

/// Byte-level encoding helpers.
pub mod bytes;

/// Per-node lock table used by mutating tree operations.
pub mod concurrency;

/// Positioned file I/O.
pub mod io;

/// Record store contract and its on-heap and on-disk backends.
pub mod store;

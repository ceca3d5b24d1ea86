use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::primitives::concurrency::LockBackoff;
use crate::types::{BLinkError, Result};

/// Smallest split threshold that still leaves both halves of a leaf with a
/// real entry.
pub const MIN_NODE_SIZE: usize = 4;

/// Configuration knobs for the B-link tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BLinkOptions {
    /// Key count at which a node is split.
    pub max_node_size: usize,
    /// Store each leaf value as its own record and keep only the recid in
    /// the leaf.
    pub values_outside_nodes: bool,
    /// Busy-spin attempts on a contended node lock before yielding.
    pub lock_spins: u32,
    /// Sleep between lock attempts once spinning gave up, in microseconds.
    pub lock_park_micros: u64,
    /// Pause while the left-edge cache catches up with a concurrent root
    /// split, in microseconds.
    pub left_edge_wait_micros: u64,
}

impl Default for BLinkOptions {
    fn default() -> Self {
        Self {
            max_node_size: 32,
            values_outside_nodes: false,
            lock_spins: 64,
            lock_park_micros: 50,
            left_edge_wait_micros: 100,
        }
    }
}

impl BLinkOptions {
    /// Sets the split threshold.
    pub fn with_max_node_size(mut self, max_node_size: usize) -> Self {
        self.max_node_size = max_node_size;
        self
    }

    /// Toggles out-of-line value records.
    pub fn with_values_outside_nodes(mut self, enabled: bool) -> Self {
        self.values_outside_nodes = enabled;
        self
    }

    /// Sets the node lock backoff.
    pub fn with_lock_backoff(mut self, spins: u32, park_micros: u64) -> Self {
        self.lock_spins = spins;
        self.lock_park_micros = park_micros;
        self
    }

    /// Parses options from TOML; missing fields keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let options: Self = toml::from_str(source)
            .map_err(|err| BLinkError::invalid(format!("invalid tree options: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_node_size < MIN_NODE_SIZE {
            return Err(BLinkError::invalid(format!(
                "max_node_size {} is below the minimum of {MIN_NODE_SIZE}",
                self.max_node_size
            )));
        }
        if self.max_node_size > u16::MAX as usize {
            return Err(BLinkError::invalid(format!(
                "max_node_size {} exceeds {}",
                self.max_node_size,
                u16::MAX
            )));
        }
        Ok(())
    }

    pub(crate) fn lock_backoff(&self) -> LockBackoff {
        LockBackoff {
            spins: self.lock_spins,
            park: Duration::from_micros(self.lock_park_micros),
        }
    }

    pub(crate) fn left_edge_wait(&self) -> Duration {
        Duration::from_micros(self.left_edge_wait_micros)
    }
}

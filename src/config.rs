//! Per-node configuration, passed explicitly to constructors.
use serde::Deserialize;
use serde::Serialize;

use crate::consts;
use crate::error::Error;
use crate::error::Result;

/// Tunables for one overlay node. Lifecycle is tied to the owning node,
/// never process-wide.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RingConfig {
    /// Digit width `b`; the routing table works in base `2^b`.
    pub base_bits: u8,
    /// Leaf set entries kept on each side (L/2).
    pub leaf_radius: usize,
    /// Candidates kept in one routing table cell.
    pub route_set_size: usize,
    /// Seconds between maintenance cycles.
    pub maintenance_interval_secs: u64,
    /// Milliseconds to wait for one join attempt.
    pub join_timeout_ms: u64,
    /// Join attempts before startup fails.
    pub join_retries: u32,
    /// Messages buffered for not-yet-ready handlers.
    pub dispatch_buffer: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            base_bits: consts::DEFAULT_BASE_BITS,
            leaf_radius: consts::DEFAULT_LEAF_RADIUS,
            route_set_size: consts::DEFAULT_ROUTE_SET_SIZE,
            maintenance_interval_secs: consts::DEFAULT_MAINTENANCE_INTERVAL_SECS,
            join_timeout_ms: consts::DEFAULT_JOIN_TIMEOUT_MS,
            join_retries: consts::DEFAULT_JOIN_RETRIES,
            dispatch_buffer: consts::DEFAULT_DISPATCH_BUFFER,
        }
    }
}

impl RingConfig {
    /// Digit extraction assumes digits do not straddle bytes.
    pub fn validate(&self) -> Result<()> {
        if ![1, 2, 4, 8].contains(&self.base_bits) {
            return Err(Error::BadBaseBits(self.base_bits));
        }
        Ok(())
    }
}

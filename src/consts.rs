//! Protocol defaults.

/// Bit width of a [NodeId](crate::id::NodeId).
pub const ID_BITS: usize = 160;

/// Default digit width `b`. The routing table is kept in base `2^b`.
pub const DEFAULT_BASE_BITS: u8 = 4;

/// Default number of leaf set entries kept on each side of the local node.
pub const DEFAULT_LEAF_RADIUS: usize = 8;

/// Default cap on candidates stored in one routing table cell.
pub const DEFAULT_ROUTE_SET_SIZE: usize = 3;

/// Default interval between maintenance cycles, in seconds.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 20;

/// Default timeout for one join attempt, in milliseconds.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5000;

/// Default number of join attempts before giving up.
pub const DEFAULT_JOIN_RETRIES: u32 = 3;

/// Default capacity of the not-yet-ready dispatch buffer.
pub const DEFAULT_DISPATCH_BUFFER: usize = 32;

/// Upper bound on next-hop retries for a single message before the
/// router reports a delivery failure.
pub const MAX_ROUTE_ATTEMPTS: usize = 8;

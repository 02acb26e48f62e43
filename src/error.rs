//! Error of strudel_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in strudel-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid hexadecimal node id")]
    BadHexId,

    #[error("Node id must be {0} hex characters")]
    BadIdLength(usize),

    #[error("Digit width must be one of 1, 2, 4, 8, got {0}")]
    BadBaseBits(u8),

    #[error("Leaf set lock failed")]
    LeafSetLockFailed,

    #[error("Routing table lock failed")]
    RoutingTableLockFailed,

    #[error("Join state lock failed")]
    JoinStateLockFailed,

    #[error("Dispatch buffer lock failed")]
    DispatchLockFailed,

    #[error("Send message through channel failed")]
    ChannelSendMessageFailed,

    #[error("Recv message through channel failed")]
    ChannelRecvMessageFailed,

    #[error("Message has no destination address")]
    MissingDestination,

    #[error("Transport send to {0} failed")]
    TransportSendFailed(crate::id::NodeId),

    #[error("Cannot resolve a handle for {0}")]
    UnknownPeer(crate::id::NodeId),

    #[error("Routing gave up after {0} attempts")]
    DeliveryFailed(usize),

    #[error("Join failed: bootstrap node unreachable")]
    JoinBootstrapUnreachable,

    #[error("Join failed: no response within {0} attempts")]
    JoinTimeout(u32),

    #[error("Node is already joined or joining")]
    AlreadyJoined,

    #[error("Routing table has no row {0}")]
    NoSuchRow(u8),
}

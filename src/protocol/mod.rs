//! Built-in overlay protocols: join, leaf set exchange, routing table
//! maintenance. Each one is a [crate::dispatch::MessageHandler] bound to a
//! well-known address present on every node.
use crate::dispatch::Address;

pub mod join;
pub mod leafset;
pub mod maintenance;
pub mod routeset;

pub use join::JoinProtocol;
pub use join::JoinState;
pub use leafset::LeafSetProtocol;
pub use maintenance::Maintenance;
pub use routeset::RouteSetProtocol;

/// Handler address of the join protocol.
pub const JOIN_PROTOCOL: Address = Address(1);

/// Handler address of the leaf set exchange protocol.
pub const LEAFSET_PROTOCOL: Address = Address(2);

/// Handler address of the routing table maintenance protocol.
pub const ROUTESET_PROTOCOL: Address = Address(3);

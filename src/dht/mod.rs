//! The self-stabilizing routing state of one overlay node.
//!
//! The leaf set covers the ring-local neighborhood, the routing table covers
//! long-distance prefix hops, and the router composes both with liveness to
//! pick the next hop for every message. All mutation happens on the owning
//! node's processing context; see [crate::node].
pub mod leafset;
pub mod ring;
pub mod router;
pub mod routeset;
pub mod table;

pub use leafset::LeafSet;
pub use ring::PrefixRing;
pub use router::NextHop;
pub use router::Routed;
pub use router::Router;
pub use routeset::RouteSet;
pub use table::RoutingTable;

use crate::handle::HandleRef;

/// Observes membership changes of a leaf set or routing table. Callbacks run
/// synchronously on the owning node's processing context, right after the
/// mutation.
pub trait TableListener: Send + Sync {
    /// A handle entered the structure.
    fn on_member_added(&self, handle: &HandleRef);

    /// A handle left the structure (failure or eviction).
    fn on_member_removed(&self, handle: &HandleRef);
}

//! The transport seam: references to (possibly remote) peers.
//!
//! The core never constructs transports. It holds [HandleRef]s supplied by a
//! [HandleProvider] and drives liveness transitions through the handle
//! contract on send outcomes. Every transport variant (in-process, socket,
//! simulated) implements the same trait; the core never branches on the
//! concrete kind.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::id::NodeId;
use crate::message::MessagePayload;

/// Proximity of the local node to itself.
pub const PROXIMITY_SELF: u64 = 0;

/// Proximity of a peer whose cost has not been measured yet.
pub const PROXIMITY_UNKNOWN: u64 = u64::MAX;

/// Tri-state health estimate for a peer. Ordering matters: a smaller value is
/// a healthier peer, and routing predicates are written as
/// `liveness <= Liveness::Suspected`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Liveness {
    /// Recent successful contact.
    Alive,
    /// A probe or send went unanswered; still eligible as a last resort.
    Suspected,
    /// Repeated failures; never routed to.
    Faulty,
}

impl Liveness {
    /// Whether a peer in this state may still carry traffic.
    pub fn is_alive(&self) -> bool {
        *self <= Liveness::Suspected
    }
}

/// A reference to a peer: identifier, liveness state, proximity estimate and
/// an asynchronous send. Liveness worsens monotonically except for an
/// explicit `mark_alive` on successful contact.
#[async_trait]
pub trait NodeHandle: Send + Sync + std::fmt::Debug {
    /// The peer's position on the ring.
    fn id(&self) -> NodeId;

    /// Current health estimate.
    fn liveness(&self) -> Liveness;

    /// Cost estimate for reaching this peer; lower is closer.
    fn proximity(&self) -> u64;

    /// Deliver a payload to the peer. An `Err` means the transport could not
    /// hand the message off; the caller decides what that does to liveness.
    async fn send(&self, payload: MessagePayload) -> Result<()>;

    /// Record a successful contact.
    fn mark_alive(&self);

    /// Record a missed contact.
    fn mark_suspected(&self);

    /// Record a hard failure.
    fn mark_faulty(&self);
}

/// Shared reference to a peer handle.
pub type HandleRef = Arc<dyn NodeHandle>;

/// Materializes handles for identifiers learned from protocol traffic.
/// Supplied by the transport collaborator; `resolve` returns `None` for
/// peers the transport has no way to reach.
pub trait HandleProvider: Send + Sync {
    /// The handle of the local node itself.
    fn local(&self) -> HandleRef;

    /// A handle for a remote peer, if one can be made.
    fn resolve(&self, id: NodeId) -> Option<HandleRef>;
}

use serde::Deserialize;
use serde::Serialize;

use super::types::Message;
use crate::dispatch::Address;
use crate::id::NodeId;

/// Everything that travels through the overlay is wrapped in a payload:
/// a destination key on the ring, the handler address at the destination,
/// and the body. Remote peers keep the same `tx_id` when replying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Transaction id of the payload.
    pub tx_id: uuid::Uuid,
    /// Id of the node that created the payload.
    pub sender: NodeId,
    /// Destination key; routing delivers to the live node numerically
    /// closest to it.
    pub target: NodeId,
    /// Which registered handler receives the body at the destination.
    /// `None` is malformed and rejected at dispatch.
    pub address: Option<Address>,
    /// Hops taken so far.
    pub hops: u8,
    /// The body.
    pub data: Message,
}

impl MessagePayload {
    /// Create a fresh payload with a new transaction id.
    pub fn new(data: Message, address: Address, sender: NodeId, target: NodeId) -> Self {
        Self {
            tx_id: uuid::Uuid::new_v4(),
            sender,
            target,
            address: Some(address),
            hops: 0,
            data,
        }
    }

    /// Reply to this payload: same transaction id, addressed straight at the
    /// original sender.
    pub fn reply(&self, data: Message, address: Address, sender: NodeId) -> Self {
        Self {
            tx_id: self.tx_id,
            sender,
            target: self.sender,
            address: Some(address),
            hops: 0,
            data,
        }
    }
}

//! Message bodies. Requests and their replies come in pairs, the way the
//! join and row-exchange round trips are structured.
use serde::Deserialize;
use serde::Serialize;

use crate::id::NodeId;

/// One routing table row flattened to the ids it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Row index; 0 is the least significant digit.
    pub row: u8,
    /// Every id stored across the row's cells, local self-entry included.
    pub ids: Vec<NodeId>,
}

/// Routed toward the joiner's own id. Every hop on the way appends the row
/// at its point of agreement with the joiner, so the accumulated rows
/// approximate a correct initial routing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Id of the node trying to enter the ring.
    pub joiner: NodeId,
    /// Rows collected hop by hop.
    pub rows: Vec<RowSnapshot>,
}

/// Sent by the terminal (numerically closest) node straight back to the
/// joiner: the collected rows plus the terminal's leaf set, which seeds the
/// joiner's own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Rows collected along the join route, terminal's included.
    pub rows: Vec<RowSnapshot>,
    /// Terminal node's clockwise leaf side, nearest first.
    pub cw: Vec<NodeId>,
    /// Terminal node's counter-clockwise leaf side, nearest first.
    pub ccw: Vec<NodeId>,
}

/// Full leaf set of the sender, pushed to a member for merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafBroadcast {
    /// All member ids, both sides.
    pub leaves: Vec<NodeId>,
}

/// Ask a peer for one of its routing table rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRouteRow {
    /// Which row is wanted.
    pub row: u8,
}

/// Push one local routing table row to a peer for merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRouteRow {
    /// Which row this is.
    pub row: u8,
    /// Flattened row content.
    pub ids: Vec<NodeId>,
}

/// Opaque application data delivered to whatever handler the application
/// registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMessage(pub Vec<u8>);

/// A collection of message bodies for unified dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Message {
    /// A node wants in; routed toward its own id.
    JoinRequest(JoinRequest),
    /// Terminal node's answer to a join request.
    JoinResponse(JoinResponse),
    /// Leaf set exchange push.
    LeafBroadcast(LeafBroadcast),
    /// Route row pull.
    RequestRouteRow(RequestRouteRow),
    /// Route row push.
    BroadcastRouteRow(BroadcastRouteRow),
    /// Application payload.
    Custom(CustomMessage),
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Message::JoinRequest(_) => write!(f, "JoinRequest"),
            Message::JoinResponse(_) => write!(f, "JoinResponse"),
            Message::LeafBroadcast(_) => write!(f, "LeafBroadcast"),
            Message::RequestRouteRow(_) => write!(f, "RequestRouteRow"),
            Message::BroadcastRouteRow(_) => write!(f, "BroadcastRouteRow"),
            Message::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl Message {
    /// Wrap application bytes.
    pub fn custom(bytes: &[u8]) -> Message {
        Message::Custom(CustomMessage(bytes.to_vec()))
    }
}

//! Message shapes exchanged by the overlay protocols.
//!
//! No wire encoding is prescribed here; everything derives serde and the
//! transport picks the format.

mod payload;
mod types;

pub use payload::MessagePayload;
pub use types::BroadcastRouteRow;
pub use types::CustomMessage;
pub use types::JoinRequest;
pub use types::JoinResponse;
pub use types::LeafBroadcast;
pub use types::Message;
pub use types::RequestRouteRow;
pub use types::RowSnapshot;

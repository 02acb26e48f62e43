//! Strudel is the routing substrate of a structured peer-to-peer overlay.
//!
//! Nodes and keys live on a circular 160-bit identifier space. Each node
//! keeps two structures over it: a [leaf set](dht::LeafSet) of the
//! numerically closest peers on both sides, and a prefix
//! [routing table](dht::RoutingTable) resolving one digit of the key per
//! hop. The [router](dht::Router) composes them so that any key reaches the
//! live node numerically closest to it in a logarithmic number of hops.
//!
//! The crate is transport-agnostic. A transport supplies peers through the
//! [handle::HandleProvider] seam and feeds inbound payloads into the queue
//! behind [node::Node::sender]; everything else, from the
//! [join protocol](protocol::JoinProtocol) to periodic
//! [maintenance](protocol::Maintenance), is driven from here.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use strudel_core::config::RingConfig;
//! # use strudel_core::handle::HandleProvider;
//! # use strudel_core::node::Node;
//! # async fn example(provider: Arc<dyn HandleProvider>) -> strudel_core::error::Result<()> {
//! let node = Node::new(RingConfig::default(), provider)?;
//! tokio::spawn(node.clone().listen());
//! node.join(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consts;
pub mod dht;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod id;
pub mod message;
pub mod node;
pub mod protocol;
#[cfg(test)]
mod tests;

pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::id::NodeId;
pub use crate::node::Node;

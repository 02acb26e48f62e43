//! Leaf set exchange.
//!
//! Periodically one member is picked at random and handed our full leaf set;
//! the receiver merges whatever it did not know. The same push doubles as
//! the post-join announcement, sent to every member at once so the
//! neighborhood learns about the newcomer in one round.
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::dht::PrefixRing;
use crate::dispatch::MessageHandler;
use crate::error::Result;
use crate::handle::HandleProvider;
use crate::handle::HandleRef;
use crate::id::SortRing;
use crate::message::LeafBroadcast;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::protocol::LEAFSET_PROTOCOL;

/// Both sides of the leaf set exchange.
pub struct LeafSetProtocol {
    ring: Arc<PrefixRing>,
    provider: Arc<dyn HandleProvider>,
}

impl LeafSetProtocol {
    pub fn new(ring: Arc<PrefixRing>, provider: Arc<dyn HandleProvider>) -> Self {
        Self { ring, provider }
    }

    fn broadcast(&self) -> Result<Message> {
        let mut leaves = self.ring.lock_leafset()?.member_ids();
        leaves.push(self.ring.local_id());
        // ring order from the local id, so receivers see a stable layout
        leaves.sort_from(self.ring.local_id());
        Ok(Message::LeafBroadcast(LeafBroadcast { leaves }))
    }

    /// Push the local leaf set to one member picked uniformly at random.
    /// A failed push marks the peer suspected; maintenance retries later.
    pub async fn exchange(&self) -> Result<()> {
        let (peer, message) = {
            let leafset = self.ring.lock_leafset()?;
            let members: Vec<HandleRef> = leafset
                .members()
                .filter(|h| h.liveness().is_alive())
                .cloned()
                .collect();
            let Some(peer) = members.choose(&mut rand::thread_rng()).cloned() else {
                return Ok(());
            };
            drop(leafset);
            (peer, self.broadcast()?)
        };
        let payload =
            MessagePayload::new(message, LEAFSET_PROTOCOL, self.ring.local_id(), peer.id());
        if let Err(e) = peer.send(payload).await {
            tracing::warn!("leaf exchange with {} failed: {}", peer.id(), e);
            peer.mark_suspected();
        } else {
            peer.mark_alive();
        }
        Ok(())
    }

    /// Push the local leaf set to every member. Used right after joining.
    pub async fn announce(&self) -> Result<()> {
        let members: Vec<HandleRef> = {
            let leafset = self.ring.lock_leafset()?;
            leafset.members().cloned().collect()
        };
        let message = self.broadcast()?;
        for peer in members {
            let payload = MessagePayload::new(
                message.clone(),
                LEAFSET_PROTOCOL,
                self.ring.local_id(),
                peer.id(),
            );
            if let Err(e) = peer.send(payload).await {
                tracing::warn!("leaf announce to {} failed: {}", peer.id(), e);
                peer.mark_suspected();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for LeafSetProtocol {
    fn deliver_when_not_ready(&self) -> bool {
        true
    }

    async fn on_message(&self, payload: MessagePayload) -> Result<()> {
        let Message::LeafBroadcast(broadcast) = &payload.data else {
            tracing::warn!("unexpected {} at the leaf set address", payload.data);
            return Ok(());
        };
        for id in broadcast.leaves.iter().chain(std::iter::once(&payload.sender)) {
            if *id == self.ring.local_id() {
                continue;
            }
            let Some(handle) = self.provider.resolve(*id) else {
                continue;
            };
            if handle.liveness().is_alive() {
                self.ring.add_peer(&handle)?;
            }
        }
        Ok(())
    }
}

//! Hop selection and forwarding.
//!
//! Every payload goes through the same decision ladder: leaf set range
//! first, then the prefix cell for the key, then any strictly closer
//! fallback from the key's row or the leaf set, and finally local delivery.
//! A failed send marks the hop faulty, purges it and retries the ladder, so
//! one dead peer costs one attempt, not the message.
use std::sync::Arc;

use crate::consts::MAX_ROUTE_ATTEMPTS;
use crate::dht::PrefixRing;
use crate::error::Error;
use crate::error::Result;
use crate::handle::HandleRef;
use crate::handle::Liveness;
use crate::id::NodeId;
use crate::message::MessagePayload;

/// Decision for one key at one node.
pub enum NextHop {
    /// The local node is the destination.
    Local,
    /// Hand the payload to this peer.
    Forward(HandleRef),
}

/// What [Router::route] did with a payload.
pub enum Routed {
    /// The payload terminated here; the caller owns delivery.
    Local(MessagePayload),
    /// The payload left for this peer.
    Sent(NodeId),
}

/// Stateless hop selection over a shared [PrefixRing].
pub struct Router {
    ring: Arc<PrefixRing>,
}

impl Router {
    pub fn new(ring: Arc<PrefixRing>) -> Self {
        Self { ring }
    }

    /// Pick the next hop for `key`.
    pub fn next_hop(&self, key: NodeId) -> Result<NextHop> {
        let local_id = self.ring.local_id();

        {
            let leafset = self.ring.lock_leafset()?;
            if leafset.is_within_range(key) {
                let closest = leafset.closest_to(key);
                if closest.id() == local_id {
                    return Ok(NextHop::Local);
                }
                tracing::debug!("{} routes {} inside the leaf span", local_id, key);
                return Ok(NextHop::Forward(closest));
            }
        }

        let mut best_dist = local_id.distance(key);
        let mut fallback: Option<HandleRef> = None;
        {
            let table = self.ring.lock_table()?;
            if let Some(cell) = table.best_entry(key) {
                if let Some(hop) = cell.closest_node() {
                    tracing::debug!("{} routes {} by prefix to {}", local_id, key, hop.id());
                    return Ok(NextHop::Forward(hop));
                }
            }
            if let Some(hop) = table.best_alternate_route(Liveness::Suspected, key) {
                let d = hop.id().distance(key);
                if d < best_dist {
                    best_dist = d;
                    fallback = Some(hop);
                }
            }
        }
        {
            let leafset = self.ring.lock_leafset()?;
            for h in leafset.members() {
                if !h.liveness().is_alive() {
                    continue;
                }
                let d = h.id().distance(key);
                if d < best_dist {
                    best_dist = d;
                    fallback = Some(h.clone());
                }
            }
        }

        match fallback {
            Some(hop) => {
                tracing::debug!("{} routes {} by fallback to {}", local_id, key, hop.id());
                Ok(NextHop::Forward(hop))
            }
            None => Ok(NextHop::Local),
        }
    }

    /// Route a payload one hop onward, retrying past dead peers. Returns the
    /// payload itself when it terminates here.
    pub async fn route(&self, payload: MessagePayload) -> Result<Routed> {
        for attempt in 0..MAX_ROUTE_ATTEMPTS {
            match self.next_hop(payload.target)? {
                NextHop::Local => return Ok(Routed::Local(payload)),
                NextHop::Forward(hop) => {
                    let mut onward = payload.clone();
                    onward.hops = onward.hops.saturating_add(1);
                    match hop.send(onward).await {
                        Ok(()) => {
                            hop.mark_alive();
                            return Ok(Routed::Sent(hop.id()));
                        }
                        Err(e) => {
                            tracing::warn!(
                                "send to {} failed on attempt {}: {}",
                                hop.id(),
                                attempt,
                                e
                            );
                            hop.mark_faulty();
                            self.ring.remove_peer(hop.id())?;
                        }
                    }
                }
            }
        }
        Err(Error::DeliveryFailed(MAX_ROUTE_ATTEMPTS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingConfig;
    use crate::dispatch::Address;
    use crate::message::Message;
    use crate::tests::mock;

    fn config() -> RingConfig {
        RingConfig {
            leaf_radius: 2,
            ..Default::default()
        }
    }

    fn router_at(local: u32) -> Router {
        Router::new(Arc::new(PrefixRing::new(mock::handle(local), &config())))
    }

    fn forwards_to(router: &Router, key: u32) -> NodeId {
        match router.next_hop(NodeId::from(key)).unwrap() {
            NextHop::Forward(h) => h.id(),
            NextHop::Local => panic!("expected a forward for {key:#x}"),
        }
    }

    #[test]
    fn test_leaf_span_delivers_to_numeric_closest() {
        let router = router_at(0);
        for n in [10u32, 20, 30, 40] {
            router.ring.add_peer(&mock::handle(n)).unwrap();
        }
        // 9 is closer to 10 than to us
        assert_eq!(forwards_to(&router, 9), NodeId::from(10u32));
        // 4 is closer to us
        assert!(matches!(
            router.next_hop(NodeId::from(4u32)).unwrap(),
            NextHop::Local
        ));
        // a lonely ring owns every key
        let alone = router_at(0);
        assert!(matches!(
            alone.next_hop(NodeId::from(0x9999u32)).unwrap(),
            NextHop::Local
        ));
    }

    #[test]
    fn test_prefix_cell_wins_outside_leaf_span() {
        let router = router_at(0x1000);
        router.ring.add_peer(&mock::handle(0x1001)).unwrap();
        router
            .ring
            .lock_table()
            .unwrap()
            .put(mock::handle(0x5600));
        assert_eq!(forwards_to(&router, 0x5999), NodeId::from(0x5600u32));
    }

    #[test]
    fn test_dead_cell_falls_back_to_strictly_closer() {
        let router = router_at(0x1000);
        router.ring.add_peer(&mock::handle(0x1001)).unwrap();

        let dead = mock::handle(0x5600);
        let detour = mock::handle(0x4000);
        {
            let mut table = router.ring.lock_table().unwrap();
            table.put(dead.clone());
            table.put(detour.clone());
        }
        dead.mark_faulty();

        // the key's own cell holds only the faulty peer, so the row scan
        // finds the strictly closer detour instead
        assert_eq!(forwards_to(&router, 0x5999), detour.id());

        // nobody strictly closer left: terminate here
        router.ring.lock_table().unwrap().remove(detour.id());
        router.ring.lock_leafset().unwrap().remove(NodeId::from(0x1001u32));
        assert!(matches!(
            router.next_hop(NodeId::from(0x5999u32)).unwrap(),
            NextHop::Local
        ));
    }

    #[tokio::test]
    async fn test_route_survives_a_dead_hop() {
        let router = router_at(0);
        let dead = mock::failing_handle(10);
        router.ring.add_peer(&dead).unwrap();

        let payload = MessagePayload::new(
            Message::custom(b"hi"),
            Address(7),
            NodeId::from(0u32),
            NodeId::from(9u32),
        );
        // first attempt dies at 10, second finds nobody closer and lands here
        match router.route(payload).await.unwrap() {
            Routed::Local(p) => assert_eq!(p.target, NodeId::from(9u32)),
            Routed::Sent(_) => panic!("expected local delivery"),
        }
        assert_eq!(dead.liveness(), Liveness::Faulty);
        assert!(router.ring.lock_leafset().unwrap().is_empty());
    }
}

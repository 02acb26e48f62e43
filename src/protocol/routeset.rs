//! Routing table maintenance by row exchange.
//!
//! Each cycle walks the rows from the most significant down. For every row
//! it samples a few random cells, and the first live candidate found gets a
//! push of our row and a pull for its own. Rows fill top-down over time; a
//! row with no live candidate at all ends the walk, since everything below
//! it is sparser still.
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::dht::PrefixRing;
use crate::dispatch::MessageHandler;
use crate::error::Error;
use crate::error::Result;
use crate::handle::HandleProvider;
use crate::message::BroadcastRouteRow;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::message::RequestRouteRow;
use crate::protocol::ROUTESET_PROTOCOL;

/// Both sides of the row exchange.
pub struct RouteSetProtocol {
    ring: Arc<PrefixRing>,
    provider: Arc<dyn HandleProvider>,
}

impl RouteSetProtocol {
    pub fn new(ring: Arc<PrefixRing>, provider: Arc<dyn HandleProvider>) -> Self {
        Self { ring, provider }
    }

    fn row_push(&self, row: usize) -> Result<Message> {
        let ids = self.ring.lock_table()?.row_ids(row).unwrap_or_default();
        Ok(Message::BroadcastRouteRow(BroadcastRouteRow {
            row: row as u8,
            ids,
        }))
    }

    /// One maintenance pass over the table.
    pub async fn maintain(&self) -> Result<()> {
        let local = self.ring.local_id();
        let (num_rows, num_cols) = {
            let table = self.ring.lock_table()?;
            (table.num_rows(), table.num_cols())
        };
        let max_trials = (num_cols / 2).max(1);

        for row in (0..num_rows).rev() {
            let picked = {
                let table = self.ring.lock_table()?;
                let my_col = local.digit(row, self.ring.base_bits()) as usize;
                let mut rng = rand::thread_rng();
                let mut found = None;
                for _ in 0..max_trials {
                    let col = loop {
                        let c = rng.gen_range(0..num_cols);
                        if c != my_col {
                            break c;
                        }
                    };
                    if let Some(nh) = table.cell(row, col).and_then(|cell| cell.closest_node()) {
                        found = Some(nh);
                        break;
                    }
                }
                found
            };
            let Some(peer) = picked else {
                tracing::debug!("row {} has no live candidate, ending the pass", row);
                break;
            };

            let push = MessagePayload::new(self.row_push(row)?, ROUTESET_PROTOCOL, local, peer.id());
            let pull = MessagePayload::new(
                Message::RequestRouteRow(RequestRouteRow { row: row as u8 }),
                ROUTESET_PROTOCOL,
                local,
                peer.id(),
            );
            let sent = match peer.send(push).await {
                Ok(()) => peer.send(pull).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(()) => peer.mark_alive(),
                Err(e) => {
                    tracing::warn!("row exchange with {} failed: {}", peer.id(), e);
                    peer.mark_suspected();
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for RouteSetProtocol {
    fn deliver_when_not_ready(&self) -> bool {
        true
    }

    async fn on_message(&self, payload: MessagePayload) -> Result<()> {
        match &payload.data {
            Message::BroadcastRouteRow(push) => {
                let local = self.ring.local_id();
                let mut table = self.ring.lock_table()?;
                for id in push.ids.iter().chain(std::iter::once(&payload.sender)) {
                    if *id == local {
                        continue;
                    }
                    let Some(handle) = self.provider.resolve(*id) else {
                        continue;
                    };
                    if handle.liveness().is_alive() {
                        table.put(handle);
                    }
                }
                Ok(())
            }
            Message::RequestRouteRow(pull) => {
                let row = pull.row as usize;
                if self.ring.lock_table()?.row_ids(row).is_none() {
                    return Err(Error::NoSuchRow(pull.row));
                }
                let reply = payload.reply(
                    self.row_push(row)?,
                    ROUTESET_PROTOCOL,
                    self.ring.local_id(),
                );
                let peer = self
                    .provider
                    .resolve(payload.sender)
                    .ok_or(Error::UnknownPeer(payload.sender))?;
                peer.send(reply).await?;
                peer.mark_alive();
                Ok(())
            }
            other => {
                tracing::warn!("unexpected {} at the route set address", other);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingConfig;
    use crate::id::NodeId;
    use crate::tests::mock;

    fn protocol(net: &Arc<mock::SimNet>, local: u32) -> RouteSetProtocol {
        let local = NodeId::from(local);
        let ring = Arc::new(PrefixRing::new(net.handle(local), &RingConfig::default()));
        RouteSetProtocol::new(ring, net.provider(local))
    }

    #[tokio::test]
    async fn test_row_push_is_merged() {
        let net = mock::SimNet::new();
        let proto = protocol(&net, 0x1000);
        let payload = MessagePayload::new(
            Message::BroadcastRouteRow(BroadcastRouteRow {
                row: 3,
                ids: vec![NodeId::from(0x5000u32), NodeId::from(0x1000u32)],
            }),
            ROUTESET_PROTOCOL,
            NodeId::from(0x9000u32),
            NodeId::from(0x1000u32),
        );
        proto.on_message(payload).await.unwrap();

        let table = proto.ring.lock_table().unwrap();
        assert!(table.get(NodeId::from(0x5000u32)).is_some());
        // the sender is merged as well, wherever its own cell is
        assert!(table.get(NodeId::from(0x9000u32)).is_some());
    }

    #[tokio::test]
    async fn test_row_pull_answers_with_local_row() {
        let net = mock::SimNet::new();
        let proto = protocol(&net, 0x1234);
        proto.ring.lock_table().unwrap().put(net.handle(NodeId::from(0x1264u32)));
        let asker = NodeId::from(0x9000u32);
        let rx = net.tap(asker);

        let payload = MessagePayload::new(
            Message::RequestRouteRow(RequestRouteRow { row: 1 }),
            ROUTESET_PROTOCOL,
            asker,
            NodeId::from(0x1234u32),
        );
        proto.on_message(payload).await.unwrap();

        let answer = rx.try_recv().unwrap();
        let Message::BroadcastRouteRow(push) = answer.data else {
            panic!("expected a row push");
        };
        assert_eq!(push.row, 1);
        assert!(push.ids.contains(&NodeId::from(0x1264u32)));
        assert!(push.ids.contains(&NodeId::from(0x1234u32)));

        // a row index past the table is refused
        let bad = MessagePayload::new(
            Message::RequestRouteRow(RequestRouteRow { row: 200 }),
            ROUTESET_PROTOCOL,
            asker,
            NodeId::from(0x1234u32),
        );
        assert!(matches!(
            proto.on_message(bad).await,
            Err(Error::NoSuchRow(200))
        ));
    }

    #[tokio::test]
    async fn test_maintain_exchanges_on_the_top_populated_row() {
        let net = mock::SimNet::new();
        // the pass starts at the most significant row, so the peers must
        // disagree with us in the top digit
        let mut bytes = [0u8; 20];
        bytes[0] = 0x10;
        let local = NodeId::from_bytes(bytes);
        let ring = Arc::new(PrefixRing::new(net.handle(local), &RingConfig::default()));
        let proto = RouteSetProtocol::new(ring, net.provider(local));

        // one candidate in every cell of the top row, so any sampled column
        // finds a live peer
        let mut taps = vec![];
        for digit in 0..16u8 {
            if digit == 1 {
                continue;
            }
            let mut bytes = [0u8; 20];
            bytes[0] = digit << 4;
            let id = NodeId::from_bytes(bytes);
            taps.push(net.tap(id));
            proto.ring.lock_table().unwrap().put(net.handle(id));
        }

        proto.maintain().await.unwrap();

        // exactly one peer got the push-then-pull pair, for the top row;
        // the pass ends at the first empty row below it
        let mut pushes = 0;
        let mut pulls = 0;
        for rx in &taps {
            while let Ok(payload) = rx.try_recv() {
                match payload.data {
                    Message::BroadcastRouteRow(push) => {
                        assert_eq!(push.row, 39);
                        assert!(push.ids.contains(&local));
                        pushes += 1;
                    }
                    Message::RequestRouteRow(pull) => {
                        assert_eq!(pull.row, 39);
                        pulls += 1;
                    }
                    other => panic!("unexpected {other} during maintenance"),
                }
            }
        }
        assert_eq!((pushes, pulls), (1, 1));
    }
}

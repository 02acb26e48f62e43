//! Entering the ring.
//!
//! A joiner routes a request toward its own id. Every hop on the route
//! appends the routing table row at its point of agreement with the joiner,
//! and the terminal (numerically closest) node answers straight back with
//! the accumulated rows and its own leaf set. Absorbing that answer gives
//! the joiner an approximately correct routing table and leaf set in one
//! round trip; maintenance wears the approximation down afterwards.
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::select;
use futures::FutureExt;
use futures_timer::Delay;

use crate::config::RingConfig;
use crate::dht::PrefixRing;
use crate::dispatch::MessageHandler;
use crate::error::Error;
use crate::error::Result;
use crate::handle::HandleProvider;
use crate::handle::HandleRef;
use crate::id::NodeId;
use crate::message::JoinRequest;
use crate::message::JoinResponse;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::message::RowSnapshot;
use crate::protocol::JOIN_PROTOCOL;

/// Where the local node stands in its own join.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinState {
    /// Not started.
    Start,
    /// A join request is in flight.
    Discovering { attempt: u32 },
    /// Response received, merging collected rows.
    Collecting,
    /// Seeding the leaf set from the terminal node's answer.
    Seeding,
    /// Full member of the ring.
    Ready,
}

/// Joiner-side state machine. One per node, driven once at startup.
pub struct JoinProtocol {
    ring: Arc<PrefixRing>,
    provider: Arc<dyn HandleProvider>,
    state: Mutex<JoinState>,
    response_tx: async_channel::Sender<(NodeId, JoinResponse)>,
    response_rx: async_channel::Receiver<(NodeId, JoinResponse)>,
    timeout_ms: u64,
    retries: u32,
}

impl JoinProtocol {
    pub fn new(
        ring: Arc<PrefixRing>,
        provider: Arc<dyn HandleProvider>,
        config: &RingConfig,
    ) -> Self {
        let (response_tx, response_rx) = async_channel::unbounded();
        Self {
            ring,
            provider,
            state: Mutex::new(JoinState::Start),
            response_tx,
            response_rx,
            timeout_ms: config.join_timeout_ms,
            retries: config.join_retries,
        }
    }

    pub fn state(&self) -> Result<JoinState> {
        self.state
            .lock()
            .map(|s| *s)
            .map_err(|_| Error::JoinStateLockFailed)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), Ok(JoinState::Ready))
    }

    /// Where the receiving handler pushes terminal answers.
    pub fn response_sender(&self) -> async_channel::Sender<(NodeId, JoinResponse)> {
        self.response_tx.clone()
    }

    fn set_state(&self, next: JoinState) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::JoinStateLockFailed)?;
        tracing::debug!("join state {:?} -> {:?}", *state, next);
        *state = next;
        Ok(())
    }

    /// Join through `bootstrap`, or start a fresh ring when there is none.
    /// Retries the whole request on timeout, then gives up for good.
    pub async fn run(&self, bootstrap: Option<HandleRef>) -> Result<()> {
        if self.state()? != JoinState::Start {
            return Err(Error::AlreadyJoined);
        }
        let local = self.ring.local_id();
        let Some(bootstrap) = bootstrap else {
            tracing::info!("{} starts a new ring", local);
            return self.set_state(JoinState::Ready);
        };

        let mut reached = false;
        for attempt in 1..=self.retries {
            self.set_state(JoinState::Discovering { attempt })?;
            let request = MessagePayload::new(
                Message::JoinRequest(JoinRequest {
                    joiner: local,
                    rows: vec![],
                }),
                JOIN_PROTOCOL,
                local,
                local,
            );
            if let Err(e) = bootstrap.send(request).await {
                tracing::warn!("bootstrap {} unreachable: {}", bootstrap.id(), e);
                bootstrap.mark_suspected();
                continue;
            }
            reached = true;

            let mut answer = Box::pin(self.response_rx.recv()).fuse();
            let mut deadline = Delay::new(Duration::from_millis(self.timeout_ms)).fuse();
            select! {
                res = answer => {
                    let (terminal, response) =
                        res.map_err(|_| Error::ChannelRecvMessageFailed)?;
                    bootstrap.mark_alive();
                    return self.absorb(terminal, response);
                }
                _ = deadline => {
                    tracing::warn!("join attempt {} of {} timed out", attempt, self.retries);
                }
            }
        }
        self.set_state(JoinState::Start)?;
        if reached {
            Err(Error::JoinTimeout(self.retries))
        } else {
            Err(Error::JoinBootstrapUnreachable)
        }
    }

    /// Fold a terminal answer into the local routing state.
    fn absorb(&self, terminal: NodeId, response: JoinResponse) -> Result<()> {
        self.set_state(JoinState::Collecting)?;
        let local = self.ring.local_id();
        {
            let mut table = self.ring.lock_table()?;
            for snapshot in &response.rows {
                for id in &snapshot.ids {
                    if *id == local {
                        continue;
                    }
                    if let Some(h) = self.provider.resolve(*id) {
                        if h.liveness().is_alive() {
                            table.put(h);
                        }
                    }
                }
            }
        }

        self.set_state(JoinState::Seeding)?;
        let leaves = response
            .cw
            .iter()
            .chain(response.ccw.iter())
            .chain(std::iter::once(&terminal));
        for id in leaves {
            if *id == local {
                continue;
            }
            if let Some(h) = self.provider.resolve(*id) {
                if h.liveness().is_alive() {
                    self.ring.add_peer(&h)?;
                }
            }
        }

        self.set_state(JoinState::Ready)?;
        tracing::info!(
            "{} joined via {}: {} leaves, {} table entries",
            local,
            terminal,
            self.ring.lock_leafset()?.len(),
            self.ring.lock_table()?.num_unique(),
        );
        Ok(())
    }
}

/// Receiving side of the join protocol, present on every node.
pub struct JoinHandler {
    ring: Arc<PrefixRing>,
    provider: Arc<dyn HandleProvider>,
    response_tx: async_channel::Sender<(NodeId, JoinResponse)>,
}

impl JoinHandler {
    pub fn new(
        ring: Arc<PrefixRing>,
        provider: Arc<dyn HandleProvider>,
        response_tx: async_channel::Sender<(NodeId, JoinResponse)>,
    ) -> Self {
        Self {
            ring,
            provider,
            response_tx,
        }
    }

    fn row_snapshot_for(&self, joiner: NodeId) -> Result<Option<RowSnapshot>> {
        let local = self.ring.local_id();
        let Some(row) = local.index_of_msdd(joiner, self.ring.base_bits()) else {
            return Ok(None);
        };
        let ids = self.ring.lock_table()?.row_ids(row).unwrap_or_default();
        Ok(Some(RowSnapshot {
            row: row as u8,
            ids,
        }))
    }
}

#[async_trait]
impl MessageHandler for JoinHandler {
    fn deliver_when_not_ready(&self) -> bool {
        true
    }

    async fn on_message(&self, payload: MessagePayload) -> Result<()> {
        match &payload.data {
            Message::JoinRequest(req) => {
                let local = self.ring.local_id();
                if req.joiner == local {
                    tracing::warn!("own join request came back, ignoring");
                    return Ok(());
                }
                // Terminal node: our row completes the collection, and our
                // leaf set seeds the joiner's.
                let mut rows = req.rows.clone();
                if let Some(snapshot) = self.row_snapshot_for(req.joiner)? {
                    rows.push(snapshot);
                }
                let (cw, ccw) = {
                    let leafset = self.ring.lock_leafset()?;
                    (leafset.cw_ids(), leafset.ccw_ids())
                };
                let joiner = self
                    .provider
                    .resolve(req.joiner)
                    .ok_or(Error::UnknownPeer(req.joiner))?;
                let response = payload.reply(
                    Message::JoinResponse(JoinResponse { rows, cw, ccw }),
                    JOIN_PROTOCOL,
                    local,
                );
                joiner.send(response).await?;
                joiner.mark_alive();
                // the joiner is our new neighbor
                self.ring.add_peer(&joiner)?;
                Ok(())
            }
            Message::JoinResponse(response) => self
                .response_tx
                .send((payload.sender, response.clone()))
                .await
                .map_err(|_| Error::ChannelSendMessageFailed),
            other => {
                tracing::warn!("unexpected {} at the join address", other);
                Ok(())
            }
        }
    }

    async fn on_forward(&self, payload: &mut MessagePayload) -> Result<bool> {
        if let Message::JoinRequest(req) = &mut payload.data {
            let joiner = req.joiner;
            if let Some(snapshot) = self.row_snapshot_for(joiner)? {
                req.rows.push(snapshot);
            }
        }
        Ok(true)
    }
}

//! One overlay node: routing state, router, dispatch and the built-in
//! protocols wired together behind a message queue.
//!
//! The transport feeds inbound payloads into the queue obtained from
//! [Node::sender]; the owner drives [Node::listen] (or [Node::listen_once]
//! in tests) to process them. Everything a payload touches happens on that
//! processing context, which is what lets the routing structures live behind
//! plain mutexes.
use std::sync::Arc;

use crate::config::RingConfig;
use crate::dht::NextHop;
use crate::dht::PrefixRing;
use crate::dht::Routed;
use crate::dht::Router;
use crate::dispatch::Address;
use crate::dispatch::MessageDispatch;
use crate::error::Error;
use crate::error::Result;
use crate::handle::HandleProvider;
use crate::id::NodeId;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::protocol;
use crate::protocol::join::JoinHandler;
use crate::protocol::JoinProtocol;
use crate::protocol::LeafSetProtocol;
use crate::protocol::Maintenance;
use crate::protocol::RouteSetProtocol;

/// A fully wired overlay node.
pub struct Node {
    config: RingConfig,
    ring: Arc<PrefixRing>,
    router: Arc<Router>,
    dispatch: Arc<MessageDispatch>,
    provider: Arc<dyn HandleProvider>,
    join: Arc<JoinProtocol>,
    leafset_protocol: Arc<LeafSetProtocol>,
    routeset_protocol: Arc<RouteSetProtocol>,
    queue_tx: async_channel::Sender<MessagePayload>,
    queue_rx: async_channel::Receiver<MessagePayload>,
}

impl Node {
    /// Build a node around a transport-supplied [HandleProvider]. The
    /// built-in protocol handlers are registered here; application handlers
    /// are registered by the caller before joining.
    pub fn new(config: RingConfig, provider: Arc<dyn HandleProvider>) -> Result<Arc<Self>> {
        config.validate()?;
        let ring = Arc::new(PrefixRing::new(provider.local(), &config));
        let router = Arc::new(Router::new(ring.clone()));
        let dispatch = Arc::new(MessageDispatch::new(config.dispatch_buffer));
        let join = Arc::new(JoinProtocol::new(ring.clone(), provider.clone(), &config));
        let leafset_protocol = Arc::new(LeafSetProtocol::new(ring.clone(), provider.clone()));
        let routeset_protocol = Arc::new(RouteSetProtocol::new(ring.clone(), provider.clone()));

        dispatch.register(
            protocol::JOIN_PROTOCOL,
            Arc::new(JoinHandler::new(
                ring.clone(),
                provider.clone(),
                join.response_sender(),
            )),
        );
        dispatch.register(protocol::LEAFSET_PROTOCOL, leafset_protocol.clone());
        dispatch.register(protocol::ROUTESET_PROTOCOL, routeset_protocol.clone());

        let (queue_tx, queue_rx) = async_channel::unbounded();
        Ok(Arc::new(Self {
            config,
            ring,
            router,
            dispatch,
            provider,
            join,
            leafset_protocol,
            routeset_protocol,
            queue_tx,
            queue_rx,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.ring.local_id()
    }

    pub fn ring(&self) -> &Arc<PrefixRing> {
        &self.ring
    }

    pub fn dispatch(&self) -> &Arc<MessageDispatch> {
        &self.dispatch
    }

    /// Where the transport pushes inbound payloads.
    pub fn sender(&self) -> async_channel::Sender<MessagePayload> {
        self.queue_tx.clone()
    }

    /// Whether this node has finished joining.
    pub fn is_ready(&self) -> bool {
        self.dispatch.is_ready()
    }

    /// The background repair driver, ready to be spawned.
    pub fn maintenance(&self) -> Arc<Maintenance> {
        Arc::new(Maintenance::new(
            self.leafset_protocol.clone(),
            self.routeset_protocol.clone(),
            self.config.maintenance_interval_secs,
        ))
    }

    /// Enter the ring. `bootstrap` is any known member, or `None` to start a
    /// fresh ring. On success the dispatch flushes buffered traffic and the
    /// neighborhood is told about us.
    pub async fn join(&self, bootstrap: Option<NodeId>) -> Result<()> {
        let bootstrap = match bootstrap {
            Some(id) => Some(self.provider.resolve(id).ok_or(Error::UnknownPeer(id))?),
            None => None,
        };
        self.join.run(bootstrap).await?;
        self.dispatch.set_ready().await?;
        if let Err(e) = self.leafset_protocol.announce().await {
            tracing::warn!("post-join leaf announcement failed: {}", e);
        }
        Ok(())
    }

    /// Route an application message toward `target`, to the handler at
    /// `address` on the destination node.
    pub async fn send_message(&self, address: Address, target: NodeId, data: Message) -> Result<()> {
        let payload = MessagePayload::new(data, address, self.id(), target);
        self.handle_payload(payload).await
    }

    /// Process one inbound payload.
    pub async fn listen_once(&self) -> Result<()> {
        let payload = self
            .queue_rx
            .recv()
            .await
            .map_err(|_| Error::ChannelRecvMessageFailed)?;
        self.handle_payload(payload).await
    }

    /// Process inbound payloads forever, logging failures.
    pub async fn listen(self: Arc<Self>) {
        loop {
            if let Err(e) = self.listen_once().await {
                if matches!(e, Error::ChannelRecvMessageFailed) {
                    tracing::info!("{} inbound queue closed, stopping", self.id());
                    return;
                }
                tracing::error!("{} failed to process a payload: {}", self.id(), e);
            }
        }
    }

    /// Route a payload one step: deliver it locally, or run the forward hook
    /// of its protocol and pass it on.
    pub async fn handle_payload(&self, payload: MessagePayload) -> Result<()> {
        let Some(address) = payload.address else {
            tracing::error!(tx_id = %payload.tx_id, "refusing to route a message with no destination address");
            return Err(Error::MissingDestination);
        };
        match self.router.next_hop(payload.target)? {
            NextHop::Local => {
                self.dispatch.dispatch(payload).await?;
                Ok(())
            }
            NextHop::Forward(_) => {
                let mut payload = payload;
                if let Some(handler) = self.dispatch.handler_of(address) {
                    if !handler.on_forward(&mut payload).await? {
                        tracing::debug!(tx_id = %payload.tx_id, "forward hook swallowed the message");
                        return Ok(());
                    }
                }
                match self.router.route(payload).await? {
                    Routed::Local(payload) => {
                        // the chosen hop died under us and nobody closer is
                        // left, so the message terminates here after all
                        self.dispatch.dispatch(payload).await?;
                        Ok(())
                    }
                    Routed::Sent(_) => Ok(()),
                }
            }
        }
    }
}

//! Binds handler addresses to local handlers and buffers traffic for
//! handlers that are not yet registered or must wait for the node to finish
//! joining.
//!
//! The address book is written once per registration at startup and read on
//! every delivery. Buffered messages are redelivered in original arrival
//! order the moment readiness is signaled or a message reaches their
//! now-registered address; when the buffer is full the oldest entry is
//! dropped with a warning.
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::message::MessagePayload;

/// Names a handler slot on every node. Protocol addresses are fixed
/// constants; applications pick their own.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Address(pub u32);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "addr:{}", self.0)
    }
}

/// A local consumer of payloads bound to one [Address].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handlers that participate in booting the node into the ring return
    /// true; everyone else waits for readiness.
    fn deliver_when_not_ready(&self) -> bool {
        false
    }

    /// A payload whose destination is the local node.
    async fn on_message(&self, payload: MessagePayload) -> Result<()>;

    /// A payload passing through on its way elsewhere. Mutate it in place if
    /// the protocol accumulates state per hop; return false to swallow it.
    async fn on_forward(&self, _payload: &mut MessagePayload) -> Result<bool> {
        Ok(true)
    }
}

/// Shared handler reference.
pub type HandlerRef = Arc<dyn MessageHandler>;

/// The per-node address book plus the not-ready buffer.
pub struct MessageDispatch {
    handlers: DashMap<Address, HandlerRef>,
    buffer: Mutex<VecDeque<MessagePayload>>,
    capacity: usize,
    ready: AtomicBool,
}

impl MessageDispatch {
    /// Create an empty dispatch with a bounded buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            handlers: DashMap::new(),
            buffer: Mutex::new(VecDeque::new()),
            capacity,
            ready: AtomicBool::new(false),
        }
    }

    /// Bind a handler to an address. Re-binding an address is almost always
    /// a wiring bug, so it is logged loudly but honored.
    pub fn register(&self, address: Address, handler: HandlerRef) {
        if self.handlers.insert(address, handler).is_some() {
            tracing::error!("registering handler for already-registered {}", address);
        }
    }

    /// Look up the handler bound to an address.
    pub fn handler_of(&self, address: Address) -> Option<HandlerRef> {
        self.handlers.get(&address).map(|h| h.value().clone())
    }

    /// Whether readiness has been signaled.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Signal readiness and redeliver everything buffered, in original
    /// order. Messages whose address still has no handler stay buffered
    /// until someone registers there.
    pub async fn set_ready(&self) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        let drained: Vec<MessagePayload> = {
            let mut buf = self.buffer.lock().map_err(|_| Error::DispatchLockFailed)?;
            buf.drain(..).collect()
        };
        let mut held: Vec<MessagePayload> = vec![];
        for payload in drained {
            let Some(address) = payload.address else {
                continue;
            };
            match self.handler_of(address) {
                Some(handler) => handler.on_message(payload).await?,
                None => held.push(payload),
            }
        }
        if !held.is_empty() {
            tracing::debug!(
                "{} buffered messages still waiting for their address to register",
                held.len()
            );
            let mut buf = self.buffer.lock().map_err(|_| Error::DispatchLockFailed)?;
            buf.extend(held);
        }
        Ok(())
    }

    /// Deliver a payload to its local handler, or buffer it while the
    /// handler is missing or must wait for readiness. Returns whether the
    /// payload was delivered.
    pub async fn dispatch(&self, payload: MessagePayload) -> Result<bool> {
        let Some(address) = payload.address else {
            tracing::error!(tx_id = %payload.tx_id, "message has no destination address");
            return Err(Error::MissingDestination);
        };

        if let Some(handler) = self.handler_of(address) {
            if handler.deliver_when_not_ready() || self.is_ready() {
                // Buffered messages for this address go first to keep order.
                for earlier in self.take_buffered(address)? {
                    handler.on_message(earlier).await?;
                }
                handler.on_message(payload).await?;
                return Ok(true);
            }
        }

        let mut buf = self.buffer.lock().map_err(|_| Error::DispatchLockFailed)?;
        if buf.len() >= self.capacity {
            if let Some(oldest) = buf.pop_front() {
                tracing::warn!(
                    tx_id = %oldest.tx_id,
                    "dispatch buffer full, dropping oldest message"
                );
            }
        }
        tracing::debug!(
            tx_id = %payload.tx_id,
            "buffering message for {} until it is deliverable",
            address
        );
        buf.push_back(payload);
        Ok(false)
    }

    fn take_buffered(&self, address: Address) -> Result<Vec<MessagePayload>> {
        let mut buf = self.buffer.lock().map_err(|_| Error::DispatchLockFailed)?;
        let mut kept = VecDeque::with_capacity(buf.len());
        let mut taken = Vec::new();
        for payload in buf.drain(..) {
            if payload.address == Some(address) {
                taken.push(payload);
            } else {
                kept.push_back(payload);
            }
        }
        *buf = kept;
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::message::Message;

    struct Recorder {
        seen: Mutex<Vec<Vec<u8>>>,
        eager: bool,
    }

    impl Recorder {
        fn new(eager: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(vec![]),
                eager,
            })
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        fn deliver_when_not_ready(&self) -> bool {
            self.eager
        }

        async fn on_message(&self, payload: MessagePayload) -> Result<()> {
            if let Message::Custom(m) = payload.data {
                self.seen.lock().unwrap().push(m.0);
            }
            Ok(())
        }
    }

    fn payload(addr: Option<Address>, tag: &[u8]) -> MessagePayload {
        let mut p = MessagePayload::new(
            Message::custom(tag),
            Address(7),
            NodeId::from(1u32),
            NodeId::from(2u32),
        );
        p.address = addr;
        p
    }

    #[tokio::test]
    async fn test_buffered_until_ready_in_order() {
        let dispatch = MessageDispatch::new(8);
        let handler = Recorder::new(false);
        dispatch.register(Address(7), handler.clone());

        assert!(!dispatch.dispatch(payload(Some(Address(7)), b"a")).await.unwrap());
        assert!(!dispatch.dispatch(payload(Some(Address(7)), b"b")).await.unwrap());
        assert!(handler.seen.lock().unwrap().is_empty());

        dispatch.set_ready().await.unwrap();
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![b"a".to_vec(), b"b".to_vec()]
        );

        // after readiness delivery is direct
        assert!(dispatch.dispatch(payload(Some(Address(7)), b"c")).await.unwrap());
        assert_eq!(handler.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_eager_handler_skips_buffer() {
        let dispatch = MessageDispatch::new(8);
        let handler = Recorder::new(true);
        dispatch.register(Address(7), handler.clone());

        assert!(dispatch.dispatch(payload(Some(Address(7)), b"x")).await.unwrap());
        assert_eq!(handler.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_message_before_registration_is_redelivered() {
        let dispatch = MessageDispatch::new(8);
        assert!(!dispatch.dispatch(payload(Some(Address(9)), b"early")).await.unwrap());

        let handler = Recorder::new(true);
        dispatch.register(Address(9), handler.clone());
        assert!(dispatch.dispatch(payload(Some(Address(9)), b"late")).await.unwrap());
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![b"early".to_vec(), b"late".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_late_registration_is_flushed_on_ready() {
        let dispatch = MessageDispatch::new(8);
        assert!(!dispatch.dispatch(payload(Some(Address(9)), b"x")).await.unwrap());

        let handler = Recorder::new(false);
        dispatch.register(Address(9), handler.clone());
        dispatch.set_ready().await.unwrap();
        assert_eq!(*handler.seen.lock().unwrap(), vec![b"x".to_vec()]);
    }

    #[tokio::test]
    async fn test_unclaimed_message_survives_readiness() {
        let dispatch = MessageDispatch::new(8);
        assert!(!dispatch.dispatch(payload(Some(Address(3)), b"ghost")).await.unwrap());
        dispatch.set_ready().await.unwrap();

        // nobody there yet, so it waits; registration plus the next message
        // bring it out in order
        let handler = Recorder::new(false);
        dispatch.register(Address(3), handler.clone());
        assert!(dispatch.dispatch(payload(Some(Address(3)), b"now")).await.unwrap());
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![b"ghost".to_vec(), b"now".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_missing_destination_rejected() {
        let dispatch = MessageDispatch::new(8);
        assert!(matches!(
            dispatch.dispatch(payload(None, b"x")).await,
            Err(Error::MissingDestination)
        ));
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let dispatch = MessageDispatch::new(2);
        let handler = Recorder::new(false);
        dispatch.register(Address(7), handler.clone());

        for tag in [b"1" as &[u8], b"2", b"3"] {
            dispatch.dispatch(payload(Some(Address(7)), tag)).await.unwrap();
        }
        dispatch.set_ready().await.unwrap();
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![b"2".to_vec(), b"3".to_vec()]
        );
    }
}

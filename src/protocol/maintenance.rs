//! Periodic background repair: leaf set exchange plus routing table row
//! exchange, on one shared timer. Failures inside a cycle are logged and
//! never stop the loop.
use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;

use crate::protocol::LeafSetProtocol;
use crate::protocol::RouteSetProtocol;

/// The maintenance driver of one node.
pub struct Maintenance {
    leafset: Arc<LeafSetProtocol>,
    routeset: Arc<RouteSetProtocol>,
    interval: Duration,
}

impl Maintenance {
    pub fn new(
        leafset: Arc<LeafSetProtocol>,
        routeset: Arc<RouteSetProtocol>,
        interval_secs: u64,
    ) -> Self {
        Self {
            leafset,
            routeset,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// One repair cycle.
    pub async fn cycle(&self) {
        if let Err(e) = self.leafset.exchange().await {
            tracing::error!("leaf set exchange failed: {}", e);
        }
        if let Err(e) = self.routeset.maintain().await {
            tracing::error!("route set maintenance failed: {}", e);
        }
    }

    /// Run cycles forever. Spawn this on the node's executor.
    pub async fn wait(self: Arc<Self>) {
        loop {
            Delay::new(self.interval).await;
            self.cycle().await;
        }
    }
}

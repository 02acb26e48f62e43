//! Shared routing state of one node: the leaf set and the routing table
//! behind their locks.
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::config::RingConfig;
use crate::dht::LeafSet;
use crate::dht::RoutingTable;
use crate::error::Error;
use crate::error::Result;
use crate::handle::HandleRef;
use crate::id::NodeId;

/// Both routing structures of a node, shareable across the router and the
/// protocol handlers. Locks are held briefly and never across awaits.
pub struct PrefixRing {
    local: HandleRef,
    base_bits: u8,
    leafset: Mutex<LeafSet>,
    table: Mutex<RoutingTable>,
}

impl PrefixRing {
    pub fn new(local: HandleRef, config: &RingConfig) -> Self {
        Self {
            local: local.clone(),
            base_bits: config.base_bits,
            leafset: Mutex::new(LeafSet::new(local.clone(), config.leaf_radius)),
            table: Mutex::new(RoutingTable::new(
                local,
                config.base_bits,
                config.route_set_size,
            )),
        }
    }

    pub fn local(&self) -> &HandleRef {
        &self.local
    }

    pub fn local_id(&self) -> NodeId {
        self.local.id()
    }

    pub fn base_bits(&self) -> u8 {
        self.base_bits
    }

    pub fn lock_leafset(&self) -> Result<MutexGuard<LeafSet>> {
        self.leafset.lock().map_err(|_| Error::LeafSetLockFailed)
    }

    pub fn lock_table(&self) -> Result<MutexGuard<RoutingTable>> {
        self.table.lock().map_err(|_| Error::RoutingTableLockFailed)
    }

    /// Offer a discovered peer to both structures.
    pub fn add_peer(&self, handle: &HandleRef) -> Result<()> {
        self.lock_leafset()?.insert(handle.clone());
        self.lock_table()?.put(handle.clone());
        Ok(())
    }

    /// Drop a failed peer from both structures.
    pub fn remove_peer(&self, id: NodeId) -> Result<()> {
        self.lock_leafset()?.remove(id);
        self.lock_table()?.remove(id);
        Ok(())
    }
}

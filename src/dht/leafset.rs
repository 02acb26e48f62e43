//! The leaf set: the L/2 numerically closest live peers on each side of the
//! local id.
//!
//! Sides are kept sorted by directional distance from the local id, nearest
//! first, so the farthest member of a side is always at the back. Correct
//! leaf sets are what make routing terminate: once a key falls inside the
//! span covered here, one more hop at most reaches the numerically closest
//! node.
use std::sync::Arc;

use crate::dht::TableListener;
use crate::handle::HandleRef;
use crate::id::NodeId;

/// Neighborhood membership around the local id.
pub struct LeafSet {
    local: HandleRef,
    radius: usize,
    cw: Vec<HandleRef>,
    ccw: Vec<HandleRef>,
    listeners: Vec<Arc<dyn TableListener>>,
}

impl LeafSet {
    /// An empty leaf set holding up to `radius` members per side.
    pub fn new(local: HandleRef, radius: usize) -> Self {
        Self {
            local,
            radius,
            cw: vec![],
            ccw: vec![],
            listeners: vec![],
        }
    }

    /// Id of the owning node.
    pub fn local_id(&self) -> NodeId {
        self.local.id()
    }

    /// Members per side.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Subscribe to membership changes.
    pub fn add_listener(&mut self, listener: Arc<dyn TableListener>) {
        self.listeners.push(listener);
    }

    /// Offer a handle for membership. A peer lands on the side it is closer
    /// to and sticks only if it is among the `radius` nearest there; the
    /// displaced farthest member is evicted. Returns whether the set changed.
    pub fn insert(&mut self, handle: HandleRef) -> bool {
        let id = handle.id();
        let base = self.local.id();
        if id == base || self.get(id).is_some() {
            return false;
        }
        let clockwise = (id - base) <= (base - id);
        let evicted = {
            let side = if clockwise { &mut self.cw } else { &mut self.ccw };
            side.push(handle.clone());
            if clockwise {
                side.sort_by(|a, b| (a.id() - base).cmp(&(b.id() - base)));
            } else {
                side.sort_by(|a, b| (base - a.id()).cmp(&(base - b.id())));
            }
            if side.len() > self.radius {
                side.pop()
            } else {
                None
            }
        };
        match evicted {
            Some(out) if out.id() == id => false,
            Some(out) => {
                tracing::debug!("leaf set evicts {} for {}", out.id(), id);
                self.notify_removed(&out);
                self.notify_added(&handle);
                true
            }
            None => {
                self.notify_added(&handle);
                true
            }
        }
    }

    /// Drop a member by id.
    pub fn remove(&mut self, id: NodeId) -> Option<HandleRef> {
        fn take(side: &mut Vec<HandleRef>, id: NodeId) -> Option<HandleRef> {
            side.iter().position(|h| h.id() == id).map(|i| side.remove(i))
        }
        let out = take(&mut self.cw, id).or_else(|| take(&mut self.ccw, id))?;
        self.notify_removed(&out);
        Some(out)
    }

    /// Find a member by id.
    pub fn get(&self, id: NodeId) -> Option<HandleRef> {
        self.members().find(|h| h.id() == id).cloned()
    }

    /// Whether `key` falls within the span covered by the current members.
    /// An empty leaf set covers the whole ring (single-node overlay).
    pub fn is_within_range(&self, key: NodeId) -> bool {
        if self.cw.is_empty() && self.ccw.is_empty() {
            return true;
        }
        let base = self.local.id();
        let cw_cover = self
            .cw
            .last()
            .map(|h| key - base <= h.id() - base)
            .unwrap_or(false);
        let ccw_cover = self
            .ccw
            .last()
            .map(|h| base - key <= base - h.id())
            .unwrap_or(false);
        cw_cover || ccw_cover
    }

    /// The usable handle numerically closest to `key`, the local node
    /// included. Faulty members never win; ties keep the local node.
    pub fn closest_to(&self, key: NodeId) -> HandleRef {
        let mut best = self.local.clone();
        let mut best_dist = self.local.id().distance(key);
        for h in self.members() {
            if !h.liveness().is_alive() {
                continue;
            }
            let d = h.id().distance(key);
            if d < best_dist {
                best = h.clone();
                best_dist = d;
            }
        }
        best
    }

    /// Both sides, clockwise first.
    pub fn members(&self) -> impl Iterator<Item = &HandleRef> {
        self.cw.iter().chain(self.ccw.iter())
    }

    /// Ids of every member.
    pub fn member_ids(&self) -> Vec<NodeId> {
        self.members().map(|h| h.id()).collect()
    }

    /// Clockwise side ids, nearest first.
    pub fn cw_ids(&self) -> Vec<NodeId> {
        self.cw.iter().map(|h| h.id()).collect()
    }

    /// Counter-clockwise side ids, nearest first.
    pub fn ccw_ids(&self) -> Vec<NodeId> {
        self.ccw.iter().map(|h| h.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.cw.len() + self.ccw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cw.is_empty() && self.ccw.is_empty()
    }

    fn notify_added(&self, handle: &HandleRef) {
        for l in &self.listeners {
            l.on_member_added(handle);
        }
    }

    fn notify_removed(&self, handle: &HandleRef) {
        for l in &self.listeners {
            l.on_member_removed(handle);
        }
    }
}

//! One routing table cell: a small ordered set of candidate handles that all
//! share the digit the cell stands for.
//!
//! Entries are kept in insertion order. When the cell is full a newcomer
//! displaces the worst-ranked entry, where rank is liveness first and
//! proximity second, and the oldest of equally bad entries goes first. The
//! local node's own entry is never displaced.
use crate::handle::HandleRef;
use crate::handle::Liveness;
use crate::id::NodeId;

/// What [RouteSet::put] did.
#[derive(Debug, Default)]
pub struct PutOutcome {
    /// Whether the newcomer was stored.
    pub added: bool,
    /// Entry displaced to make room, if any.
    pub evicted: Option<HandleRef>,
}

/// A bounded candidate cell.
pub struct RouteSet {
    local: NodeId,
    max: usize,
    entries: Vec<HandleRef>,
}

fn rank(handle: &HandleRef) -> (Liveness, u64) {
    (handle.liveness(), handle.proximity())
}

impl RouteSet {
    /// An empty cell holding up to `max` candidates.
    pub fn new(local: NodeId, max: usize) -> Self {
        Self {
            local,
            max,
            entries: vec![],
        }
    }

    /// Offer a handle. Duplicates are ignored; a full cell only accepts a
    /// newcomer ranking at least as well as its worst evictable entry.
    pub fn put(&mut self, handle: HandleRef) -> PutOutcome {
        let id = handle.id();
        if self.entries.iter().any(|h| h.id() == id) {
            return PutOutcome::default();
        }
        if self.entries.len() < self.max {
            self.entries.push(handle);
            return PutOutcome {
                added: true,
                evicted: None,
            };
        }

        let mut victim: Option<usize> = None;
        for (i, h) in self.entries.iter().enumerate() {
            if h.id() == self.local {
                continue;
            }
            match victim {
                Some(v) if rank(h) <= rank(&self.entries[v]) => {}
                _ => victim = Some(i),
            }
        }
        let Some(v) = victim else {
            return PutOutcome::default();
        };
        if rank(&handle) > rank(&self.entries[v]) {
            return PutOutcome::default();
        }
        let evicted = self.entries.remove(v);
        self.entries.push(handle);
        PutOutcome {
            added: true,
            evicted: Some(evicted),
        }
    }

    /// Drop a candidate by id.
    pub fn remove(&mut self, id: NodeId) -> Option<HandleRef> {
        self.entries
            .iter()
            .position(|h| h.id() == id)
            .map(|i| self.entries.remove(i))
    }

    /// Find a candidate by id.
    pub fn get(&self, id: NodeId) -> Option<HandleRef> {
        self.entries.iter().find(|h| h.id() == id).cloned()
    }

    /// The best usable candidate: healthiest first, then proximity-closest.
    pub fn closest_node(&self) -> Option<HandleRef> {
        self.entries
            .iter()
            .filter(|h| h.liveness().is_alive())
            .min_by_key(|h| rank(h))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandleRef> {
        self.entries.iter()
    }

    /// Ids of every candidate.
    pub fn ids(&self) -> Vec<NodeId> {
        self.entries.iter().map(|h| h.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock;

    #[test]
    fn test_fills_then_displaces_worst() {
        let local = NodeId::from(1u32);
        let mut rs = RouteSet::new(local, 2);
        let near = mock::handle_with(10, Liveness::Alive, 5);
        let far = mock::handle_with(11, Liveness::Alive, 50);
        assert!(rs.put(far.clone()).added);
        assert!(rs.put(near.clone()).added);

        // closer newcomer displaces the far entry
        let nearer = mock::handle_with(12, Liveness::Alive, 1);
        let out = rs.put(nearer);
        assert!(out.added);
        assert_eq!(out.evicted.unwrap().id(), far.id());

        // worse newcomer bounces off a full cell
        let worst = mock::handle_with(13, Liveness::Alive, 99);
        assert!(!rs.put(worst).added);
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn test_faulty_entry_goes_first() {
        let local = NodeId::from(1u32);
        let mut rs = RouteSet::new(local, 2);
        let sick = mock::handle_with(10, Liveness::Alive, 1);
        let fine = mock::handle_with(11, Liveness::Alive, 90);
        rs.put(sick.clone());
        rs.put(fine.clone());
        sick.mark_faulty();

        let out = rs.put(mock::handle_with(12, Liveness::Alive, 50));
        assert_eq!(out.evicted.unwrap().id(), sick.id());
        assert!(rs.get(fine.id()).is_some());
    }

    #[test]
    fn test_self_entry_survives() {
        let local = NodeId::from(1u32);
        let mut rs = RouteSet::new(local, 1);
        let me = mock::handle_with(1, Liveness::Alive, 0);
        me.mark_suspected();
        rs.put(me);

        let out = rs.put(mock::handle_with(10, Liveness::Alive, 1));
        assert!(!out.added);
        assert_eq!(rs.ids(), vec![local]);
    }

    #[test]
    fn test_oldest_of_equals_goes_first() {
        let local = NodeId::from(1u32);
        let mut rs = RouteSet::new(local, 2);
        let older = mock::handle_with(10, Liveness::Alive, 7);
        let newer = mock::handle_with(11, Liveness::Alive, 7);
        rs.put(older.clone());
        rs.put(newer.clone());

        let out = rs.put(mock::handle_with(12, Liveness::Alive, 7));
        assert_eq!(out.evicted.unwrap().id(), older.id());
        assert!(rs.get(newer.id()).is_some());
    }

    #[test]
    fn test_closest_prefers_health_then_proximity() {
        let local = NodeId::from(1u32);
        let mut rs = RouteSet::new(local, 3);
        let close_suspected = mock::handle_with(10, Liveness::Suspected, 1);
        let far_alive = mock::handle_with(11, Liveness::Alive, 80);
        let dead = mock::handle_with(12, Liveness::Faulty, 0);
        rs.put(close_suspected.clone());
        rs.put(far_alive.clone());
        rs.put(dead);

        assert_eq!(rs.closest_node().unwrap().id(), far_alive.id());
        far_alive.mark_faulty();
        assert_eq!(rs.closest_node().unwrap().id(), close_suspected.id());
        close_suspected.mark_faulty();
        assert!(rs.closest_node().is_none());
    }
}

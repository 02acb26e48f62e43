//! The prefix routing table: one row per digit position, one cell per digit
//! value, each cell a [RouteSet] of candidates.
//!
//! Row numbering follows digit extraction: row 0 is the least significant
//! digit, so long-distance hops resolve high rows first. A handle lives in
//! exactly one cell, fixed by the most significant digit where its id
//! disagrees with the local id. Each row is seeded at construction with the
//! local node's own entry at its own digit, which makes row exchanges
//! propagate the local id for free.
use std::collections::HashSet;
use std::sync::Arc;

use crate::dht::RouteSet;
use crate::dht::TableListener;
use crate::handle::HandleRef;
use crate::handle::Liveness;
use crate::id::Distance;
use crate::id::NodeId;

/// Per-node prefix routing state.
pub struct RoutingTable {
    local: HandleRef,
    base_bits: u8,
    max_entries: usize,
    rows: Vec<Vec<Option<RouteSet>>>,
    listeners: Vec<Arc<dyn TableListener>>,
}

impl RoutingTable {
    /// A fresh table with self-entries seeded in every row.
    pub fn new(local: HandleRef, base_bits: u8, max_entries: usize) -> Self {
        let num_rows = NodeId::num_digits(base_bits);
        let num_cols = 1usize << base_bits;
        let local_id = local.id();
        let mut rows: Vec<Vec<Option<RouteSet>>> = (0..num_rows)
            .map(|_| (0..num_cols).map(|_| None).collect())
            .collect();
        for (r, row) in rows.iter_mut().enumerate() {
            let col = local_id.digit(r, base_bits) as usize;
            let mut cell = RouteSet::new(local_id, max_entries);
            cell.put(local.clone());
            row[col] = Some(cell);
        }
        Self {
            local,
            base_bits,
            max_entries,
            rows,
            listeners: vec![],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        1usize << self.base_bits
    }

    /// Subscribe to membership changes.
    pub fn add_listener(&mut self, listener: Arc<dyn TableListener>) {
        self.listeners.push(listener);
    }

    fn position_of(&self, id: NodeId) -> Option<(usize, usize)> {
        let row = self.local.id().index_of_msdd(id, self.base_bits)?;
        Some((row, id.digit(row, self.base_bits) as usize))
    }

    /// Offer a handle to its cell. The local id itself has no cell and is
    /// rejected. Returns whether the table changed.
    pub fn put(&mut self, handle: HandleRef) -> bool {
        let Some((row, col)) = self.position_of(handle.id()) else {
            return false;
        };
        let local_id = self.local.id();
        let max = self.max_entries;
        let out = self.rows[row][col]
            .get_or_insert_with(|| RouteSet::new(local_id, max))
            .put(handle.clone());
        if let Some(evicted) = &out.evicted {
            self.notify_removed(evicted);
        }
        if out.added {
            self.notify_added(&handle);
        }
        out.added
    }

    /// Drop an entry by id.
    pub fn remove(&mut self, id: NodeId) -> Option<HandleRef> {
        let (row, col) = self.position_of(id)?;
        let out = self.rows[row][col].as_mut()?.remove(id)?;
        self.notify_removed(&out);
        Some(out)
    }

    /// Find an entry by id.
    pub fn get(&self, id: NodeId) -> Option<HandleRef> {
        let (row, col) = self.position_of(id)?;
        self.rows[row][col].as_ref()?.get(id)
    }

    /// The cell a key resolves to: the row of the most significant
    /// disagreeing digit, at the key's digit there. `None` when the key is
    /// the local id or the cell is empty.
    pub fn best_entry(&self, key: NodeId) -> Option<&RouteSet> {
        let row = self.local.id().index_of_msdd(key, self.base_bits)?;
        let col = key.digit(row, self.base_bits) as usize;
        self.rows[row][col].as_ref()
    }

    /// Scan the key's row outward from the key's digit, both directions at
    /// once, for an entry at most `min_liveness` sick and strictly closer to
    /// `key` on the ring than the local node. The scan stops once it passes
    /// the local node's own digit.
    pub fn best_alternate_route(&self, min_liveness: Liveness, key: NodeId) -> Option<HandleRef> {
        let row = self.local.id().index_of_msdd(key, self.base_bits)?;
        let cols = self.num_cols();
        let key_digit = key.digit(row, self.base_bits) as usize;
        let my_digit = self.local.id().digit(row, self.base_bits) as usize;

        let mut best: Distance = self.local.id().distance(key);
        let mut alt: Option<HandleRef> = None;
        let mut finished = false;
        let mut i = 1;
        while !finished {
            for j in 0..2 {
                let digit = if j == 0 {
                    (key_digit + i) % cols
                } else {
                    (key_digit + cols - (i % cols)) % cols
                };
                if let Some(cell) = &self.rows[row][digit] {
                    for h in cell.iter() {
                        if h.liveness() > min_liveness {
                            continue;
                        }
                        let d = h.id().distance(key);
                        if d < best {
                            best = d;
                            alt = Some(h.clone());
                        }
                    }
                }
                if digit == my_digit {
                    finished = true;
                }
            }
            i += 1;
        }
        alt
    }

    /// Up to `max` usable entries from the key's row that are strictly
    /// closer to `key` than the local node, nearest cells first. The key's
    /// own cell is included in the scan.
    pub fn alternate_routes(&self, key: NodeId, max: usize) -> Vec<HandleRef> {
        let mut found: Vec<HandleRef> = vec![];
        let Some(row) = self.local.id().index_of_msdd(key, self.base_bits) else {
            return found;
        };
        let cols = self.num_cols();
        let key_digit = key.digit(row, self.base_bits) as usize;
        let my_digit = self.local.id().digit(row, self.base_bits) as usize;
        let local_dist = self.local.id().distance(key);

        let mut finished = false;
        let mut i = 0;
        while !finished && found.len() < max {
            for j in 0..2 {
                let digit = if j == 0 {
                    (key_digit + i) % cols
                } else {
                    (key_digit + cols - (i % cols)) % cols
                };
                if let Some(cell) = &self.rows[row][digit] {
                    for h in cell.iter() {
                        if !h.liveness().is_alive() {
                            continue;
                        }
                        if h.id().distance(key) >= local_dist {
                            continue;
                        }
                        if found.iter().all(|f| f.id() != h.id()) {
                            found.push(h.clone());
                        }
                    }
                }
                if digit == my_digit {
                    finished = true;
                }
            }
            i += 1;
        }
        found.truncate(max);
        found
    }

    /// Direct cell access.
    pub fn cell(&self, row: usize, col: usize) -> Option<&RouteSet> {
        self.rows.get(row)?.get(col)?.as_ref()
    }

    /// All ids stored in one row, self-entry included.
    pub fn row_ids(&self, row: usize) -> Option<Vec<NodeId>> {
        let cells = self.rows.get(row)?;
        Some(
            cells
                .iter()
                .flatten()
                .flat_map(|cell| cell.ids())
                .collect(),
        )
    }

    /// Total entries stored, self-entries included.
    pub fn num_entries(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter().flatten())
            .map(|cell| cell.len())
            .sum()
    }

    /// Distinct ids stored.
    pub fn num_unique(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter().flatten())
            .flat_map(|cell| cell.ids())
            .collect::<HashSet<_>>()
            .len()
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

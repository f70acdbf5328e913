//! Uniform hash grid mapping bounding boxes to entity keys.

use std::collections::{hash_map::Entry, HashMap, HashSet};

use crate::geometry::BoundingBox;

use super::entity::EntityKey;

/// Cell size in world units (roughly two player widths).
pub const CELL_SIZE: i32 = 64;

type Cell = (i32, i32);

/// Region-query structure over entity boxes. Only the entity store touches it,
/// so every insert and remove is paired with the store's own record of the box.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    cells: HashMap<Cell, HashMap<EntityKey, BoundingBox>>,
    len: usize,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, key: EntityKey, bbox: BoundingBox) {
        let mut fresh = true;
        for cell in cells_covering(&bbox) {
            if self.cells.entry(cell).or_default().insert(key, bbox).is_some() {
                fresh = false;
            }
        }
        if fresh {
            self.len += 1;
        }
    }

    /// Removes `key` from every cell `bbox` covers. Returns false when no entry
    /// with exactly that box was stored, leaving the index untouched.
    pub fn remove(&mut self, key: EntityKey, bbox: BoundingBox) -> bool {
        let mut removed = false;
        for cell in cells_covering(&bbox) {
            if let Entry::Occupied(mut entry) = self.cells.entry(cell) {
                if entry.get().get(&key) == Some(&bbox) {
                    entry.get_mut().remove(&key);
                    removed = true;
                }
                if entry.get().is_empty() {
                    entry.remove_entry();
                }
            }
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Keys whose stored box overlaps `bbox`, in no particular order.
    pub fn intersect(&self, bbox: &BoundingBox) -> HashSet<EntityKey> {
        let mut found = HashSet::new();
        let mut collect = |entries: &HashMap<EntityKey, BoundingBox>| {
            for (key, stored) in entries {
                if stored.intersects(bbox) {
                    found.insert(*key);
                }
            }
        };

        // Huge query boxes would visit mostly empty cells; walk the occupied ones instead.
        if cell_count(bbox) > self.cells.len() as u64 {
            let (min, max) = (cell_of(bbox.x_min, bbox.y_min), cell_of(bbox.x_max, bbox.y_max));
            for ((cx, cy), entries) in &self.cells {
                if (min.0..=max.0).contains(cx) && (min.1..=max.1).contains(cy) {
                    collect(entries);
                }
            }
        } else {
            for cell in cells_covering(bbox) {
                if let Some(entries) = self.cells.get(&cell) {
                    collect(entries);
                }
            }
        }
        found
    }
}

fn cell_of(x: i32, y: i32) -> Cell {
    (x.div_euclid(CELL_SIZE), y.div_euclid(CELL_SIZE))
}

fn cell_count(bbox: &BoundingBox) -> u64 {
    let (min, max) = (cell_of(bbox.x_min, bbox.y_min), cell_of(bbox.x_max, bbox.y_max));
    let columns = (max.0 as i64 - min.0 as i64 + 1).max(0) as u64;
    let rows = (max.1 as i64 - min.1 as i64 + 1).max(0) as u64;
    columns.saturating_mul(rows)
}

fn cells_covering(bbox: &BoundingBox) -> impl Iterator<Item = Cell> {
    let (min, max) = (cell_of(bbox.x_min, bbox.y_min), cell_of(bbox.x_max, bbox.y_max));
    (min.0..=max.0).flat_map(move |cx| (min.1..=max.1).map(move |cy| (cx, cy)))
}

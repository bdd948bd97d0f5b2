//! Spatial grid index for proximity and collision queries
//!
//! Positions map to discrete square cells. Membership is coarse: a region
//! query returns every object whose cell intersects the bounds, and callers
//! still do fine-grained distance checks on the results.

use std::collections::{HashMap, HashSet};

use crate::ws::protocol::ObjectId;

/// Default cell edge length in world units
pub const DEFAULT_CELL_SIZE: f32 = 16.0;

/// Discrete cell coordinate
pub type Cell = (i32, i32);

/// Axis-aligned query bounds
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Aabb {
    pub fn around(x: f32, y: f32, radius: f32) -> Self {
        Self {
            min_x: x - radius,
            min_y: y - radius,
            max_x: x + radius,
            max_y: y + radius,
        }
    }
}

/// Maps cell coordinates to the set of object ids currently in that cell
pub struct Grid {
    cell_size: f32,
    cells: HashMap<Cell, HashSet<ObjectId>>,
}

impl Grid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    /// Cell coordinate for a world position
    pub fn cell_for(&self, x: f32, y: f32) -> Cell {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Insert an object at a position, returning its cell
    pub fn insert(&mut self, id: ObjectId, x: f32, y: f32) -> Cell {
        let cell = self.cell_for(x, y);
        self.cells.entry(cell).or_default().insert(id);
        cell
    }

    /// Move an object to a new position. Returns the new cell; a no-op when
    /// the position stays within the old cell, so repeated moves within one
    /// tick are idempotent.
    pub fn relocate(&mut self, id: ObjectId, old_cell: Cell, x: f32, y: f32) -> Cell {
        let new_cell = self.cell_for(x, y);
        if new_cell == old_cell {
            return old_cell;
        }
        self.remove(id, old_cell);
        self.cells.entry(new_cell).or_default().insert(id);
        new_cell
    }

    /// Remove an object from its cell
    pub fn remove(&mut self, id: ObjectId, cell: Cell) {
        if let Some(members) = self.cells.get_mut(&cell) {
            members.remove(&id);
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// All object ids whose cells intersect the bounds
    pub fn query_region(&self, bounds: Aabb) -> Vec<ObjectId> {
        let (min_cx, min_cy) = self.cell_for(bounds.min_x, bounds.min_y);
        let (max_cx, max_cy) = self.cell_for(bounds.max_x, bounds.max_y);

        let mut out = Vec::new();
        for cx in min_cx..=max_cx {
            for cy in min_cy..=max_cy {
                if let Some(members) = self.cells.get(&(cx, cy)) {
                    out.extend(members.iter().copied());
                }
            }
        }
        out
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_query() {
        let mut grid = Grid::new(10.0);
        grid.insert(1, 5.0, 5.0);
        grid.insert(2, 55.0, 5.0);

        let near = grid.query_region(Aabb::around(5.0, 5.0, 8.0));
        assert!(near.contains(&1));
        assert!(!near.contains(&2));

        let wide = grid.query_region(Aabb::around(30.0, 5.0, 40.0));
        assert!(wide.contains(&1));
        assert!(wide.contains(&2));
    }

    #[test]
    fn relocate_within_cell_is_idempotent() {
        let mut grid = Grid::new(10.0);
        let cell = grid.insert(7, 1.0, 1.0);
        let same = grid.relocate(7, cell, 2.0, 3.0);
        assert_eq!(cell, same);
        assert_eq!(grid.occupied_cells(), 1);
    }

    #[test]
    fn relocate_across_cells_moves_membership() {
        let mut grid = Grid::new(10.0);
        let cell = grid.insert(7, 1.0, 1.0);
        let new_cell = grid.relocate(7, cell, 25.0, 1.0);
        assert_ne!(cell, new_cell);

        let old_region = grid.query_region(Aabb::around(1.0, 1.0, 2.0));
        assert!(old_region.is_empty());
        let new_region = grid.query_region(Aabb::around(25.0, 1.0, 2.0));
        assert_eq!(new_region, vec![7]);
    }

    #[test]
    fn remove_clears_empty_cells() {
        let mut grid = Grid::new(10.0);
        let cell = grid.insert(3, 0.0, 0.0);
        grid.remove(3, cell);
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn negative_coordinates_get_distinct_cells() {
        let grid = Grid::new(10.0);
        assert_ne!(grid.cell_for(-1.0, 0.0), grid.cell_for(1.0, 0.0));
    }
}

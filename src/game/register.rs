//! Object register - the entity ledger behind incremental wire updates
//!
//! Every live simulation object has exactly one entry tracking its kind and
//! cell membership. Mutations accumulate into created/dirty/deleted sets
//! that are drained once per network sync cycle, so any number of
//! simulation ticks between syncs collapse into a single increment.

use std::collections::{HashMap, HashSet};

use crate::game::grid::{Aabb, Cell, Grid};
use crate::ws::protocol::{FullObjectData, ObjectId, PartObjectData};

/// Category tag carried by every registered object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    Player = 1,
    Projectile = 2,
    Loot = 3,
    Decal = 4,
    Smoke = 5,
    Airdrop = 6,
    DeadBody = 7,
    Plane = 8,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: ObjectKind,
    cell: Cell,
    x: f32,
    y: f32,
    alive: bool,
}

/// One drained sync increment. The three sets are disjoint: an id appears
/// in at most one of them per flush.
#[derive(Debug, Default)]
pub struct RegisterIncrement {
    pub created: Vec<FullObjectData>,
    pub dirty: Vec<PartObjectData>,
    pub deleted: Vec<ObjectId>,
}

pub struct ObjectRegister {
    grid: Grid,
    next_id: ObjectId,
    entries: HashMap<ObjectId, Entry>,
    created: HashSet<ObjectId>,
    dirty: HashSet<ObjectId>,
    deleted: HashSet<ObjectId>,
}

impl ObjectRegister {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: Grid::new(cell_size),
            next_id: 1,
            entries: HashMap::new(),
            created: HashSet::new(),
            dirty: HashSet::new(),
            deleted: HashSet::new(),
        }
    }

    /// Register a new object, assigning its id and cell membership and
    /// marking it for a full snapshot on the next sync
    pub fn register(&mut self, kind: ObjectKind, x: f32, y: f32) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;

        let cell = self.grid.insert(id, x, y);
        self.entries.insert(
            id,
            Entry {
                kind,
                cell,
                x,
                y,
                alive: true,
            },
        );
        self.created.insert(id);
        id
    }

    /// Update an object's position, moving cell membership if the cell
    /// changed and marking it dirty
    pub fn move_to(&mut self, id: ObjectId, x: f32, y: f32) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if !entry.alive {
                return;
            }
            entry.cell = self.grid.relocate(id, entry.cell, x, y);
            entry.x = x;
            entry.y = y;
            self.dirty.insert(id);
        }
    }

    /// Mark an object's non-positional state as changed this tick
    pub fn set_dirty(&mut self, id: ObjectId) {
        if self.entries.get(&id).map(|e| e.alive).unwrap_or(false) {
            self.dirty.insert(id);
        }
    }

    /// Remove an object from its cell and mark it deleted
    pub fn unregister(&mut self, id: ObjectId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if !entry.alive {
                return;
            }
            entry.alive = false;
            self.deleted.insert(id);
        }
        if let Some(entry) = self.entries.get(&id) {
            self.grid.remove(id, entry.cell);
        }
    }

    /// All object ids whose cells intersect the bounds. Coarse: callers do
    /// their own distance checks on the results.
    pub fn query_region(&self, bounds: Aabb) -> Vec<ObjectId> {
        self.grid.query_region(bounds)
    }

    pub fn kind_of(&self, id: ObjectId) -> Option<ObjectKind> {
        self.entries.get(&id).map(|e| e.kind)
    }

    pub fn position_of(&self, id: ObjectId) -> Option<(f32, f32)> {
        self.entries.get(&id).map(|e| (e.x, e.y))
    }

    /// Drain the accumulated increment for one sync cycle.
    ///
    /// An object both created and deleted since the previous flush is
    /// emitted as created now and as deleted on the following flush, so its
    /// existence is visible to clients for exactly one sync.
    pub fn serialize_increment(&mut self) -> RegisterIncrement {
        let mut inc = RegisterIncrement::default();

        let created: Vec<ObjectId> = self.created.drain().collect();
        for id in &created {
            if let Some(entry) = self.entries.get(id) {
                inc.created.push(FullObjectData {
                    id: *id,
                    kind: entry.kind as u8,
                    x: entry.x,
                    y: entry.y,
                });
            }
        }

        // Deletions of objects already announced as created go out now;
        // deletions of objects announced in this same flush are deferred.
        let mut deferred = HashSet::new();
        for id in self.deleted.drain() {
            if created.contains(&id) {
                deferred.insert(id);
            } else {
                inc.deleted.push(id);
                self.entries.remove(&id);
            }
        }
        self.deleted = deferred;

        for id in self.dirty.drain() {
            if created.contains(&id) {
                continue;
            }
            if let Some(entry) = self.entries.get(&id) {
                if entry.alive {
                    inc.dirty.push(PartObjectData {
                        id,
                        x: entry.x,
                        y: entry.y,
                    });
                }
            }
        }

        inc
    }
}

impl Default for ObjectRegister {
    fn default() -> Self {
        Self::new(crate::game::grid::DEFAULT_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(inc: &[FullObjectData]) -> Vec<ObjectId> {
        inc.iter().map(|o| o.id).collect()
    }

    #[test]
    fn register_then_flush_yields_only_created() {
        let mut reg = ObjectRegister::default();
        let a = reg.register(ObjectKind::Player, 1.0, 1.0);
        let b = reg.register(ObjectKind::Loot, 2.0, 2.0);
        let c = reg.register(ObjectKind::Projectile, 3.0, 3.0);

        let inc = reg.serialize_increment();
        let created = ids(&inc.created);
        assert_eq!(created.len(), 3);
        assert!(created.contains(&a) && created.contains(&b) && created.contains(&c));
        assert!(inc.dirty.is_empty());
        assert!(inc.deleted.is_empty());
        assert_eq!(reg.kind_of(b), Some(ObjectKind::Loot));
    }

    #[test]
    fn unregister_after_flush_appears_deleted_next_flush() {
        let mut reg = ObjectRegister::default();
        let a = reg.register(ObjectKind::Player, 1.0, 1.0);
        let _ = reg.serialize_increment();

        reg.unregister(a);
        let inc = reg.serialize_increment();
        assert_eq!(inc.deleted, vec![a]);
        assert!(ids(&inc.created).is_empty());
    }

    #[test]
    fn created_and_deleted_same_interval_visible_one_flush() {
        let mut reg = ObjectRegister::default();
        let a = reg.register(ObjectKind::Projectile, 0.0, 0.0);
        reg.unregister(a);

        let first = reg.serialize_increment();
        assert_eq!(ids(&first.created), vec![a]);
        assert!(first.deleted.is_empty());

        let second = reg.serialize_increment();
        assert!(second.created.is_empty());
        assert_eq!(second.deleted, vec![a]);
    }

    #[test]
    fn sets_are_disjoint_within_one_flush() {
        let mut reg = ObjectRegister::default();
        let a = reg.register(ObjectKind::Player, 1.0, 1.0);
        let _ = reg.serialize_increment();

        reg.move_to(a, 5.0, 5.0);
        reg.unregister(a);

        let inc = reg.serialize_increment();
        assert!(inc.created.is_empty());
        assert!(inc.dirty.is_empty());
        assert_eq!(inc.deleted, vec![a]);
    }

    #[test]
    fn multiple_ticks_collapse_into_one_dirty_entry() {
        let mut reg = ObjectRegister::default();
        let a = reg.register(ObjectKind::Player, 0.0, 0.0);
        let _ = reg.serialize_increment();

        reg.move_to(a, 1.0, 0.0);
        reg.move_to(a, 2.0, 0.0);
        reg.move_to(a, 3.0, 0.0);

        let inc = reg.serialize_increment();
        assert_eq!(inc.dirty.len(), 1);
        assert_eq!(inc.dirty[0].x, 3.0);
    }

    #[test]
    fn newly_created_not_also_dirty() {
        let mut reg = ObjectRegister::default();
        let a = reg.register(ObjectKind::Player, 0.0, 0.0);
        reg.move_to(a, 4.0, 0.0);

        let inc = reg.serialize_increment();
        assert_eq!(ids(&inc.created), vec![a]);
        assert!(inc.dirty.is_empty());
        // the created snapshot carries the latest position
        assert_eq!(inc.created[0].x, 4.0);
    }

    #[test]
    fn query_region_tracks_moves() {
        let mut reg = ObjectRegister::new(10.0);
        let a = reg.register(ObjectKind::Loot, 5.0, 5.0);
        reg.move_to(a, 105.0, 5.0);

        assert!(reg.query_region(Aabb::around(5.0, 5.0, 3.0)).is_empty());
        assert_eq!(reg.query_region(Aabb::around(105.0, 5.0, 3.0)), vec![a]);
        assert_eq!(reg.position_of(a), Some((105.0, 5.0)));
    }
}

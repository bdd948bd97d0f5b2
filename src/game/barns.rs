//! Category-specific entity collections ("barns")
//!
//! Each barn owns one kind of simulation object, registers and unregisters
//! it through the object ledger, and advances it every tick. Entity
//! behaviors stay deliberately thin here; ballistics, loot tables and AI
//! are collaborator concerns layered on top of these lifecycles.

use crate::game::player::PlayerId;
use crate::game::register::{ObjectKind, ObjectRegister};
use crate::ws::protocol::{ExplosionData, ObjectId};

// ---------------------------------------------------------------------------
// Projectiles
// ---------------------------------------------------------------------------

pub struct Projectile {
    pub id: ObjectId,
    pub owner: PlayerId,
    pub x: f32,
    pub y: f32,
    pub dir: f32,
    pub speed: f32,
    pub lifetime: f32,
}

#[derive(Default)]
pub struct ProjectileBarn {
    projectiles: Vec<Projectile>,
}

impl ProjectileBarn {
    pub fn spawn(
        &mut self,
        register: &mut ObjectRegister,
        owner: PlayerId,
        x: f32,
        y: f32,
        dir: f32,
        speed: f32,
        lifetime: f32,
    ) -> ObjectId {
        let id = register.register(ObjectKind::Projectile, x, y);
        self.projectiles.push(Projectile {
            id,
            owner,
            x,
            y,
            dir,
            speed,
            lifetime,
        });
        id
    }

    pub fn update(&mut self, dt: f32, register: &mut ObjectRegister) {
        for p in &mut self.projectiles {
            p.lifetime -= dt;
            if p.lifetime <= 0.0 {
                register.unregister(p.id);
                continue;
            }
            p.x += p.dir.cos() * p.speed * dt;
            p.y += p.dir.sin() * p.speed * dt;
            register.move_to(p.id, p.x, p.y);
        }
        self.projectiles.retain(|p| p.lifetime > 0.0);
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }
}

// ---------------------------------------------------------------------------
// Loot
// ---------------------------------------------------------------------------

pub struct Loot {
    pub id: ObjectId,
    pub item: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Default)]
pub struct LootBarn {
    loot: Vec<Loot>,
}

impl LootBarn {
    pub fn spawn(&mut self, register: &mut ObjectRegister, item: String, x: f32, y: f32) -> ObjectId {
        let id = register.register(ObjectKind::Loot, x, y);
        self.loot.push(Loot { id, item, x, y });
        id
    }

    pub fn remove(&mut self, register: &mut ObjectRegister, id: ObjectId) {
        if let Some(pos) = self.loot.iter().position(|l| l.id == id) {
            register.unregister(id);
            self.loot.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.loot.len()
    }
}

// ---------------------------------------------------------------------------
// Explosions (pure one-shot events, never registered objects)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ExplosionBarn {
    pending: Vec<ExplosionData>,
}

impl ExplosionBarn {
    pub fn spawn(&mut self, x: f32, y: f32, radius: f32) {
        self.pending.push(ExplosionData { x, y, radius });
    }

    /// Drain events accumulated since the last sync
    pub fn flush(&mut self) -> Vec<ExplosionData> {
        std::mem::take(&mut self.pending)
    }
}

// ---------------------------------------------------------------------------
// Timed decorations: smoke clouds and ground decals
// ---------------------------------------------------------------------------

struct TimedObject {
    id: ObjectId,
    ttl: f32,
}

/// Shared shape for barns whose objects only exist for a fixed duration
#[derive(Default)]
pub struct TimedBarn {
    kind_objects: Vec<TimedObject>,
}

impl TimedBarn {
    pub fn spawn(
        &mut self,
        register: &mut ObjectRegister,
        kind: ObjectKind,
        x: f32,
        y: f32,
        ttl: f32,
    ) -> ObjectId {
        let id = register.register(kind, x, y);
        self.kind_objects.push(TimedObject { id, ttl });
        id
    }

    pub fn update(&mut self, dt: f32, register: &mut ObjectRegister) {
        for o in &mut self.kind_objects {
            o.ttl -= dt;
            if o.ttl <= 0.0 {
                register.unregister(o.id);
            }
        }
        self.kind_objects.retain(|o| o.ttl > 0.0);
    }

    pub fn len(&self) -> usize {
        self.kind_objects.len()
    }
}

// ---------------------------------------------------------------------------
// Dead bodies
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DeadBodyBarn {
    bodies: Vec<ObjectId>,
}

impl DeadBodyBarn {
    pub fn spawn(&mut self, register: &mut ObjectRegister, x: f32, y: f32) -> ObjectId {
        let id = register.register(ObjectKind::DeadBody, x, y);
        self.bodies.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }
}

// ---------------------------------------------------------------------------
// Airdrops and their delivery planes
// ---------------------------------------------------------------------------

struct Airdrop {
    id: ObjectId,
    x: f32,
    y: f32,
    /// Seconds until the crate lands and becomes loot
    fall_time: f32,
}

#[derive(Default)]
pub struct AirdropBarn {
    drops: Vec<Airdrop>,
}

impl AirdropBarn {
    pub fn spawn(&mut self, register: &mut ObjectRegister, x: f32, y: f32, fall_time: f32) -> ObjectId {
        let id = register.register(ObjectKind::Airdrop, x, y);
        self.drops.push(Airdrop {
            id,
            x,
            y,
            fall_time,
        });
        id
    }

    /// Advance falling crates; landed crates convert to loot
    pub fn update(&mut self, dt: f32, register: &mut ObjectRegister, loot: &mut LootBarn) {
        for d in &mut self.drops {
            d.fall_time -= dt;
            if d.fall_time <= 0.0 {
                register.unregister(d.id);
                loot.spawn(register, "airdrop_crate".to_string(), d.x, d.y);
            }
        }
        self.drops.retain(|d| d.fall_time > 0.0);
    }

    pub fn len(&self) -> usize {
        self.drops.len()
    }
}

struct Plane {
    id: ObjectId,
    x: f32,
    y: f32,
    dir: f32,
    remaining: f32,
}

const PLANE_SPEED: f32 = 60.0;

#[derive(Default)]
pub struct PlaneBarn {
    planes: Vec<Plane>,
}

impl PlaneBarn {
    pub fn spawn(
        &mut self,
        register: &mut ObjectRegister,
        x: f32,
        y: f32,
        dir: f32,
        flight_secs: f32,
    ) -> ObjectId {
        let id = register.register(ObjectKind::Plane, x, y);
        self.planes.push(Plane {
            id,
            x,
            y,
            dir,
            remaining: flight_secs,
        });
        id
    }

    pub fn update(&mut self, dt: f32, register: &mut ObjectRegister) {
        for p in &mut self.planes {
            p.remaining -= dt;
            if p.remaining <= 0.0 {
                register.unregister(p.id);
                continue;
            }
            p.x += p.dir.cos() * PLANE_SPEED * dt;
            p.y += p.dir.sin() * PLANE_SPEED * dt;
            register.move_to(p.id, p.x, p.y);
        }
        self.planes.retain(|p| p.remaining > 0.0);
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use chisel_types::Vec3d;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::generator::ChunkGenerator;
use crate::store::ChunkStore;

/// First entity id handed to players.
const FIRST_PLAYER_ID: i32 = 1;
/// First entity id handed to non-player entities.
const FIRST_ENTITY_ID: i32 = 1000;

/// A tracked entity. Players are the only concrete kind the core spawns, but
/// the record is shaped for any entity_type registry id.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: i32,
    pub uuid: Uuid,
    pub entity_type: i32,
    pub position: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
    pub velocity: Vec3d,
}

/// The shared world: chunk store, entity table and time counters. Ids are
/// never reused for the lifetime of the process.
pub struct World {
    store: ChunkStore,
    entities: RwLock<HashMap<i32, Entity>>,
    next_player_id: AtomicI32,
    next_entity_id: AtomicI32,
    world_age: AtomicI64,
    time_of_day: AtomicI64,
}

impl World {
    pub fn new(generator: Arc<dyn ChunkGenerator>) -> Self {
        Self {
            store: ChunkStore::new(generator),
            entities: RwLock::new(HashMap::new()),
            next_player_id: AtomicI32::new(FIRST_PLAYER_ID),
            next_entity_id: AtomicI32::new(FIRST_ENTITY_ID),
            world_age: AtomicI64::new(0),
            time_of_day: AtomicI64::new(0),
        }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn allocate_player_id(&self) -> i32 {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn allocate_entity_id(&self) -> i32 {
        self.next_entity_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_entity(&self, entity: Entity) {
        self.entities.write().insert(entity.id, entity);
    }

    pub fn remove_entity(&self, id: i32) -> Option<Entity> {
        self.entities.write().remove(&id)
    }

    pub fn entity(&self, id: i32) -> Option<Entity> {
        self.entities.read().get(&id).cloned()
    }

    pub fn update_entity_pose(
        &self,
        id: i32,
        position: Vec3d,
        yaw: f32,
        pitch: f32,
        head_yaw: f32,
    ) {
        if let Some(entity) = self.entities.write().get_mut(&id) {
            entity.position = position;
            entity.yaw = yaw;
            entity.pitch = pitch;
            entity.head_yaw = head_yaw;
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Advance world time by one tick, returning (age, time of day).
    pub fn tick_time(&self) -> (i64, i64) {
        let age = self.world_age.fetch_add(1, Ordering::Relaxed) + 1;
        let time = self.time_of_day.load(Ordering::Relaxed);
        let next = (time + 1) % 24000;
        self.time_of_day.store(next, Ordering::Relaxed);
        (age, next)
    }

    pub fn time(&self) -> (i64, i64) {
        (
            self.world_age.load(Ordering::Relaxed),
            self.time_of_day.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;

    fn world() -> World {
        World::new(Arc::new(FlatGenerator::new()))
    }

    #[test]
    fn test_player_ids_allocate_from_one() {
        let world = world();
        assert_eq!(world.allocate_player_id(), 1);
        assert_eq!(world.allocate_player_id(), 2);
        // Non-player ids come from a separate range and never collide.
        assert_eq!(world.allocate_entity_id(), 1000);
        assert_eq!(world.allocate_entity_id(), 1001);
        assert_eq!(world.allocate_player_id(), 3);
    }

    #[test]
    fn test_entity_table() {
        let world = world();
        let id = world.allocate_player_id();
        world.add_entity(Entity {
            id,
            uuid: Uuid::new_v4(),
            entity_type: chisel_data::entity_types::PLAYER,
            position: Vec3d::new(0.0, 65.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            head_yaw: 0.0,
            velocity: Vec3d::ZERO,
        });
        assert_eq!(world.entity_count(), 1);
        world.update_entity_pose(id, Vec3d::new(5.0, 65.0, 0.0), 90.0, 0.0, 90.0);
        let entity = world.entity(id).unwrap();
        assert_eq!(entity.position.x, 5.0);
        assert_eq!(entity.yaw, 90.0);
        assert!(world.remove_entity(id).is_some());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_time_wraps_at_24000() {
        let world = world();
        for _ in 0..23_999 {
            world.tick_time();
        }
        let (age, time) = world.tick_time();
        assert_eq!(age, 24_000);
        assert_eq!(time, 0);
    }
}

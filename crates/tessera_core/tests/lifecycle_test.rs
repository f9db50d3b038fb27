//! Integration test for entity and component lifecycles.

use std::any::Any;
use std::sync::Arc;

use tessera_core::{
    AllocationTag, Component, EntityId, HeapArena, MemoryArena, MemoryBudget, PoolConfig, StoreConfig, StoreError,
    World,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

#[derive(Debug, PartialEq)]
struct Health(i32);

struct Damage(i32);
struct Heal(i32);

impl Component for Health {
    fn receive(&mut self, event: &dyn Any) {
        if let Some(Damage(amount)) = event.downcast_ref::<Damage>() {
            self.0 -= amount;
        } else if let Some(Heal(amount)) = event.downcast_ref::<Heal>() {
            self.0 += amount;
        }
    }
}

fn small_config() -> StoreConfig {
    let pool = PoolConfig {
        chunk_slots: 8,
        initial_slots: 8,
        grow_slots: 8,
    };
    StoreConfig {
        entities: pool,
        components: pool,
        ..StoreConfig::default()
    }
}

#[test]
fn test_movement_tick() {
    let world = World::new(small_config()).unwrap();

    let ids: Vec<EntityId> = (0..20)
        .map(|i| {
            let entity = world.spawn().unwrap();
            let f = i as f32;
            drop(entity.add_component(Position { x: f, y: 0.0 }).unwrap());
            drop(entity.add_component(Velocity { dx: 1.0, dy: 2.0 }).unwrap());
            entity.id()
        })
        .collect();

    for id in world.entities() {
        let velocity = *world.get_component::<Velocity>(id).unwrap().unwrap();
        let mut position = world.get_component_mut::<Position>(id).unwrap().unwrap();
        position.x += velocity.dx;
        position.y += velocity.dy;
    }

    for (i, id) in ids.iter().enumerate() {
        let position = world.get_component::<Position>(*id).unwrap().unwrap();
        assert_eq!(*position, Position { x: i as f32 + 1.0, y: 2.0 });
    }
}

#[test]
fn test_destroy_invalidates_every_copy() {
    let world = World::new(small_config()).unwrap();
    let id = world.create_entity().unwrap();
    let copy = id;
    drop(world.add_component(id, Health(10)).unwrap());

    assert_eq!(world.destroy_entity(id).unwrap(), 1);

    assert!(!world.exists(copy));
    assert!(matches!(
        world.get_component::<Health>(copy),
        Err(StoreError::StaleHandle(_))
    ));
    assert!(matches!(
        world.add_component(copy, Health(1)),
        Err(StoreError::StaleHandle(_))
    ));
    assert!(world.remove_component::<Health>(copy).is_err());
    assert!(world.pass_data_to_all_components(copy, &Damage(1)).is_err());
}

#[test]
fn test_slot_reuse_bumps_generation() {
    let world = World::new(small_config()).unwrap();
    let first = world.create_entity().unwrap();
    world.destroy_entity(first).unwrap();

    let second = world.create_entity().unwrap();
    assert_eq!(second.index(), first.index());
    assert_eq!(second.generation(), first.generation().wrapping_add(1));
    assert!(world.exists(second));
    assert!(!world.exists(first));
}

#[test]
fn test_event_fan_out() {
    let world = World::new(small_config()).unwrap();
    let hero = world.spawn().unwrap();
    drop(hero.add_component(Health(100)).unwrap());
    drop(hero.add_component(Position { x: 0.0, y: 0.0 }).unwrap());

    assert_eq!(hero.pass_data(&Damage(30)).unwrap(), 2);
    assert_eq!(hero.pass_data(&Heal(5)).unwrap(), 2);
    assert_eq!(hero.pass_data(&"unrelated").unwrap(), 2);

    assert_eq!(*hero.get_component::<Health>().unwrap().unwrap(), Health(75));
    assert_eq!(
        *hero.get_component::<Position>().unwrap().unwrap(),
        Position { x: 0.0, y: 0.0 }
    );
}

#[test]
fn test_pools_grow_across_chunks() {
    let world = World::new(small_config()).unwrap();
    let ids: Vec<_> = (0..100).map(|_| world.create_entity().unwrap()).collect();
    for (i, id) in ids.iter().enumerate() {
        drop(world.add_component(*id, Health(i as i32)).unwrap());
    }

    assert_eq!(world.entity_count(), 100);
    assert_eq!(world.components().instance_count::<Health>(), 100);
    assert!(world.entity_table().stats().chunks >= 13);

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(*world.get_component::<Health>(*id).unwrap().unwrap(), Health(i as i32));
    }
}

#[test]
fn test_memory_returned_to_arena() {
    let arena = Arc::new(HeapArena::unbounded());
    {
        let world = World::with_arena(small_config(), Arc::clone(&arena) as Arc<dyn MemoryArena>).unwrap();
        let entity = world.spawn().unwrap();
        drop(entity.add_component(Health(1)).unwrap());

        assert!(arena.used_by(AllocationTag::Entities) > 0);
        assert!(arena.used_by(AllocationTag::Components) > 0);
    }
    assert_eq!(arena.used(), 0);
    assert_eq!(arena.allocation_count(), 0);
}

#[test]
fn test_budget_exhaustion_is_recoverable() {
    let probe = Arc::new(HeapArena::unbounded());
    let config = small_config();
    let entity_chunk = {
        let _world = World::with_arena(config, Arc::clone(&probe) as Arc<dyn MemoryArena>).unwrap();
        probe.used()
    };

    // Room for exactly the initial entity chunk.
    let budget = MemoryBudget {
        total_bytes: Some(entity_chunk),
        ..MemoryBudget::default()
    };
    let world = World::new(StoreConfig { memory: budget, ..config }).unwrap();

    let entity = world.create_entity().unwrap();
    let err = world.add_component(entity, Health(1)).unwrap_err();
    assert!(matches!(err, StoreError::OutOfMemory { .. }));

    // The entity and the table are unchanged.
    assert!(world.exists(entity));
    assert!(!world.has_component::<Health>(entity).unwrap());
    assert_eq!(world.component_types(entity).unwrap(), Vec::new());
}

#[test]
fn test_config_from_toml() {
    let config = StoreConfig::from_toml_str(
        r"
        [entities]
        chunk_slots = 32
        initial_slots = 64
        grow_slots = 32
        ",
    )
    .unwrap();
    assert_eq!(config.entities.chunk_slots, 32);
    assert_eq!(config.components, PoolConfig::default());

    let world = World::new(config).unwrap();
    assert_eq!(world.entity_table().capacity(), 64);
}

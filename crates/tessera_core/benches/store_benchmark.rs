//! # Store Performance Benchmark
//!
//! Covers the hot operations of the store:
//! - entity create/destroy churn
//! - component attach/detach
//! - guarded component reads and writes
//! - event fan-out
//!
//! Run with: `cargo bench --package tessera_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::any::Any;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::{Component, EntityId, StoreConfig, World};

#[derive(Clone, Copy, Default)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Default)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

struct Impulse(f32);

impl Component for Velocity {
    fn receive(&mut self, event: &dyn Any) {
        if let Some(Impulse(amount)) = event.downcast_ref::<Impulse>() {
            self.x += amount;
        }
    }
}

fn populated(count: usize) -> (World, Vec<EntityId>) {
    let world = World::new(StoreConfig::default()).unwrap();
    let ids = (0..count)
        .map(|i| {
            let entity = world.spawn().unwrap();
            let f = i as f32;
            drop(entity.add_component(Position { x: f, y: f, z: f }).unwrap());
            drop(entity.add_component(Velocity { x: 0.1, y: 0.2, z: 0.3 }).unwrap());
            entity.id()
        })
        .collect();
    (world, ids)
}

/// Benchmark: Create entities into a fresh world.
fn bench_create_entities(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_entities");

    for count in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let world = World::new(StoreConfig::default()).unwrap();
                for _ in 0..count {
                    black_box(world.create_entity().unwrap());
                }
                world.entity_count()
            });
        });
    }

    group.finish();
}

/// Benchmark: Destroy and recreate, exercising slot reuse.
fn bench_create_destroy_cycle(c: &mut Criterion) {
    let world = World::new(StoreConfig::default()).unwrap();
    let mut ids: Vec<_> = (0..10_000).map(|_| world.create_entity().unwrap()).collect();

    c.bench_function("create_destroy_cycle_10K", |b| {
        b.iter(|| {
            for id in &mut ids {
                world.destroy_entity(*id).unwrap();
                *id = world.create_entity().unwrap();
            }
            black_box(world.entity_count())
        });
    });
}

/// Benchmark: Attach then detach a component.
fn bench_add_remove_component(c: &mut Criterion) {
    let world = World::new(StoreConfig::default()).unwrap();
    let ids: Vec<_> = (0..10_000).map(|_| world.create_entity().unwrap()).collect();

    c.bench_function("add_remove_component_10K", |b| {
        b.iter(|| {
            for id in &ids {
                drop(world.add_component(*id, Position::default()).unwrap());
            }
            for id in &ids {
                black_box(world.remove_component::<Position>(*id).unwrap());
            }
        });
    });
}

/// Benchmark: Guarded reads and writes.
fn bench_component_access(c: &mut Criterion) {
    let (world, ids) = populated(100_000);
    let mut group = c.benchmark_group("component_access");

    group.bench_function("read_100K", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for id in &ids {
                let position = world.get_component::<Position>(*id).unwrap().unwrap();
                sum += position.x + position.y + position.z;
            }
            black_box(sum)
        });
    });

    group.bench_function("integrate_100K", |b| {
        b.iter(|| {
            for id in &ids {
                let velocity = *world.get_component::<Velocity>(*id).unwrap().unwrap();
                let mut position = world.get_component_mut::<Position>(*id).unwrap().unwrap();
                position.x += velocity.x;
                position.y += velocity.y;
                position.z += velocity.z;
            }
        });
    });

    group.finish();
}

/// Benchmark: Fan an event out to every component of every entity.
fn bench_pass_data(c: &mut Criterion) {
    let (world, ids) = populated(10_000);

    c.bench_function("pass_data_10K", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(world.pass_data_to_all_components(*id, &Impulse(0.5)).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_create_entities,
    bench_create_destroy_cycle,
    bench_add_remove_component,
    bench_component_access,
    bench_pass_data,
);

criterion_main!(benches);

//! Multithreaded tests for the per-entity guards.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use tessera_core::{Component, EntityId, StoreConfig, World};

/// Both halves are always written together.
#[derive(Debug, Clone, Copy)]
struct Pair {
    a: u64,
    b: u64,
}
impl Component for Pair {}

#[derive(Debug)]
struct Counter(u64);
impl Component for Counter {
    fn receive(&mut self, event: &dyn std::any::Any) {
        if event.is::<Tick>() {
            self.0 += 1;
        }
    }
}

struct Tick;

const THREADS: usize = 8;

fn world() -> Arc<World> {
    Arc::new(World::new(StoreConfig::compact()).unwrap())
}

#[test]
fn test_concurrent_creation_yields_unique_ids() {
    let world = world();
    let (tx, rx) = unbounded();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let world = Arc::clone(&world);
            let tx = tx.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    tx.send(world.create_entity().unwrap()).unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    for handle in handles {
        handle.join().unwrap();
    }

    let ids: HashSet<EntityId> = rx.iter().collect();
    assert_eq!(ids.len(), THREADS * 500);
    assert_eq!(world.entity_count(), THREADS * 500);
}

#[test]
fn test_disjoint_entities_do_not_interfere() {
    let world = world();
    let (tx, rx) = unbounded();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let world = Arc::clone(&world);
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..200u64 {
                    let entity = world.spawn().unwrap();
                    let value = ((t as u64) << 32) | i;
                    drop(entity.add_component(Pair { a: value, b: value }).unwrap());
                    drop(entity.add_component(Counter(0)).unwrap());
                    entity.pass_data(&Tick).unwrap();

                    if i % 3 == 0 {
                        entity.remove_component::<Pair>().unwrap();
                    }
                    tx.send((entity.id(), value, i % 3 != 0)).unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    for handle in handles {
        handle.join().unwrap();
    }

    for (id, value, has_pair) in rx.iter() {
        let pair = world.get_component::<Pair>(id).unwrap();
        assert_eq!(pair.is_some(), has_pair);
        if let Some(pair) = pair {
            assert_eq!((pair.a, pair.b), (value, value));
        }
        assert_eq!(world.get_component::<Counter>(id).unwrap().unwrap().0, 1);
    }
}

#[test]
fn test_readers_never_observe_torn_writes() {
    let world = world();
    let targets: Vec<EntityId> = (0..4)
        .map(|_| {
            let entity = world.spawn().unwrap();
            drop(entity.add_component(Pair { a: 0, b: 0 }).unwrap());
            entity.id()
        })
        .collect();
    let targets = Arc::new(targets);
    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = (0..2)
        .map(|w| {
            let world = Arc::clone(&world);
            let targets = Arc::clone(&targets);
            thread::spawn(move || {
                for i in 0..2_000u64 {
                    let id = targets[(i as usize + w) % targets.len()];
                    let mut pair = world.get_component_mut::<Pair>(id).unwrap().unwrap();
                    pair.a = i;
                    thread::yield_now();
                    pair.b = i;
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..THREADS)
        .map(|r| {
            let world = Arc::clone(&world);
            let targets = Arc::clone(&targets);
            let done = Arc::clone(&done);
            let reads = Arc::clone(&reads);
            thread::spawn(move || {
                let mut i = r;
                while !done.load(Ordering::Acquire) {
                    let id = targets[i % targets.len()];
                    let pair = *world.get_component::<Pair>(id).unwrap().unwrap();
                    assert_eq!(pair.a, pair.b, "torn read on {id}");
                    reads.fetch_add(1, Ordering::Relaxed);
                    i += 1;
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(reads.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_destroy_races_with_readers() {
    let world = world();
    let ids: Vec<EntityId> = (0..256)
        .map(|i| {
            let entity = world.spawn().unwrap();
            drop(entity.add_component(Pair { a: i, b: i }).unwrap());
            entity.id()
        })
        .collect();
    let ids = Arc::new(ids);
    let (tx, rx) = unbounded();

    let destroyer = {
        let world = Arc::clone(&world);
        let ids = Arc::clone(&ids);
        thread::spawn(move || {
            for id in ids.iter().step_by(2) {
                assert_eq!(world.destroy_entity(*id).unwrap(), 1);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let world = Arc::clone(&world);
            let ids = Arc::clone(&ids);
            let tx = tx.clone();
            thread::spawn(move || {
                let mut dead = 0usize;
                for _ in 0..4 {
                    for (i, id) in ids.iter().enumerate() {
                        match world.get_component::<Pair>(*id) {
                            Ok(Some(pair)) => assert_eq!(pair.a, i as u64),
                            Ok(None) => panic!("{id} lost its component while alive"),
                            Err(err) => {
                                assert!(err.is_handle_error(), "{err}");
                                dead += 1;
                            }
                        }
                    }
                }
                tx.send(dead).unwrap();
            })
        })
        .collect();
    drop(tx);

    destroyer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(rx.iter().count(), 4);

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(world.exists(*id), i % 2 == 1);
    }
    assert_eq!(world.components().instance_count::<Pair>(), 128);
}

#[test]
fn test_writer_waits_for_outstanding_reference() {
    let world = world();
    let entity = world.create_entity().unwrap();
    drop(world.add_component(entity, Counter(5)).unwrap());

    let borrowed = world.get_component::<Counter>(entity).unwrap().unwrap();
    let (tx, rx) = unbounded();

    let remover = {
        let world = Arc::clone(&world);
        thread::spawn(move || {
            let removed = world.remove_component::<Counter>(entity).unwrap();
            tx.send(removed.map(|counter| counter.0)).unwrap();
        })
    };

    // The remover is blocked while the borrow is alive.
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());
    assert_eq!(borrowed.0, 5);
    drop(borrowed);

    assert_eq!(rx.recv().unwrap(), Some(5));
    remover.join().unwrap();
    assert!(!world.has_component::<Counter>(entity).unwrap());
}

/// Generous bound for work that must never wait on another entity.
const INDEPENDENT: Duration = Duration::from_secs(5);

#[test]
fn test_borrow_allows_same_type_on_other_entity_same_thread() {
    let world = world();
    let first = world.create_entity().unwrap();
    let second = world.create_entity().unwrap();
    drop(world.add_component(first, Counter(1)).unwrap());
    let (tx, rx) = unbounded();

    let worker = {
        let world = Arc::clone(&world);
        thread::spawn(move || {
            let held = world.get_component::<Counter>(first).unwrap().unwrap();
            drop(world.add_component(second, Counter(2)).unwrap());
            world.get_component_mut::<Counter>(second).unwrap().unwrap().0 += 1;
            let removed = world.remove_component::<Counter>(second).unwrap();
            tx.send((held.0, removed.map(|counter| counter.0))).unwrap();
        })
    };

    assert_eq!(rx.recv_timeout(INDEPENDENT), Ok((1, Some(3))));
    worker.join().unwrap();
}

#[test]
fn test_reader_and_adder_on_different_entities_never_cycle() {
    let world = world();
    let first = world.create_entity().unwrap();
    let second = world.create_entity().unwrap();
    drop(world.add_component(first, Counter(1)).unwrap());
    drop(world.add_component(second, Pair { a: 7, b: 7 }).unwrap());
    let (tx, rx) = unbounded();

    // Holds a Counter on `first`, then reads `second`.
    let reader = {
        let world = Arc::clone(&world);
        let tx = tx.clone();
        thread::spawn(move || {
            let held = world.get_component::<Counter>(first).unwrap().unwrap();
            thread::sleep(Duration::from_millis(50));
            let pair = *world.get_component::<Pair>(second).unwrap().unwrap();
            tx.send(("reader", held.0 + pair.a)).unwrap();
        })
    };

    // Attaches a Counter to `second` while the reader holds one on `first`.
    let adder = {
        let world = Arc::clone(&world);
        thread::spawn(move || {
            let added = world.add_component(second, Counter(10)).unwrap();
            thread::sleep(Duration::from_millis(100));
            tx.send(("adder", added.0)).unwrap();
        })
    };

    let mut results = vec![
        rx.recv_timeout(INDEPENDENT).unwrap(),
        rx.recv_timeout(INDEPENDENT).unwrap(),
    ];
    results.sort_unstable();
    assert_eq!(results, vec![("adder", 10), ("reader", 8)]);

    reader.join().unwrap();
    adder.join().unwrap();
}

#[test]
fn test_shared_type_mutation_does_not_serialize_entities() {
    let world = world();
    let first = world.create_entity().unwrap();
    let second = world.create_entity().unwrap();
    drop(world.add_component(first, Pair { a: 1, b: 1 }).unwrap());
    drop(world.add_component(second, Pair { a: 2, b: 2 }).unwrap());

    // A long-lived writer on `first`.
    let mut held = world.get_component_mut::<Pair>(first).unwrap().unwrap();
    held.a = 100;
    let (tx, rx) = unbounded();

    let worker = {
        let world = Arc::clone(&world);
        thread::spawn(move || {
            for i in 0..100u64 {
                let mut pair = world.get_component_mut::<Pair>(second).unwrap().unwrap();
                pair.a += i;
                pair.b += i;
            }
            let pair = *world.get_component::<Pair>(second).unwrap().unwrap();
            tx.send((pair.a, pair.b)).unwrap();
        })
    };

    let expected = 2 + (0..100).sum::<u64>();
    assert_eq!(rx.recv_timeout(INDEPENDENT), Ok((expected, expected)));
    worker.join().unwrap();

    held.b = 100;
    drop(held);
    let pair = *world.get_component::<Pair>(first).unwrap().unwrap();
    assert_eq!((pair.a, pair.b), (100, 100));
}

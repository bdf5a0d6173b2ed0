#![cfg(feature = "parallel")]

use std::sync::atomic::{AtomicUsize, Ordering};

use archetype_store::{EntityHandle, World, WorldConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Boosted;

#[test]
fn test_parallel_query_basic() {
    let mut world = World::new();

    // Two archetypes so the fan-out runs once per archetype
    for i in 0..5000 {
        world
            .add_entity((
                Position {
                    x: i as f32,
                    y: 0.0,
                },
                Velocity { x: 1.0, y: 1.0 },
            ))
            .unwrap();
    }

    for i in 0..5000 {
        world
            .add_entity((
                Position {
                    x: i as f32,
                    y: 100.0,
                },
                Velocity { x: 2.0, y: 2.0 },
                Boosted,
            ))
            .unwrap();
    }

    world
        .execute_parallel_mut::<(&mut Position, &Velocity), _>(|(pos, vel)| {
            pos.x += vel.x;
            pos.y += vel.y;
        })
        .unwrap();

    let mut count = 0;
    for (pos, _vel) in world.query::<(&Position, &Velocity)>().unwrap().iter() {
        if pos.y < 50.0 {
            assert_eq!(pos.y, 1.0);
        } else {
            assert_eq!(pos.y, 102.0);
        }
        count += 1;
    }
    assert_eq!(count, 10000);
}

#[test]
fn test_parallel_matches_sequential() {
    let config = WorldConfig::default().with_parallel_batch_size(64);
    let mut world = World::with_config(config);
    for i in 0..3000 {
        world
            .add_entity((Position {
                x: i as f32,
                y: (i % 7) as f32,
            },))
            .unwrap();
    }

    let mut sequential = 0usize;
    world
        .execute::<&Position, _>(|pos| sequential += pos.y as usize)
        .unwrap();

    let parallel = AtomicUsize::new(0);
    world
        .execute_parallel::<&Position, _>(|pos| {
            parallel.fetch_add(pos.y as usize, Ordering::Relaxed);
        })
        .unwrap();

    assert_eq!(parallel.load(Ordering::Relaxed), sequential);
}

#[test]
fn test_remove_during_parallel_query() {
    let mut world = World::new();
    for i in 0..2000 {
        world
            .add_entity((Position {
                x: i as f32,
                y: 0.0,
            },))
            .unwrap();
    }

    // Marking only touches the pending lists, so it is allowed mid-query
    world
        .execute_parallel::<(EntityHandle, &Position), _>(|(handle, pos)| {
            if (pos.x as usize) % 4 == 0 {
                world.remove_entity(handle).unwrap();
            }
        })
        .unwrap();

    assert_eq!(world.pending_removal_count(), 500);
    assert_eq!(world.flush(), 500);
    assert_eq!(world.total_entity_count(), 1500);
    assert!(world
        .query::<&Position>()
        .unwrap()
        .iter()
        .all(|pos| (pos.x as usize) % 4 != 0));
}

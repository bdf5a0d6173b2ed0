use std::sync::Arc;
use std::thread;

use archetype_store::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Score(u64);

#[test]
fn test_concurrent_readers_then_flush() {
    let shared = Arc::new(SharedWorld::default());
    {
        let mut world = shared.write();
        world
            .add_entities((0..1000).map(|i| (Score(i),)))
            .unwrap();
    }

    // Readers mark disjoint rows while iterating
    let workers: Vec<_> = (0..4u64)
        .map(|lane| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let world = shared.read();
                let mut marked = 0usize;
                for (handle, score) in world.query::<(EntityHandle, &Score)>().unwrap().iter() {
                    if score.0 % 4 == lane && score.0 % 2 == 0 {
                        world.remove_entity(handle).unwrap();
                        marked += 1;
                    }
                }
                marked
            })
        })
        .collect();

    let marked: usize = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .sum();
    assert_eq!(marked, 500);

    assert_eq!(shared.flush(), 500);
    let world = shared.read();
    assert_eq!(world.total_entity_count(), 500);
    assert!(world
        .query::<&Score>()
        .unwrap()
        .iter()
        .all(|score| score.0 % 2 == 1));
}

#[test]
fn test_structural_change_under_write_token() {
    let shared = SharedWorld::new(World::new());
    let handle = shared.write().add_entity((Score(1),)).unwrap();

    {
        let mut world = shared.write();
        world.add_components(handle, (1u8,)).unwrap();
        world.flush();
    }

    let world = shared.into_inner();
    assert_eq!(world.query::<(&Score, &u8)>().unwrap().count(), 1);
    assert_eq!(world.total_entity_count(), 1);
}

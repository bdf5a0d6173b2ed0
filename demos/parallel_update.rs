//! Example: parallel iteration and a shared world
//!
//! Run with: cargo run --example parallel_update

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use archetype_store::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Position([f32; 3]);

#[derive(Debug, Clone, Copy)]
struct Velocity([f32; 3]);

#[derive(Debug, Clone, Copy)]
struct Lifetime(u32);

fn main() -> Result<()> {
    let config = WorldConfig::default().with_parallel_batch_size(4_096);
    let mut world = World::with_config(config);
    world.add_entities((0..200_000u32).map(|i| {
        (
            Position([i as f32, 0.0, 0.0]),
            Velocity([0.0, 1.0, 0.0]),
            Lifetime(i % 100),
        )
    }))?;

    let start = Instant::now();
    world.execute_parallel_mut::<(&mut Position, &Velocity), _>(|(pos, vel)| {
        for axis in 0..3 {
            pos.0[axis] += vel.0[axis] * 0.016;
        }
    })?;
    println!("Parallel update of 200k rows: {:?}", start.elapsed());

    let shared = SharedWorld::new(world);
    {
        // Readers may mark rows; nothing moves until the flush below
        let world = shared.read();
        let expired = AtomicU64::new(0);
        world.execute_parallel::<(EntityHandle, &Lifetime), _>(|(handle, lifetime)| {
            if lifetime.0 == 0 && world.remove_entity(handle).is_ok() {
                expired.fetch_add(1, Ordering::Relaxed);
            }
        })?;
        println!("Marked {} expired entities", expired.load(Ordering::Relaxed));
    }

    let removed = shared.flush();
    let world = shared.into_inner();
    println!(
        "Flushed {removed} rows, {} entities remain",
        world.total_entity_count()
    );
    Ok(())
}

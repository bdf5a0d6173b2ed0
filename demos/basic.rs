//! Example: basic store usage
//!
//! Adds entities, queries them, migrates one, removes another and flushes.

use archetype_store::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Health(u32);

fn main() -> Result<()> {
    let mut world = World::new();

    println!("Creating entities...");
    let player = world.add_entity((
        Position { x: 0.0, y: 0.0 },
        Velocity { x: 1.0, y: 0.5 },
        Health(100),
    ))?;
    let rock = world.add_entity((Position { x: 5.0, y: 5.0 },))?;
    for i in 0..10 {
        world.add_entity((Position { x: i as f32, y: 1.0 }, Velocity { x: -1.0, y: 0.0 }))?;
    }
    println!(
        "{} entities in {} archetypes",
        world.total_entity_count(),
        world.total_archetype_count()
    );

    world.execute_mut::<(&mut Position, &Velocity), _>(|(pos, vel)| {
        pos.x += vel.x;
        pos.y += vel.y;
    })?;
    println!("Player moved to {:?}", world.get_component::<Position>(player)?);

    // The rock starts moving: it migrates to the {Position, Velocity} archetype
    let rock = world.add_components(rock, (Velocity { x: 0.0, y: -1.0 },))?;
    world.remove_entity(player)?;
    let removed = world.flush();
    println!("Flush removed {removed} rows, generation is now {}", world.generation());
    println!("Rock handle valid after flush: {}", world.is_alive(rock));

    for (handle, pos) in world.query::<(EntityHandle, &Position)>()?.iter() {
        println!("{}: {:?}", WorldInspector::describe_entity(&world, handle), pos);
    }

    for info in WorldInspector::archetype_summary(&world) {
        println!(
            "Archetype {}: {} entities, components {:?}",
            info.id, info.entity_count, info.component_names
        );
    }
    Ok(())
}

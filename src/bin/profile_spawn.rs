// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#[cfg(feature = "profiling")]
use std::{fs::File, time::Instant};

#[cfg(feature = "profiling")]
use archetype_store::{EntityHandle, World, WorldInspector};

#[cfg(feature = "profiling")]
#[derive(Debug, Clone, Copy)]
struct Position(f32, f32, f32);

#[cfg(feature = "profiling")]
#[derive(Debug, Clone, Copy)]
struct Velocity(f32, f32, f32);

#[cfg(feature = "profiling")]
#[derive(Debug, Clone, Copy)]
struct Health(u32);

#[cfg(feature = "profiling")]
#[tracing::instrument(skip(world))]
fn profile_add_entities(world: &mut World, count: usize) -> archetype_store::Result<()> {
    for i in 0..count {
        if i % 1_000 == 0 {
            tracing::info!("Adding entity {}/{}", i, count);
        }
        world.add_entity((
            Position(1.0, 2.0, 3.0),
            Velocity(1.0, 0.0, 0.0),
            Health(100),
        ))?;
    }
    Ok(())
}

#[cfg(feature = "profiling")]
#[tracing::instrument(skip(world))]
fn profile_churn(world: &mut World) -> archetype_store::Result<()> {
    let doomed: Vec<EntityHandle> = world
        .query::<(EntityHandle, &Health)>()?
        .iter()
        .filter(|(handle, health)| handle.row() % 3 == 0 && health.0 > 0)
        .map(|(handle, _)| handle)
        .collect();
    for handle in doomed {
        world.remove_entity(handle)?;
    }
    world.flush();

    world.execute_mut::<(&mut Position, &Velocity), _>(|(pos, vel)| {
        pos.0 += vel.0;
        pos.1 += vel.1;
        pos.2 += vel.2;
    })
}

#[cfg(feature = "profiling")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // JSON trace file, one event per line
    let file = File::create("trace.json")?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .init();

    let mut world = World::new();

    println!("Warming up...");
    {
        let _span = tracing::info_span!("warmup").entered();
        for _ in 0..1000 {
            world.add_entity((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0)))?;
        }
    }

    println!("Profiling add_entity with 3 components...");
    let start = Instant::now();
    profile_add_entities(&mut world, 10_000)?;
    println!("Added 10k entities in: {:?}", start.elapsed());

    let start = Instant::now();
    profile_churn(&mut world)?;
    println!("Removal + flush + update in: {:?}", start.elapsed());

    WorldInspector::log_summary(&world);
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn main() {
    println!("profile_spawn binary requires --features profiling");
}

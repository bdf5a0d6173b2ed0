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

use crate::archetype::{ArchetypeId, Signature};
use crate::entity::EntityHandle;
use crate::world::World;

/// World inspector for debugging
pub struct WorldInspector;

impl WorldInspector {
    /// Get total entity count, rows pending removal included
    pub fn entity_count(world: &World) -> usize {
        world.total_entity_count()
    }

    /// Get archetype summary
    pub fn archetype_summary(world: &World) -> Vec<ArchetypeInfo> {
        let registry = world.type_registry();
        world
            .archetypes()
            .map(|archetype| ArchetypeInfo {
                id: archetype.id(),
                signature: archetype.signature(),
                component_names: archetype
                    .types()
                    .keys()
                    .iter()
                    .map(|&key| registry.name(key))
                    .collect(),
                entity_count: archetype.len(),
                pending_removals: archetype.pending_removal_count(),
            })
            .collect()
    }

    /// Emit the world summary as `debug` events
    pub fn log_summary(world: &World) {
        let stats = world.query_cache_stats();
        tracing::debug!(
            entities = world.total_entity_count(),
            archetypes = world.total_archetype_count(),
            pending_removals = world.pending_removal_count(),
            generation = world.generation(),
            cached_queries = stats.num_cached_queries,
            "world summary"
        );

        for info in Self::archetype_summary(world) {
            tracing::debug!(
                archetype = info.id,
                signature = info.signature.raw(),
                entities = info.entity_count,
                pending_removals = info.pending_removals,
                components = ?info.component_names,
                "archetype"
            );
        }
    }

    /// One-line description of where a handle points
    pub fn describe_entity(world: &World, handle: EntityHandle) -> String {
        let state = if world.is_alive(handle) {
            "alive"
        } else if world.is_pending_removal(handle) {
            "pending removal"
        } else {
            "stale"
        };
        format!(
            "entity at archetype {} row {} (generation {}): {state}",
            handle.archetype(),
            handle.row(),
            handle.generation()
        )
    }
}

/// Archetype information for debugging
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeInfo {
    pub id: ArchetypeId,
    pub signature: Signature,
    /// Component type names in column order
    pub component_names: Vec<&'static str>,
    pub entity_count: usize,
    pub pending_removals: usize,
}

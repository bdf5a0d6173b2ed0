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

//! Archetype registry and query cache
//!
//! Owns every archetype of a world, maps exact type sets to archetypes and
//! caches, per requested subset, the archetypes that are supersets of it.
//! Archetypes are never removed, so cache entries only ever grow.

use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::archetype::{Archetype, ArchetypeId, TypeSet};
use crate::component::{ComponentInfo, TypeRegistry};
use crate::config::WorldConfig;
use crate::error::{EcsError, Result};

/// All archetypes of one world
pub struct Archetypes {
    archetypes: Vec<Archetype>,

    /// Exact type set -> archetype
    index: AHashMap<TypeSet, ArchetypeId>,

    /// Requested subset -> matching archetypes, in creation order
    ///
    /// Behind a lock so queries can populate it through `&World`.
    query_cache: RwLock<AHashMap<TypeSet, Vec<ArchetypeId>>>,

    initial_row_capacity: usize,
    max_archetypes: usize,
}

impl Archetypes {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            // Start with reasonable defaults to avoid resize spikes
            archetypes: Vec::with_capacity(64),
            index: AHashMap::with_capacity(64),
            query_cache: RwLock::new(AHashMap::with_capacity(32)),
            initial_row_capacity: config.initial_row_capacity,
            max_archetypes: config.max_archetypes,
        }
    }

    /// Find the archetype for exactly `types`, creating it on a miss
    ///
    /// A new archetype is appended to every cached query whose subset it covers.
    pub fn get_or_create_exact(
        &mut self,
        types: &TypeSet,
        registry: &TypeRegistry,
    ) -> Result<ArchetypeId> {
        if let Some(&id) = self.index.get(types) {
            return Ok(id);
        }

        if self.archetypes.len() >= self.max_archetypes {
            return Err(EcsError::ArchetypeLimitExceeded(self.max_archetypes));
        }

        let infos: SmallVec<[ComponentInfo; 8]> = types
            .keys()
            .iter()
            .map(|&key| {
                registry
                    .info(key)
                    .copied()
                    .ok_or(EcsError::ComponentNotFound("<unregistered>"))
            })
            .collect::<Result<_>>()?;

        let id = self.archetypes.len();
        let archetype = Archetype::with_capacity(id, &infos, self.initial_row_capacity)?;

        let mut extended = 0;
        for (subset, matches) in self.query_cache.get_mut().iter_mut() {
            if types.is_superset_of(subset) {
                matches.push(id);
                extended += 1;
            }
        }

        // Push archetype FIRST, then index it
        self.archetypes.push(archetype);
        self.index.insert(types.clone(), id);

        tracing::debug!(
            archetype = id,
            signature = types.signature().raw(),
            columns = types.len(),
            cached_queries_extended = extended,
            "created archetype"
        );

        Ok(id)
    }

    /// Exact lookup without creating
    pub fn lookup(&self, types: &TypeSet) -> Option<ArchetypeId> {
        self.index.get(types).copied()
    }

    /// Archetypes whose type set contains every key of `subset`
    ///
    /// The first request for a subset scans all archetypes and caches the
    /// result; later requests are a map lookup.
    pub fn find_matching(&self, subset: &TypeSet) -> Vec<ArchetypeId> {
        if let Some(matches) = self.query_cache.read().get(subset) {
            return matches.clone();
        }

        let matches: Vec<ArchetypeId> = self
            .archetypes
            .iter()
            .filter(|archetype| archetype.types().is_superset_of(subset))
            .map(Archetype::id)
            .collect();

        tracing::trace!(
            signature = subset.signature().raw(),
            matched = matches.len(),
            "cached query"
        );

        self.query_cache
            .write()
            .entry(subset.clone())
            .or_insert(matches)
            .clone()
    }

    /// Get archetype by ID
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Get archetype mutably
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    /// Borrow two distinct archetypes mutably
    pub(crate) fn pair_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "pair_mut needs two distinct archetypes");
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Archetype> {
        self.archetypes.iter()
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Rows across all archetypes, including rows marked for removal
    pub fn total_entity_count(&self) -> usize {
        self.archetypes.iter().map(Archetype::len).sum()
    }

    pub fn pending_removal_count(&self) -> usize {
        self.archetypes
            .iter()
            .map(Archetype::pending_removal_count)
            .sum()
    }

    /// Flush pending removals of every archetype
    pub fn flush_removals(&mut self) -> usize {
        self.archetypes
            .iter_mut()
            .map(Archetype::flush_removals)
            .sum()
    }

    /// Drop every cached query result; entries are rebuilt on the next request
    pub fn clear_query_cache(&self) {
        self.query_cache.write().clear();
    }

    /// Get query cache statistics for diagnostics
    pub fn query_cache_stats(&self) -> QueryCacheStats {
        let cache = self.query_cache.read();
        QueryCacheStats {
            num_cached_queries: cache.len(),
            total_cached_archetypes: cache.values().map(Vec::len).sum(),
            total_archetypes: self.archetypes.len(),
        }
    }
}

/// Statistics about the query cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCacheStats {
    /// Number of unique query subsets cached
    pub num_cached_queries: usize,
    /// Total number of archetype matches across all cached queries
    pub total_cached_archetypes: usize,
    /// Total number of archetypes in the world
    pub total_archetypes: usize,
}

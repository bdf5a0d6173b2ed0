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

//! World: central entity and archetype storage

use std::any::type_name;

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeId, TypeSet};
use crate::archetypes::{Archetypes, QueryCacheStats};
use crate::component::{Bundle, Component, TypeKey, TypeRegistry, MAX_BUNDLE_COMPONENTS};
use crate::config::WorldConfig;
use crate::entity::EntityHandle;
use crate::error::{EcsError, Result};
use crate::query::{Query, QueryFetch, ReadOnlyFetch};

type ColumnIndices = SmallVec<[usize; MAX_BUNDLE_COMPONENTS]>;

/// Central ECS world
///
/// Owns the component registry, every archetype and the generation counter
/// that invalidates handles on `flush`. Independent worlds share nothing.
pub struct World {
    registry: TypeRegistry,
    archetypes: Archetypes,
    /// Advanced by every flush
    generation: u32,
    config: WorldConfig,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            registry: TypeRegistry::new(),
            archetypes: Archetypes::new(&config),
            generation: 0,
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current generation; handles issued now carry this value
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Register `T` ahead of first use
    pub fn register<T: Component>(&mut self) -> TypeKey {
        self.registry.register::<T>()
    }

    /// Key of `T` without registering it
    pub fn type_key<T: Component>(&self) -> Option<TypeKey> {
        self.registry.key_of::<T>()
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub(crate) fn archetype_registry(&self) -> &Archetypes {
        &self.archetypes
    }

    /// Resolve the archetype of a bundle type and the column of each bundle element
    fn bundle_target<B: Bundle>(&mut self) -> Result<(ArchetypeId, ColumnIndices)> {
        let keys = B::register_keys(&mut self.registry);
        let types = TypeSet::from_unsorted(&keys)
            .map_err(|duplicate| EcsError::DuplicateComponent(self.registry.name(duplicate)))?;
        let archetype_id = self.archetypes.get_or_create_exact(&types, &self.registry)?;

        // Bundle order -> sorted column order
        let columns = keys
            .iter()
            .map(|&key| {
                types
                    .position(key)
                    .ok_or(EcsError::ComponentNotFound(self.registry.name(key)))
            })
            .collect::<Result<ColumnIndices>>()?;
        Ok((archetype_id, columns))
    }

    /// Add an entity with the given bundle of components
    ///
    /// Components are stored in the archetype's sorted column order whatever
    /// the tuple order.
    pub fn add_entity<B: Bundle>(&mut self, bundle: B) -> Result<EntityHandle> {
        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.add_entity",
            archetype_count = self.archetypes.len()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let (archetype_id, columns) = self.bundle_target::<B>()?;
        let generation = self.generation;
        let archetype = self
            .archetypes
            .get_mut(archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;

        let row = write_bundle(archetype, &columns, bundle);
        Ok(EntityHandle::new(
            row,
            archetype_id,
            archetype.signature(),
            generation,
        ))
    }

    /// Add many entities of one bundle type
    ///
    /// The archetype is resolved once and its columns reserved up front.
    pub fn add_entities<B, I>(&mut self, bundles: I) -> Result<Vec<EntityHandle>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
    {
        let bundles = bundles.into_iter();
        let (archetype_id, columns) = self.bundle_target::<B>()?;
        let generation = self.generation;
        let archetype = self
            .archetypes
            .get_mut(archetype_id)
            .ok_or(EcsError::ArchetypeNotFound)?;

        let (lower, _) = bundles.size_hint();
        archetype.reserve_rows(lower);
        let signature = archetype.signature();

        let handles: Vec<EntityHandle> = bundles
            .map(|bundle| {
                let row = write_bundle(archetype, &columns, bundle);
                EntityHandle::new(row, archetype_id, signature, generation)
            })
            .collect();

        tracing::trace!(
            archetype = archetype_id,
            count = handles.len(),
            "added entity batch"
        );
        Ok(handles)
    }

    /// Check a handle against the current generation and resolve its archetype
    fn validate(&self, handle: EntityHandle) -> Result<&Archetype> {
        if handle.generation() != self.generation {
            return Err(EcsError::StaleHandle {
                handle_generation: handle.generation(),
                world_generation: self.generation,
            });
        }
        let archetype = self
            .archetypes
            .get(handle.archetype())
            .filter(|archetype| archetype.signature() == handle.signature())
            .ok_or(EcsError::ArchetypeNotFound)?;
        if handle.row() >= archetype.len() {
            return Err(EcsError::RowOutOfBounds {
                row: handle.row(),
                len: archetype.len(),
            });
        }
        Ok(archetype)
    }

    /// Mark the entity for removal on the next `flush`
    ///
    /// Only touches the archetype's pending list, so it may be called while
    /// read-only queries are iterating.
    pub fn remove_entity(&self, handle: EntityHandle) -> Result<()> {
        self.validate(handle)?.mark_row_for_removal(handle.row())
    }

    /// Remove every marked row and advance the generation
    ///
    /// Every handle issued before the call is stale afterwards. Returns the
    /// number of rows removed.
    pub fn flush(&mut self) -> usize {
        #[cfg(feature = "profiling")]
        let span = info_span!(
            "world.flush",
            pending = self.archetypes.pending_removal_count()
        );
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let removed = self.archetypes.flush_removals();
        // Wrapping: a handle would have to survive 2^32 flushes to alias
        self.generation = self.generation.wrapping_add(1);

        tracing::debug!(
            removed,
            generation = self.generation,
            entities = self.archetypes.total_entity_count(),
            "flushed world"
        );
        removed
    }

    /// True while the handle is current and its row is not marked for removal
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.validate(handle)
            .is_ok_and(|archetype| !archetype.is_marked_for_removal(handle.row()))
    }

    pub fn is_pending_removal(&self, handle: EntityHandle) -> bool {
        self.validate(handle)
            .is_ok_and(|archetype| archetype.is_marked_for_removal(handle.row()))
    }

    /// Check if the entity's archetype stores `T`
    pub fn has_component<T: Component>(&self, handle: EntityHandle) -> Result<bool> {
        let archetype = self.validate(handle)?;
        Ok(self
            .registry
            .key_of::<T>()
            .is_some_and(|key| archetype.has_component(key)))
    }

    /// Get immutable reference to a component on an entity
    pub fn get_component<T: Component>(&self, handle: EntityHandle) -> Result<&T> {
        let archetype = self.validate(handle)?;
        let key = self.key_or_missing::<T>()?;
        archetype
            .read_column::<T>(key)?
            .get(handle.row())
            .ok_or(EcsError::RowOutOfBounds {
                row: handle.row(),
                len: archetype.len(),
            })
    }

    /// Get mutable reference to a component on an entity
    pub fn get_component_mut<T: Component>(&mut self, handle: EntityHandle) -> Result<&mut T> {
        self.validate(handle)?;
        let key = self.key_or_missing::<T>()?;
        let archetype = self
            .archetypes
            .get_mut(handle.archetype())
            .ok_or(EcsError::ArchetypeNotFound)?;
        let len = archetype.len();
        archetype
            .read_column_mut::<T>(key)?
            .get_mut(handle.row())
            .ok_or(EcsError::RowOutOfBounds {
                row: handle.row(),
                len,
            })
    }

    /// Component accessor for code that treats a bad handle as a bug
    ///
    /// # Panics
    /// Panics with the error message wherever [`World::get_component`] would fail.
    pub fn component<T: Component>(&self, handle: EntityHandle) -> &T {
        match self.get_component::<T>(handle) {
            Ok(component) => component,
            Err(err) => panic!("{err}"),
        }
    }

    fn key_or_missing<T: Component>(&self) -> Result<TypeKey> {
        self.registry
            .key_of::<T>()
            .ok_or(EcsError::ComponentNotFound(type_name::<T>()))
    }

    /// Move an entity to the archetype with the bundle's components added
    ///
    /// The old row is marked for removal and the entity's values are copied
    /// into a new row together with the bundle. Returns the handle of the new
    /// row. Adding a type the entity already has is `DuplicateComponent`.
    pub fn add_components<B: Bundle>(
        &mut self,
        handle: EntityHandle,
        bundle: B,
    ) -> Result<EntityHandle> {
        let source = self.validate(handle)?;
        if source.is_marked_for_removal(handle.row()) {
            return Err(EcsError::AlreadyMarkedForRemoval { row: handle.row() });
        }
        let old_types = source.types().clone();

        let added = B::register_keys(&mut self.registry);
        if added.is_empty() {
            return Ok(handle);
        }
        let new_types = old_types
            .with(&added)
            .map_err(|duplicate| EcsError::DuplicateComponent(self.registry.name(duplicate)))?;
        let columns = added
            .iter()
            .map(|&key| {
                new_types
                    .position(key)
                    .ok_or(EcsError::ComponentNotFound(self.registry.name(key)))
            })
            .collect::<Result<ColumnIndices>>()?;

        let destination = self.archetypes.get_or_create_exact(&new_types, &self.registry)?;
        let new_row = self.migrate(handle, destination)?;

        let archetype = self
            .archetypes
            .get_mut(destination)
            .ok_or(EcsError::ArchetypeNotFound)?;
        let ptrs: SmallVec<[*mut u8; MAX_BUNDLE_COMPONENTS]> = columns
            .iter()
            // SAFETY: the new row was allocated by `migrate`; these are its
            // not-yet-written slots
            .map(|&column| unsafe { archetype.slot_ptr(column, new_row) })
            .collect();
        // SAFETY: each pointer targets the column of the matching bundle type
        unsafe { bundle.write_components(&ptrs) };

        tracing::trace!(
            from = handle.archetype(),
            to = destination,
            added = added.len(),
            "added components"
        );
        Ok(EntityHandle::new(
            new_row,
            destination,
            new_types.signature(),
            self.generation,
        ))
    }

    /// Move an entity to the archetype without the bundle's component types
    ///
    /// Every listed type must be present on the entity. Returns the handle of
    /// the new row; removing all components lands in the empty archetype.
    pub fn remove_components<B: Bundle>(&mut self, handle: EntityHandle) -> Result<EntityHandle> {
        let source = self.validate(handle)?;
        if source.is_marked_for_removal(handle.row()) {
            return Err(EcsError::AlreadyMarkedForRemoval { row: handle.row() });
        }
        let old_types = source.types().clone();

        let removed = B::lookup_keys(&self.registry).map_err(EcsError::ComponentNotFound)?;
        TypeSet::from_unsorted(&removed)
            .map_err(|duplicate| EcsError::DuplicateComponent(self.registry.name(duplicate)))?;
        if let Some(&missing) = removed.iter().find(|&&key| !old_types.contains(key)) {
            return Err(EcsError::ComponentNotFound(self.registry.name(missing)));
        }
        if removed.is_empty() {
            return Ok(handle);
        }

        let new_types = old_types.without(&removed);
        let destination = self.archetypes.get_or_create_exact(&new_types, &self.registry)?;
        let new_row = self.migrate(handle, destination)?;

        tracing::trace!(
            from = handle.archetype(),
            to = destination,
            removed = removed.len(),
            "removed components"
        );
        Ok(EntityHandle::new(
            new_row,
            destination,
            new_types.signature(),
            self.generation,
        ))
    }

    /// Mark the source row removed and copy every shared column into a new
    /// destination row
    ///
    /// Destination columns the source lacks are left for the caller to write.
    fn migrate(&mut self, handle: EntityHandle, destination: ArchetypeId) -> Result<usize> {
        let source_id = handle.archetype();
        self.archetypes
            .get(source_id)
            .ok_or(EcsError::ArchetypeNotFound)?
            .mark_row_for_removal(handle.row())?;

        let (source, target) = self.archetypes.pair_mut(source_id, destination);
        // Resolve column pairs before the destination grows
        let shared: SmallVec<[(usize, usize); 8]> = target
            .types()
            .keys()
            .iter()
            .enumerate()
            .filter_map(|(dst, &key)| source.column_index(key).map(|src| (src, dst)))
            .collect();

        // SAFETY: every shared slot of the new row is written below; the rest
        // belong to the caller's bundle
        let new_row = unsafe { target.allocate_row() };
        for &(src, dst) in &shared {
            source.column_by_index(src).copy_row_into(
                handle.row(),
                target.column_by_index_mut(dst),
                new_row,
            );
        }
        Ok(new_row)
    }

    /// Read-only query over every archetype containing the requested components
    ///
    /// ```ignore
    /// for (handle, pos) in world.query::<(EntityHandle, &Position)>()?.iter() { .. }
    /// ```
    pub fn query<'w, Q>(&'w self) -> Result<Query<'w, Q>>
    where
        Q: ReadOnlyFetch<'w>,
    {
        Query::new(self)
    }

    /// Query that may hand out `&mut T`; borrows the world exclusively
    pub fn query_mut<'w, Q>(&'w mut self) -> Result<Query<'w, Q>>
    where
        Q: QueryFetch<'w>,
    {
        Query::new(&*self)
    }

    /// Run `func` for every matching row, archetype order then row order
    ///
    /// Rows marked for removal are visited until `flush`, so an entity
    /// migrated since the last flush is seen in both its old and new row.
    pub fn execute<'w, Q, F>(&'w self, func: F) -> Result<()>
    where
        Q: ReadOnlyFetch<'w>,
        F: FnMut(Q::Item),
    {
        self.query::<Q>()?.for_each(func);
        Ok(())
    }

    pub fn execute_mut<'w, Q, F>(&'w mut self, func: F) -> Result<()>
    where
        Q: QueryFetch<'w>,
        F: FnMut(Q::Item),
    {
        self.query_mut::<Q>()?.for_each(func);
        Ok(())
    }

    /// Run `func` for every matching row on the rayon pool; blocks until done
    #[cfg(feature = "parallel")]
    pub fn execute_parallel<'w, Q, F>(&'w self, func: F) -> Result<()>
    where
        Q: ReadOnlyFetch<'w>,
        F: Fn(Q::Item) + Send + Sync,
    {
        self.query::<Q>()?.par_for_each(func);
        Ok(())
    }

    #[cfg(feature = "parallel")]
    pub fn execute_parallel_mut<'w, Q, F>(&'w mut self, func: F) -> Result<()>
    where
        Q: QueryFetch<'w>,
        F: Fn(Q::Item) + Send + Sync,
    {
        self.query_mut::<Q>()?.par_for_each(func);
        Ok(())
    }

    /// Rows across all archetypes, including rows waiting for `flush`
    pub fn total_entity_count(&self) -> usize {
        self.archetypes.total_entity_count()
    }

    pub fn total_archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Rows marked for removal and not yet flushed
    pub fn pending_removal_count(&self) -> usize {
        self.archetypes.pending_removal_count()
    }

    /// Get archetype by ID
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// All archetypes in creation order
    pub fn archetypes(&self) -> std::slice::Iter<'_, Archetype> {
        self.archetypes.iter()
    }

    /// Get query cache statistics for diagnostics
    pub fn query_cache_stats(&self) -> QueryCacheStats {
        self.archetypes.query_cache_stats()
    }

    pub fn clear_query_cache(&self) {
        self.archetypes.clear_query_cache();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Append one row to `archetype` and write `bundle` into it
fn write_bundle<B: Bundle>(archetype: &mut Archetype, columns: &[usize], bundle: B) -> usize {
    // SAFETY: `columns` covers every column of the archetype (the bundle's
    // type set is exactly the archetype's), so the whole row is written
    unsafe {
        let row = archetype.allocate_row();
        let ptrs: SmallVec<[*mut u8; MAX_BUNDLE_COMPONENTS]> = columns
            .iter()
            .map(|&column| archetype.slot_ptr(column, row))
            .collect();
        bundle.write_components(&ptrs);
        row
    }
}

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

//! Query system with archetype filtering
//!
//! The requested component types are named up front as a type parameter:
//! `world.query::<(EntityHandle, &Position, &Velocity)>()`. The set of
//! components is resolved to a cached list of matching archetypes, then
//! column pointers are captured once per archetype and rows are streamed in
//! archetype creation order, row-ascending.

use std::any::{type_name, TypeId};
use std::marker::PhantomData;
use std::ptr::NonNull;

use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeId, Signature, TypeKeys, TypeSet};
use crate::component::{Component, TypeRegistry};
use crate::entity::EntityHandle;
use crate::error::{EcsError, Result};
use crate::world::World;

/// Component types named by a query, in request order
pub type QueryTypes = SmallVec<[(TypeId, &'static str); 8]>;

/// Typed base pointer of one column, captured once per archetype
pub struct ColumnPtr<T> {
    ptr: NonNull<T>,
}

impl<T> Clone for ColumnPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnPtr<T> {}

// SAFETY: only `Component` values (Send + Sync) are reached through the
// pointer; the query drivers hand every row out at most once.
unsafe impl<T: Component> Send for ColumnPtr<T> {}
unsafe impl<T: Component> Sync for ColumnPtr<T> {}

impl<T: Component> ColumnPtr<T> {
    fn of(archetype: &Archetype) -> Option<Self> {
        let column = archetype.column_of::<T>()?;
        Some(Self {
            ptr: column.base_ptr().cast::<T>(),
        })
    }
}

/// Trait for fetching one query item per row
///
/// # Safety
/// `prepare` must only return state for archetypes that actually store every
/// fetched component, and `fetch` must stay within the prepared archetype.
pub unsafe trait QueryFetch<'w> {
    /// The type of data returned by the query
    type Item;
    /// State used to fetch data (e.g. column pointers)
    type State: Send + Sync;

    /// Append the component types this fetch reads, registered or not
    fn collect_types(types: &mut QueryTypes);

    /// Append the component keys this fetch reads
    ///
    /// Fails with the type name of a component the world never registered.
    fn collect_keys(
        registry: &TypeRegistry,
        keys: &mut TypeKeys,
    ) -> std::result::Result<(), &'static str>;

    /// Prepare to fetch from an archetype
    fn prepare(archetype: &'w Archetype, generation: u32) -> Option<Self::State>;

    /// Fetch data for a specific row
    ///
    /// # Safety
    /// - `row` must be a live row of the archetype used in `prepare`
    /// - Must not be called twice for the same row while a mutable item is alive
    unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item;
}

/// Marker for fetches that never hand out `&mut`
///
/// # Safety
/// Implementors must not produce mutable references.
pub unsafe trait ReadOnlyFetch<'w>: QueryFetch<'w> {}

unsafe impl<'w, T: Component> QueryFetch<'w> for &'w T {
    type Item = &'w T;
    type State = ColumnPtr<T>;

    fn collect_types(types: &mut QueryTypes) {
        types.push((TypeId::of::<T>(), type_name::<T>()));
    }

    fn collect_keys(
        registry: &TypeRegistry,
        keys: &mut TypeKeys,
    ) -> std::result::Result<(), &'static str> {
        keys.push(registry.key_of::<T>().ok_or(type_name::<T>())?);
        Ok(())
    }

    fn prepare(archetype: &'w Archetype, _generation: u32) -> Option<Self::State> {
        ColumnPtr::of(archetype)
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item {
        &*state.ptr.as_ptr().add(row)
    }
}

unsafe impl<'w, T: Component> ReadOnlyFetch<'w> for &'w T {}

unsafe impl<'w, T: Component> QueryFetch<'w> for &'w mut T {
    type Item = &'w mut T;
    type State = ColumnPtr<T>;

    fn collect_types(types: &mut QueryTypes) {
        types.push((TypeId::of::<T>(), type_name::<T>()));
    }

    fn collect_keys(
        registry: &TypeRegistry,
        keys: &mut TypeKeys,
    ) -> std::result::Result<(), &'static str> {
        keys.push(registry.key_of::<T>().ok_or(type_name::<T>())?);
        Ok(())
    }

    fn prepare(archetype: &'w Archetype, _generation: u32) -> Option<Self::State> {
        ColumnPtr::of(archetype)
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item {
        // SAFETY: rows are disjoint and handed out once per query run
        &mut *state.ptr.as_ptr().add(row)
    }
}

/// Handle of the current row, valid for the generation the query ran at
unsafe impl<'w> QueryFetch<'w> for EntityHandle {
    type Item = EntityHandle;
    type State = (ArchetypeId, Signature, u32);

    fn collect_types(_types: &mut QueryTypes) {}

    fn collect_keys(
        _registry: &TypeRegistry,
        _keys: &mut TypeKeys,
    ) -> std::result::Result<(), &'static str> {
        Ok(())
    }

    fn prepare(archetype: &'w Archetype, generation: u32) -> Option<Self::State> {
        Some((archetype.id(), archetype.signature(), generation))
    }

    unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item {
        let (archetype, signature, generation) = *state;
        EntityHandle::new(row, archetype, signature, generation)
    }
}

unsafe impl<'w> ReadOnlyFetch<'w> for EntityHandle {}

macro_rules! impl_query_fetch {
    ($($F:ident),+) => {
        unsafe impl<'w, $($F: QueryFetch<'w>),+> QueryFetch<'w> for ($($F,)+) {
            type Item = ($($F::Item,)+);
            type State = ($($F::State,)+);

            fn collect_types(types: &mut QueryTypes) {
                $($F::collect_types(types);)+
            }

            fn collect_keys(
                registry: &TypeRegistry,
                keys: &mut TypeKeys,
            ) -> std::result::Result<(), &'static str> {
                $($F::collect_keys(registry, keys)?;)+
                Ok(())
            }

            fn prepare(archetype: &'w Archetype, generation: u32) -> Option<Self::State> {
                Some(($($F::prepare(archetype, generation)?,)+))
            }

            #[allow(non_snake_case)]
            unsafe fn fetch(state: &Self::State, row: usize) -> Self::Item {
                let ($($F,)+) = state;
                ($($F::fetch($F, row),)+)
            }
        }

        unsafe impl<'w, $($F: ReadOnlyFetch<'w>),+> ReadOnlyFetch<'w> for ($($F,)+) {}
    };
}

impl_query_fetch!(A);
impl_query_fetch!(A, B);
impl_query_fetch!(A, B, C);
impl_query_fetch!(A, B, C, D);
impl_query_fetch!(A, B, C, D, E);
impl_query_fetch!(A, B, C, D, E, F);
impl_query_fetch!(A, B, C, D, E, F, G);
impl_query_fetch!(A, B, C, D, E, F, G, H);

/// Resolved query over one world
///
/// Built by [`World::query`] (read-only items) or [`World::query_mut`].
/// Holds the matching archetype list; rows are read when it is consumed.
///
/// Rows marked for removal are still visited until the next flush. An entity
/// migrated by `add_components` or `remove_components` therefore appears
/// twice before the flush: once in its old row and once in its new one.
pub struct Query<'w, Q> {
    world: &'w World,
    matched: Vec<ArchetypeId>,
    generation: u32,
    _phantom: PhantomData<fn() -> Q>,
}

impl<'w, Q: QueryFetch<'w>> Query<'w, Q> {
    /// Resolve the requested components to matching archetypes
    pub(crate) fn new(world: &'w World) -> Result<Self> {
        let mut types = QueryTypes::new();
        Q::collect_types(&mut types);
        for (index, &(type_id, name)) in types.iter().enumerate() {
            if types[..index].iter().any(|&(seen, _)| seen == type_id) {
                return Err(EcsError::DuplicateComponent(name));
            }
        }

        let registry = world.type_registry();
        let mut keys = TypeKeys::new();
        let matched = match Q::collect_keys(registry, &mut keys) {
            Ok(()) => {
                let subset = TypeSet::from_unsorted(&keys)
                    .map_err(|duplicate| EcsError::DuplicateComponent(registry.name(duplicate)))?;
                world.archetype_registry().find_matching(&subset)
            }
            // A component the world never registered is on no entity
            Err(_) => Vec::new(),
        };

        Ok(Self {
            world,
            matched,
            generation: world.generation(),
            _phantom: PhantomData,
        })
    }

    /// Number of matched archetypes
    pub fn archetype_count(&self) -> usize {
        self.matched.len()
    }

    /// Count matching rows
    pub fn count(&self) -> usize {
        self.matched
            .iter()
            .filter_map(|&id| self.world.archetype(id))
            .map(Archetype::len)
            .sum()
    }

    /// Run `func` for every matching row, sequentially
    pub fn for_each<F>(self, mut func: F)
    where
        F: FnMut(Q::Item),
    {
        #[cfg(feature = "profiling")]
        let span = info_span!("query.for_each", archetypes = self.matched.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        for &id in &self.matched {
            let Some(archetype) = self.world.archetype(id) else {
                continue;
            };
            let Some(state) = Q::prepare(archetype, self.generation) else {
                continue;
            };
            for row in 0..archetype.len() {
                // SAFETY: row is live and visited once
                func(unsafe { Q::fetch(&state, row) });
            }
        }
    }

    /// Run `func` for every matching row, splitting each archetype's rows
    /// across the rayon pool
    ///
    /// Archetypes are processed one after another; the call returns once
    /// every row has been visited. No ordering between rows is guaranteed.
    #[cfg(feature = "parallel")]
    pub fn par_for_each<F>(self, func: F)
    where
        F: Fn(Q::Item) + Send + Sync,
    {
        use rayon::prelude::*;

        #[cfg(feature = "profiling")]
        let span = info_span!("query.par_for_each", archetypes = self.matched.len());
        #[cfg(feature = "profiling")]
        let _span_guard = span.enter();

        let batch_size = self.world.config().parallel_batch_size.max(1);
        for &id in &self.matched {
            let Some(archetype) = self.world.archetype(id) else {
                continue;
            };
            let Some(state) = Q::prepare(archetype, self.generation) else {
                continue;
            };
            (0..archetype.len())
                .into_par_iter()
                .with_min_len(batch_size)
                .for_each(|row| {
                    // SAFETY: every row index is produced exactly once
                    func(unsafe { Q::fetch(&state, row) });
                });
        }
    }
}

impl<'w, Q: ReadOnlyFetch<'w>> Query<'w, Q> {
    /// Iterate without consuming the query
    pub fn iter(&self) -> QueryIter<'w, Q> {
        QueryIter::new(self.world, self.matched.clone(), self.generation)
    }
}

impl<'w, Q: QueryFetch<'w>> IntoIterator for Query<'w, Q> {
    type Item = Q::Item;
    type IntoIter = QueryIter<'w, Q>;

    fn into_iter(self) -> Self::IntoIter {
        QueryIter::new(self.world, self.matched, self.generation)
    }
}

/// Query iterator
pub struct QueryIter<'w, Q: QueryFetch<'w>> {
    world: &'w World,
    matched: std::vec::IntoIter<ArchetypeId>,
    current: Option<(Q::State, usize)>,
    row: usize,
    generation: u32,
}

impl<'w, Q: QueryFetch<'w>> QueryIter<'w, Q> {
    fn new(world: &'w World, matched: Vec<ArchetypeId>, generation: u32) -> Self {
        Self {
            world,
            matched: matched.into_iter(),
            current: None,
            row: 0,
            generation,
        }
    }
}

impl<'w, Q: QueryFetch<'w>> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((state, len)) = &self.current {
                if self.row < *len {
                    let row = self.row;
                    self.row += 1;
                    // SAFETY: row is below the archetype length and yielded once
                    return Some(unsafe { Q::fetch(state, row) });
                }
            }

            let id = self.matched.next()?;
            let generation = self.generation;
            self.current = self.world.archetype(id).and_then(|archetype| {
                Q::prepare(archetype, generation).map(|state| (state, archetype.len()))
            });
            self.row = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let current = self
            .current
            .as_ref()
            .map_or(0, |(_, len)| len.saturating_sub(self.row));
        let rest: usize = self
            .matched
            .as_slice()
            .iter()
            .filter_map(|&id| self.world.archetype(id))
            .map(Archetype::len)
            .sum();
        (current + rest, Some(current + rest))
    }
}

impl<'w, Q: QueryFetch<'w>> ExactSizeIterator for QueryIter<'w, Q> {}

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

//! Component types, the per-world type registry and Bundle trait
//!
//! Components are plain data attached to entities. Every component type gets a
//! sequential [`TypeKey`] the first time a world sees it; keys are never reused
//! and never shared between worlds.

use std::alloc::Layout;
use std::any::{type_name, TypeId};

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components are moved between archetypes with raw byte copies and are never
/// dropped, so they must be plain `Copy` values without borrowed data.
pub trait Component: Copy + Send + Sync + 'static {}

/// Automatically implement Component for all valid types
impl<T: Copy + Send + Sync + 'static> Component for T {}

/// Stable identifier of a component type within one world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey(u32);

impl TypeKey {
    /// Build a key from its raw value
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw key value
    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registration record for one component type
#[derive(Debug, Clone, Copy)]
pub struct ComponentInfo {
    key: TypeKey,
    type_id: TypeId,
    name: &'static str,
    layout: Layout,
}

impl ComponentInfo {
    fn new<T: Component>(key: TypeKey) -> Self {
        Self {
            key,
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            layout: Layout::new::<T>(),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Storage footprint of one value
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

/// Registry assigning sequential keys to component types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_type: FxHashMap<TypeId, TypeKey>,
    infos: Vec<ComponentInfo>,
}

impl TypeRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, returning its key. Registering twice returns the same key.
    pub fn register<T: Component>(&mut self) -> TypeKey {
        let type_id = TypeId::of::<T>();
        if let Some(&key) = self.by_type.get(&type_id) {
            return key;
        }

        // Panic on overflow - indicates programming error, not user error
        let Ok(raw) = u32::try_from(self.infos.len()) else {
            panic!("Component key space exhausted: {} types registered", self.infos.len());
        };
        let key = TypeKey(raw);
        self.infos.push(ComponentInfo::new::<T>(key));
        self.by_type.insert(type_id, key);
        tracing::trace!(component = type_name::<T>(), key = raw, "registered component");
        key
    }

    /// Key of `T` if it has been registered
    pub fn key_of<T: Component>(&self) -> Option<TypeKey> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Storage size of one `T`
    pub fn size_of<T: Component>() -> usize {
        std::mem::size_of::<T>()
    }

    /// Get registration by key
    pub fn info(&self, key: TypeKey) -> Option<&ComponentInfo> {
        self.infos.get(key.index())
    }

    /// Type name for a key, for diagnostics
    pub fn name(&self, key: TypeKey) -> &'static str {
        self.info(key).map_or("<unregistered>", ComponentInfo::name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Bundle of components
///
/// Allows spawning entities with multiple components at once, and names a set
/// of component types for `remove_components`.
pub trait Bundle: Send + Sync + 'static {
    /// Register every component type and return the keys in tuple order
    fn register_keys(registry: &mut TypeRegistry) -> SmallVec<[TypeKey; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Look up the keys in tuple order without registering
    ///
    /// Fails with the type name of the first unregistered component.
    fn lookup_keys(
        registry: &TypeRegistry,
    ) -> std::result::Result<SmallVec<[TypeKey; MAX_BUNDLE_COMPONENTS]>, &'static str>
    where
        Self: Sized;

    /// Write components to raw pointers, one pointer per component in tuple order
    ///
    /// # Safety
    /// Caller must ensure pointers are valid and aligned for the matching type
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn register_keys(
                registry: &mut TypeRegistry,
            ) -> SmallVec<[TypeKey; MAX_BUNDLE_COMPONENTS]> {
                let _ = &registry;
                smallvec![$(registry.register::<$T>()),*]
            }

            fn lookup_keys(
                registry: &TypeRegistry,
            ) -> std::result::Result<SmallVec<[TypeKey; MAX_BUNDLE_COMPONENTS]>, &'static str> {
                let _ = &registry;
                Ok(smallvec![$(registry.key_of::<$T>().ok_or(type_name::<$T>())?),*])
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut ptrs = ptrs.iter();
                $(
                    if let Some(&ptr) = ptrs.next() {
                        ptr.cast::<$T>().write($T);
                    }
                )*
            }
        }
    };
}

// Implement for the empty bundle and tuples of 1-8 components
impl_bundle!();
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy)]
    struct Velocity {
        x: f32,
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = TypeRegistry::new();
        let a = registry.register::<Position>();
        let b = registry.register::<Velocity>();
        assert_ne!(a, b);
        assert_eq!(registry.register::<Position>(), a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_keys_are_sequential() {
        let mut registry = TypeRegistry::new();
        assert_eq!(registry.register::<u8>().raw(), 0);
        assert_eq!(registry.register::<u16>().raw(), 1);
        assert_eq!(registry.register::<u32>().raw(), 2);
    }

    #[test]
    fn test_info_records_size() {
        let mut registry = TypeRegistry::new();
        let key = registry.register::<Position>();
        let info = registry.info(key).unwrap();
        assert_eq!(info.size(), std::mem::size_of::<Position>());
        assert_eq!(info.type_id(), TypeId::of::<Position>());
        assert_eq!(TypeRegistry::size_of::<Position>(), 8);
    }

    #[test]
    fn test_lookup_unregistered() {
        let mut registry = TypeRegistry::new();
        registry.register::<Position>();
        assert!(registry.key_of::<Velocity>().is_none());
        let err = <(Position, Velocity)>::lookup_keys(&registry).unwrap_err();
        assert!(err.ends_with("Velocity"));
    }

    #[test]
    fn test_bundle_keys_in_tuple_order() {
        let mut registry = TypeRegistry::new();
        let keys = <(Velocity, Position)>::register_keys(&mut registry);
        assert_eq!(keys.len(), 2);
        assert_eq!(registry.key_of::<Velocity>(), Some(keys[0]));
        assert_eq!(registry.key_of::<Position>(), Some(keys[1]));
        assert!(<()>::register_keys(&mut registry).is_empty());
    }
}

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

//! Reader/writer gate for a world driven from several threads
//!
//! Queries and `remove_entity` only need `&World` and run under a shared
//! token; structural changes and `flush` need `&mut World` and run under the
//! exclusive token, which waits until every shared token is dropped.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::world::World;

/// World behind a reader/writer lock
pub struct SharedWorld {
    world: RwLock<World>,
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            world: RwLock::new(world),
        }
    }

    /// Shared token for queries and marking removals
    pub fn read(&self) -> RwLockReadGuard<'_, World> {
        self.world.read()
    }

    /// Exclusive token for structural mutation; blocks while readers are active
    pub fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.world.write()
    }

    /// Exclusive token if no reader or writer holds the gate
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, World>> {
        self.world.try_write()
    }

    /// Flush under the exclusive token, returning the number of removed rows
    pub fn flush(&self) -> usize {
        self.world.write().flush()
    }

    pub fn into_inner(self) -> World {
        self.world.into_inner()
    }
}

impl Default for SharedWorld {
    fn default() -> Self {
        Self::new(World::new())
    }
}

impl From<World> for SharedWorld {
    fn from(world: World) -> Self {
        Self::new(world)
    }
}

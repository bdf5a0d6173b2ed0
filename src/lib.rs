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

//! Archetype Store - column-oriented entity/component storage
//!
//! Entities sharing one exact set of component types live together in an
//! archetype, one densely packed column per type. Queries name the types they
//! want and visit every archetype holding a superset of them. Removal is
//! deferred until [`World::flush`], which also invalidates outstanding
//! [`EntityHandle`]s.

pub mod archetype;
pub mod archetypes;
pub mod component;
pub mod config;
pub mod debug;
pub mod entity;
pub mod error;
pub mod prelude;
pub mod query;
pub mod shared;
pub mod world;


pub use archetype::*;
pub use archetypes::*;
pub use component::*;
pub use config::*;
pub use debug::*;
pub use entity::*;
pub use error::*;
pub use query::*;
pub use shared::*;
pub use world::*;

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

pub use crate::component::{Bundle, Component, TypeKey};
pub use crate::config::WorldConfig;
pub use crate::debug::WorldInspector;
pub use crate::entity::EntityHandle;
pub use crate::error::{EcsError, Result};
pub use crate::query::Query;
pub use crate::shared::SharedWorld;
pub use crate::world::World;

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

//! Entity handles
//!
//! A handle is a plain value naming a row of an archetype at one world
//! generation. Rows move during `flush`, which also advances the generation,
//! so a handle is only good until the next flush.

use crate::archetype::{ArchetypeId, Signature};

/// Entity location in archetype (archetype, row) plus the generation it was issued at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    row: usize,
    archetype: ArchetypeId,
    signature: Signature,
    generation: u32,
}

impl EntityHandle {
    pub(crate) fn new(
        row: usize,
        archetype: ArchetypeId,
        signature: Signature,
        generation: u32,
    ) -> Self {
        Self {
            row,
            archetype,
            signature,
            generation,
        }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Signature of the archetype's type set
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// World generation this handle was issued at
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

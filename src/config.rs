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

//! World tuning knobs

/// Rows reserved in every new archetype
pub const DEFAULT_ROW_CAPACITY: usize = 128;

/// Upper bound on distinct archetypes per world
pub const DEFAULT_MAX_ARCHETYPES: usize = 10_000;

/// Minimum rows handed to one rayon task
pub const DEFAULT_PARALLEL_BATCH_SIZE: usize = 1_024;

/// Configuration for a [`World`](crate::World)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    /// Rows reserved up front when an archetype is created
    pub initial_row_capacity: usize,
    /// Creating more archetypes than this fails with `ArchetypeLimitExceeded`
    pub max_archetypes: usize,
    /// Smallest row range processed by one parallel task
    pub parallel_batch_size: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_row_capacity: DEFAULT_ROW_CAPACITY,
            max_archetypes: DEFAULT_MAX_ARCHETYPES,
            parallel_batch_size: DEFAULT_PARALLEL_BATCH_SIZE,
        }
    }
}

impl WorldConfig {
    pub fn with_initial_row_capacity(mut self, rows: usize) -> Self {
        self.initial_row_capacity = rows;
        self
    }

    pub fn with_max_archetypes(mut self, limit: usize) -> Self {
        self.max_archetypes = limit;
        self
    }

    /// Batch size is clamped to at least one row
    pub fn with_parallel_batch_size(mut self, rows: usize) -> Self {
        self.parallel_batch_size = rows.max(1);
        self
    }
}

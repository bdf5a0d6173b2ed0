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

//! Error types
//!
//! Every variant describes a contract violation by the code driving the
//! store. They are returned instead of aborting so callers can decide whether
//! to propagate or panic.

use std::fmt;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Handle was issued before the last flush
    StaleHandle {
        handle_generation: u32,
        world_generation: u32,
    },

    /// The same component type appears twice in one type set
    DuplicateComponent(&'static str),

    /// Entity's archetype has no column for the requested component
    ComponentNotFound(&'static str),

    /// Handle refers to an archetype this world never created
    ArchetypeNotFound,

    /// Row index past the end of the archetype
    RowOutOfBounds { row: usize, len: usize },

    /// Row is already queued for removal in this generation
    AlreadyMarkedForRemoval { row: usize },

    /// Raw row bytes do not match the column element size
    ComponentSizeMismatch { expected: usize, actual: usize },

    /// Raw row has a different number of slices than the archetype has columns
    ColumnCountMismatch { expected: usize, actual: usize },

    /// Type keys handed to an archetype were not strictly ascending
    UnsortedTypeSet,

    /// Too many distinct archetypes
    ArchetypeLimitExceeded(usize),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::StaleHandle {
                handle_generation,
                world_generation,
            } => write!(
                f,
                "Stale entity handle: issued at generation {handle_generation}, world is at {world_generation}"
            ),
            EcsError::DuplicateComponent(name) => {
                write!(f, "Duplicate component type in type set: {name}")
            }
            EcsError::ComponentNotFound(name) => write!(f, "Component not found: {name}"),
            EcsError::ArchetypeNotFound => write!(f, "Archetype not found"),
            EcsError::RowOutOfBounds { row, len } => {
                write!(f, "Row {row} out of bounds for archetype with {len} rows")
            }
            EcsError::AlreadyMarkedForRemoval { row } => {
                write!(f, "Row {row} is already marked for removal")
            }
            EcsError::ComponentSizeMismatch { expected, actual } => {
                write!(f, "Component size mismatch: expected {expected} bytes, got {actual}")
            }
            EcsError::ColumnCountMismatch { expected, actual } => {
                write!(f, "Column count mismatch: expected {expected} columns, got {actual}")
            }
            EcsError::UnsortedTypeSet => {
                write!(f, "Type keys must be sorted ascending and unique")
            }
            EcsError::ArchetypeLimitExceeded(limit) => {
                write!(f, "Archetype limit exceeded ({limit})")
            }
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_handle_message() {
        let err = EcsError::StaleHandle {
            handle_generation: 1,
            world_generation: 3,
        };
        assert_eq!(
            err.to_string(),
            "Stale entity handle: issued at generation 1, world is at 3"
        );
    }
}

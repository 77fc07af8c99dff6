//! Spawner errors

use spawner_core::id::{Location, SpawnerId};
use spawner_inventory::InventoryError;
use thiserror::Error;

/// Errors raised by spawner operations.
///
/// Capacity limits are not errors; they are reported through return values
/// such as [`crate::StackResize`] and [`crate::DepositOutcome`].
#[derive(Debug, Error)]
pub enum SpawnerError {
    #[error("Cycle lock on spawner {id} not acquired in time")]
    LockTimeout { id: SpawnerId },

    #[error("Spawner not found: {0}")]
    NotFound(SpawnerId),

    #[error("Spawner removed: {0}")]
    Removed(SpawnerId),

    #[error("A spawner already occupies {0}")]
    DuplicateLocation(Location),

    #[error("Cannot stack {source_type} onto {target_type}")]
    IncompatibleStack {
        target_type: String,
        source_type: String,
    },

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
}

pub type SpawnerResult<T> = Result<T, SpawnerError>;

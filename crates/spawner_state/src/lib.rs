//! # Spawner State
//!
//! The authoritative record of every spawner: identity, stack size, cycle
//! timing, stored experience and loot storage, plus the registry that indexes
//! spawners by id and location.
//!
//! ## Concurrency
//!
//! - The cycle check serializes on one lock acquired with a bounded timeout
//! - Stack size, experience, flags and delay are atomics
//! - Storage mutations run under the spawner's inventory mutex
//! - Observers are called with no internal lock held
//!
//! ## Example
//!
//! ```ignore
//! use spawner_state::prelude::*;
//!
//! let manager = SpawnerManager::new(Arc::new(config));
//! let spawner = manager.place(Location::new("world", 10, 64, -3), "ZOMBIE", now)?;
//!
//! if spawner.try_advance_cycle(now) {
//!     let (min, max) = spawner.mob_range();
//!     let loot = generator.generate(&spawner.entity_type(), min, max, true);
//!     spawner.deposit_loot(&loot);
//! }
//! ```

pub mod error;
pub mod manager;
pub mod snapshot;
pub mod state;

pub mod prelude {
    pub use crate::error::{SpawnerError, SpawnerResult};
    pub use crate::manager::{SpawnerManager, StackTransfer};
    pub use crate::snapshot::SpawnerSnapshot;
    pub use crate::state::{
        ChangedField, CycleTimer, DepositOutcome, Lifecycle, SpawnerLimits, SpawnerObserver,
        SpawnerState, StackResize,
    };
}

pub use prelude::*;

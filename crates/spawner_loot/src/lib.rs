//! Spawner Loot - Batched Loot Generation
//!
//! Converts a spawner's mob-count range and its entity type's loot table
//! into items and experience.
//!
//! - Guaranteed drops (chance >= 100%) are drawn for every mob
//! - Probabilistic drops share one chance roll per batch of mobs
//! - Equipment drops carry a random damage attribute and can be disabled
//!
//! # Example
//!
//! ```ignore
//! use spawner_loot::prelude::*;
//!
//! let registry = LootRegistry::new().with_table(
//!     "ZOMBIE",
//!     LootTable::new()
//!         .with_experience(5)
//!         .with_entry(LootEntry::new("ROTTEN_FLESH").with_amount(0, 2)),
//! );
//! let generator = LootGenerator::new(registry, DEFAULT_BATCH_SIZE);
//! let loot = generator.generate("ZOMBIE", 4, 16, true);
//! ```

pub mod generator;
pub mod table;

pub mod prelude {
    pub use crate::generator::{LootGenerator, LootResult, DEFAULT_BATCH_SIZE};
    pub use crate::table::{LootEntry, LootRegistry, LootTable};
}

pub use prelude::*;

//! # Spawner Engine
//!
//! Runtime for stacked virtual spawners. Owns the spawner registry, the loot
//! generator and the view synchronizer, and drives the periodic spawn-cycle
//! check.
//!
//! ## Features
//!
//! - Fixed-rate cycle check on a shared worker pool
//! - Player actions: panels, stack resizing, experience collection, filters
//! - Range checker hook (`set_stopped`)
//! - Snapshot and restore of every spawner
//!
//! ## Example
//!
//! ```ignore
//! use spawner_engine::prelude::*;
//!
//! let config = SpawnerConfig::load("spawners.toml")?;
//! let engine = SpawnerEngine::builder(config).threaded(true).build();
//!
//! let spawner = engine.place(Location::new("world", 10, 64, -3), "ZOMBIE")?;
//! engine.open_panel(ViewerId::new("player-1"), spawner.id(), ViewKind::Primary)?;
//! engine.start();
//! ```

pub mod engine;
pub mod error;

pub mod prelude {
    pub use crate::engine::{CycleOutcome, CycleReport, EngineBuilder, EngineStats, SpawnerEngine};
    pub use crate::error::{EngineError, EngineResult};

    pub use spawner_core::prelude::*;
    pub use spawner_inventory::prelude::*;
    pub use spawner_loot::prelude::*;
    pub use spawner_state::prelude::*;
    pub use spawner_view::prelude::*;
}

pub use prelude::*;

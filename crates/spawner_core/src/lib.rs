//! # Spawner Core
//!
//! Shared primitives for the spawner runtime.
//!
//! - Stable identifiers for spawners and viewers
//! - World locations used as placement keys
//! - TOML configuration with per-field defaults
//! - Wall and manual clocks (milliseconds)
//! - Fixed-rate scheduler backed by a shared worker pool
//!
//! ## Usage
//!
//! ```ignore
//! use spawner_core::prelude::*;
//!
//! let config = SpawnerConfig::load("spawners.toml")?;
//! let scheduler = Scheduler::new(config.scheduler.worker_threads);
//!
//! let handle = scheduler.schedule_at_fixed_rate(
//!     "cycle-check",
//!     config.scheduler.cycle_check_interval(),
//!     move || engine.run_cycle_check(),
//! );
//! ```

pub mod clock;
pub mod config;
pub mod id;
pub mod scheduler;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock, MILLIS_PER_TICK};
    pub use crate::config::{
        ConfigError, ConfigResult, DropDef, DurabilityRange, LootSection, MobDef,
        SchedulerSection, SpawnerConfig, SpawnerSection, ViewSection,
    };
    pub use crate::id::{Location, SpawnerId, ViewerId};
    pub use crate::scheduler::{Scheduler, TaskHandle};
}

pub use prelude::*;

//! Spawner runtime configuration
//!
//! Loaded from TOML. Every field has a default so a partial file (or no file at
//! all) yields a usable configuration.
//!
//! ```toml
//! [spawner]
//! max_stack_size = 1000
//! spawn_delay_ticks = 500
//!
//! [items]
//! DIAMOND_SWORD = 1
//!
//! [mobs.ZOMBIE]
//! experience = 5
//!
//! [[mobs.ZOMBIE.drops]]
//! item = "ROTTEN_FLESH"
//! min = 0
//! max = 2
//! chance = 100.0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::clock::MILLIS_PER_TICK;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpawnerConfig {
    #[serde(default)]
    pub spawner: SpawnerSection,
    #[serde(default)]
    pub loot: LootSection,
    /// Max stack size per item kind
    #[serde(default)]
    pub items: HashMap<String, u32>,
    /// Loot definitions per entity type
    #[serde(default)]
    pub mobs: BTreeMap<String, MobDef>,
    #[serde(default)]
    pub view: ViewSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
}

impl SpawnerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: SpawnerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.spawner;
        if s.max_stack_size == 0 {
            return Err(ConfigError::Invalid("spawner.max_stack_size must be at least 1".into()));
        }
        if s.min_mobs > s.max_mobs {
            return Err(ConfigError::Invalid(format!(
                "spawner.min_mobs ({}) exceeds spawner.max_mobs ({})",
                s.min_mobs, s.max_mobs
            )));
        }
        if s.spawn_delay_ticks == 0 {
            return Err(ConfigError::Invalid("spawner.spawn_delay_ticks must be at least 1".into()));
        }
        if s.default_item_max_stack == 0 {
            return Err(ConfigError::Invalid("spawner.default_item_max_stack must be at least 1".into()));
        }
        if self.loot.batch_size == 0 {
            return Err(ConfigError::Invalid("loot.batch_size must be at least 1".into()));
        }
        if self.scheduler.worker_threads == 0 {
            return Err(ConfigError::Invalid("scheduler.worker_threads must be at least 1".into()));
        }
        if self.view.display_cache_capacity == 0 {
            return Err(ConfigError::Invalid("view.display_cache_capacity must be at least 1".into()));
        }
        for (kind, max) in &self.items {
            if *max == 0 {
                return Err(ConfigError::Invalid(format!("items.{} max stack must be at least 1", kind)));
            }
        }
        for (mob, def) in &self.mobs {
            for drop in &def.drops {
                if drop.min > drop.max {
                    return Err(ConfigError::Invalid(format!(
                        "mobs.{}: drop {} has min {} > max {}",
                        mob, drop.item, drop.min, drop.max
                    )));
                }
                if !(drop.chance >= 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "mobs.{}: drop {} has negative chance",
                        mob, drop.item
                    )));
                }
                if let Some(d) = &drop.durability {
                    if d.min > d.max {
                        return Err(ConfigError::Invalid(format!(
                            "mobs.{}: drop {} has inverted durability range",
                            mob, drop.item
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Max stack size for an item kind
    pub fn item_max_stack(&self, kind: &str) -> u32 {
        self.items
            .get(kind)
            .copied()
            .unwrap_or(self.spawner.default_item_max_stack)
    }
}

/// Per-spawner limits and base rates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpawnerSection {
    #[serde(default = "default_max_stack_size")]
    pub max_stack_size: u32,
    /// Mobs per cycle for a single (unstacked) spawner
    #[serde(default = "default_min_mobs")]
    pub min_mobs: u32,
    #[serde(default = "default_max_mobs")]
    pub max_mobs: u32,
    #[serde(default = "default_spawn_delay_ticks")]
    pub spawn_delay_ticks: u64,
    /// Experience cap for a single spawner, scaled by stack size
    #[serde(default = "default_max_stored_experience")]
    pub max_stored_experience: u32,
    /// Virtual inventory slot count
    #[serde(default = "default_loot_slots")]
    pub loot_slots: usize,
    /// Whether equipment drops (items with durability) are generated
    #[serde(default = "default_true")]
    pub allow_equipment: bool,
    #[serde(default = "default_item_max_stack")]
    pub default_item_max_stack: u32,
}

fn default_max_stack_size() -> u32 { 1000 }
fn default_min_mobs() -> u32 { 1 }
fn default_max_mobs() -> u32 { 4 }
fn default_spawn_delay_ticks() -> u64 { 500 }
fn default_max_stored_experience() -> u32 { 1000 }
fn default_loot_slots() -> usize { 45 }
fn default_item_max_stack() -> u32 { 64 }
fn default_true() -> bool { true }

impl Default for SpawnerSection {
    fn default() -> Self {
        Self {
            max_stack_size: default_max_stack_size(),
            min_mobs: default_min_mobs(),
            max_mobs: default_max_mobs(),
            spawn_delay_ticks: default_spawn_delay_ticks(),
            max_stored_experience: default_max_stored_experience(),
            loot_slots: default_loot_slots(),
            allow_equipment: true,
            default_item_max_stack: default_item_max_stack(),
        }
    }
}

impl SpawnerSection {
    /// Spawn delay in milliseconds
    pub fn spawn_delay_ms(&self) -> u64 {
        self.spawn_delay_ticks * MILLIS_PER_TICK
    }
}

/// Loot generation tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LootSection {
    /// Mobs sharing one chance roll for probabilistic drops
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_batch_size() -> u32 { 10 }

impl Default for LootSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Loot definition for one entity type
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MobDef {
    /// Experience per simulated mob
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub drops: Vec<DropDef>,
}

/// One loot table entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DropDef {
    pub item: String,
    #[serde(default = "default_one")]
    pub min: u32,
    #[serde(default = "default_one")]
    pub max: u32,
    /// Drop chance in percent; 100 or more always drops
    #[serde(default = "default_chance")]
    pub chance: f64,
    /// Present on equipment drops
    #[serde(default)]
    pub durability: Option<DurabilityRange>,
}

fn default_one() -> u32 { 1 }
fn default_chance() -> f64 { 100.0 }

/// Damage range applied to equipment drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DurabilityRange {
    pub min: u32,
    pub max: u32,
}

/// Live view tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewSection {
    /// Period of the shared timer recomputation
    #[serde(default = "default_timer_interval_ms")]
    pub timer_interval_ms: u64,
    /// Minimum gap between two pushes to the same viewer
    #[serde(default = "default_push_cooldown_ms")]
    pub push_cooldown_ms: u64,
    /// Bound on cached per-spawner display values
    #[serde(default = "default_display_cache_capacity")]
    pub display_cache_capacity: usize,
}

fn default_timer_interval_ms() -> u64 { 1000 }
fn default_push_cooldown_ms() -> u64 { 250 }
fn default_display_cache_capacity() -> usize { 512 }

impl Default for ViewSection {
    fn default() -> Self {
        Self {
            timer_interval_ms: default_timer_interval_ms(),
            push_cooldown_ms: default_push_cooldown_ms(),
            display_cache_capacity: default_display_cache_capacity(),
        }
    }
}

impl ViewSection {
    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }
}

/// Worker pool and tick rates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSection {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_cycle_check_interval_ms")]
    pub cycle_check_interval_ms: u64,
    /// Bound on waiting for a spawner's cycle lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_worker_threads() -> usize { 4 }
fn default_cycle_check_interval_ms() -> u64 { 1000 }
fn default_lock_timeout_ms() -> u64 { 50 }

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            cycle_check_interval_ms: default_cycle_check_interval_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl SchedulerSection {
    pub fn cycle_check_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_check_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

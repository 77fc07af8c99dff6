//! Persistable spawner snapshots

use serde::{Deserialize, Serialize};
use spawner_core::id::{Location, SpawnerId};
use spawner_inventory::ItemStack;

/// Point-in-time copy of a spawner's persisted fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerSnapshot {
    pub id: SpawnerId,
    pub location: Location,
    pub entity_type: String,
    pub stack_size: u32,
    pub active: bool,
    #[serde(default)]
    pub stopped: bool,
    /// When the spawner last became stopped
    #[serde(default)]
    pub stopped_since: u64,
    pub stored_experience: u32,
    pub last_spawn_timestamp: u64,
    pub spawn_delay_ticks: u64,
    #[serde(default)]
    pub filtered_items: Vec<String>,
    pub inventory_size: usize,
    /// Occupied slots as `(index, stack)`
    #[serde(default)]
    pub inventory: Vec<(usize, ItemStack)>,
}

impl SpawnerSnapshot {
    pub fn total_items(&self) -> u64 {
        self.inventory.iter().map(|(_, s)| s.count as u64).sum()
    }
}

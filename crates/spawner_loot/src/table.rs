//! Loot tables

use serde::{Deserialize, Serialize};
use spawner_core::config::{DropDef, MobDef, SpawnerConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// One possible drop of an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootEntry {
    /// Item kind
    pub item: String,
    /// Amount per mob (inclusive)
    pub min_amount: u32,
    pub max_amount: u32,
    /// Drop chance in percent
    pub chance: f64,
    /// Damage range; present only on equipment
    pub durability: Option<(u32, u32)>,
}

impl LootEntry {
    /// Always drops exactly one
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            min_amount: 1,
            max_amount: 1,
            chance: 100.0,
            durability: None,
        }
    }

    /// Set the per-mob amount range (swapped if reversed)
    pub fn with_amount(mut self, min: u32, max: u32) -> Self {
        self.min_amount = min.min(max);
        self.max_amount = min.max(max);
        self
    }

    /// Set the drop chance in percent
    pub fn with_chance(mut self, chance: f64) -> Self {
        self.chance = chance;
        self
    }

    /// Mark as equipment with a damage range
    pub fn with_durability(mut self, min: u32, max: u32) -> Self {
        self.durability = Some((min.min(max), min.max(max)));
        self
    }

    /// Chance of 100% or more skips the roll
    pub fn is_guaranteed(&self) -> bool {
        self.chance >= 100.0
    }

    pub fn is_equipment(&self) -> bool {
        self.durability.is_some()
    }
}

impl From<&DropDef> for LootEntry {
    fn from(def: &DropDef) -> Self {
        let entry = LootEntry::new(def.item.clone())
            .with_amount(def.min, def.max)
            .with_chance(def.chance);
        match def.durability {
            Some(d) => entry.with_durability(d.min, d.max),
            None => entry,
        }
    }
}

/// Loot table of one entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LootTable {
    /// Experience per simulated mob
    pub experience: u32,
    pub entries: Vec<LootEntry>,
}

impl LootTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experience(mut self, experience: u32) -> Self {
        self.experience = experience;
        self
    }

    pub fn with_entry(mut self, entry: LootEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Split into (guaranteed, probabilistic), keeping table order
    pub fn partition(&self, equipment_allowed: bool) -> (Vec<&LootEntry>, Vec<&LootEntry>) {
        self.entries
            .iter()
            .filter(|e| equipment_allowed || !e.is_equipment())
            .partition(|e| e.is_guaranteed())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&MobDef> for LootTable {
    fn from(def: &MobDef) -> Self {
        Self {
            experience: def.experience,
            entries: def.drops.iter().map(LootEntry::from).collect(),
        }
    }
}

/// Loot tables keyed by entity type
#[derive(Debug, Clone, Default)]
pub struct LootRegistry {
    tables: HashMap<String, Arc<LootTable>>,
}

impl LootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[mobs]` configuration section
    pub fn from_config(config: &SpawnerConfig) -> Self {
        let mut registry = Self::new();
        for (entity_type, def) in &config.mobs {
            registry.insert(entity_type.clone(), LootTable::from(def));
        }
        log::debug!("Loaded {} loot tables", registry.len());
        registry
    }

    /// Register or replace a table
    pub fn insert(&mut self, entity_type: impl Into<String>, table: LootTable) {
        self.tables.insert(entity_type.into(), Arc::new(table));
    }

    pub fn with_table(mut self, entity_type: impl Into<String>, table: LootTable) -> Self {
        self.insert(entity_type, table);
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<Arc<LootTable>> {
        self.tables.get(entity_type).cloned()
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.tables.contains_key(entity_type)
    }

    /// Known entity types, sorted
    pub fn entity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.tables.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_by_chance() {
        let table = LootTable::new()
            .with_entry(LootEntry::new("STONE"))
            .with_entry(LootEntry::new("GOLD_NUGGET").with_chance(12.5))
            .with_entry(LootEntry::new("IRON_SWORD").with_durability(0, 100))
            .with_entry(LootEntry::new("BOW").with_chance(5.0).with_durability(0, 50));

        let (guaranteed, probabilistic) = table.partition(true);
        assert_eq!(guaranteed.len(), 2);
        assert_eq!(probabilistic.len(), 2);

        let (guaranteed, probabilistic) = table.partition(false);
        assert_eq!(guaranteed.iter().map(|e| e.item.as_str()).collect::<Vec<_>>(), vec!["STONE"]);
        assert_eq!(probabilistic[0].item, "GOLD_NUGGET");
        assert_eq!(probabilistic.len(), 1);
    }

    #[test]
    fn test_registry_from_config() {
        let config = SpawnerConfig::from_toml_str(
            r#"
            [mobs.SKELETON]
            experience = 5

            [[mobs.SKELETON.drops]]
            item = "BONE"
            min = 2
            max = 0

            [[mobs.SKELETON.drops]]
            item = "BOW"
            chance = 8.5
            durability = { min = 1, max = 384 }
            "#,
        );
        // min > max is rejected by validation
        assert!(config.is_err());

        let config = SpawnerConfig::from_toml_str(
            r#"
            [mobs.SKELETON]
            experience = 5

            [[mobs.SKELETON.drops]]
            item = "BONE"
            min = 0
            max = 2

            [[mobs.SKELETON.drops]]
            item = "BOW"
            chance = 8.5
            durability = { min = 1, max = 384 }
            "#,
        )
        .unwrap();

        let registry = LootRegistry::from_config(&config);
        let table = registry.get("SKELETON").unwrap();

        assert_eq!(table.experience, 5);
        assert_eq!(table.entries[0], LootEntry::new("BONE").with_amount(0, 2));
        assert!(table.entries[1].is_equipment());
        assert!(!table.entries[1].is_guaranteed());
        assert_eq!(registry.entity_types(), vec!["SKELETON".to_string()]);
    }

    #[test]
    fn test_chance_exactly_hundred_is_guaranteed() {
        assert!(LootEntry::new("STONE").with_chance(100.0).is_guaranteed());
        assert!(LootEntry::new("STONE").with_chance(250.0).is_guaranteed());
        assert!(!LootEntry::new("STONE").with_chance(99.99).is_guaranteed());
    }
}

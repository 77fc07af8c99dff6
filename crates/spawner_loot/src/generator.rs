//! Batched loot generation
//!
//! A stacked spawner can stand in for thousands of mobs per cycle. Rolling
//! every probabilistic drop once per mob would cost `O(mobs × entries)`
//! chance rolls, so mobs are grouped into batches of `batch_size` and each
//! entry is rolled once per batch. The outcome applies to every mob in the
//! batch. Larger batches are cheaper and coarser; a batch size of 1 gives
//! fully independent rolls.

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use spawner_core::config::SpawnerConfig;
use spawner_inventory::ItemStack;
use std::sync::Arc;

use crate::table::{LootEntry, LootRegistry};

/// Default number of mobs sharing one chance roll
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Items and experience produced by one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LootResult {
    pub items: Vec<ItemStack>,
    pub experience: u32,
    /// Simulated mobs this result stands for
    pub mob_count: u32,
}

impl LootResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.experience == 0
    }

    /// Total units across all item stacks
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|i| i.count as u64).sum()
    }

    /// Total units of one kind
    pub fn count_of(&self, kind: &str) -> u64 {
        self.items
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.count as u64)
            .sum()
    }
}

/// Turns a mob-count range into loot using the registered tables
pub struct LootGenerator {
    registry: RwLock<Arc<LootRegistry>>,
    batch_size: u32,
}

impl LootGenerator {
    pub fn new(registry: LootRegistry, batch_size: u32) -> Self {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(config: &SpawnerConfig) -> Self {
        Self::new(LootRegistry::from_config(config), config.loot.batch_size)
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Current tables
    pub fn registry(&self) -> Arc<LootRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// Swap in new tables; in-flight generations keep the old ones
    pub fn reload(&self, registry: LootRegistry) {
        log::info!("Reloaded loot tables ({} entity types)", registry.len());
        *self.registry.write() = Arc::new(registry);
    }

    /// Generate loot using the thread-local RNG
    pub fn generate(
        &self,
        entity_type: &str,
        min_count: u32,
        max_count: u32,
        equipment_allowed: bool,
    ) -> LootResult {
        self.generate_with(&mut rand::rng(), entity_type, min_count, max_count, equipment_allowed)
    }

    /// Generate loot with a caller-supplied RNG
    pub fn generate_with<R: Rng>(
        &self,
        rng: &mut R,
        entity_type: &str,
        min_count: u32,
        max_count: u32,
        equipment_allowed: bool,
    ) -> LootResult {
        let Some(table) = self.registry().get(entity_type) else {
            log::debug!("No loot table for entity type {}", entity_type);
            return LootResult::default();
        };

        let (low, high) = if min_count <= max_count {
            (min_count, max_count)
        } else {
            (max_count, min_count)
        };
        let mob_count = if low == high { low } else { rng.random_range(low..=high) };

        let mut result = LootResult {
            items: Vec::new(),
            experience: table.experience.saturating_mul(mob_count),
            mob_count,
        };
        if mob_count == 0 {
            return result;
        }

        let (guaranteed, probabilistic) = table.partition(equipment_allowed);

        for entry in guaranteed {
            Self::emit(rng, entry, mob_count, &mut result.items);
        }

        for entry in probabilistic {
            let dropping = self.roll_batches(rng, entry.chance, mob_count);
            if dropping > 0 {
                Self::emit(rng, entry, dropping, &mut result.items);
            }
        }

        result
    }

    /// Number of mobs whose batch passed the chance roll
    fn roll_batches<R: Rng>(&self, rng: &mut R, chance: f64, mob_count: u32) -> u32 {
        if !(chance > 0.0) {
            return 0;
        }

        let mut dropping = 0u32;
        let mut remaining = mob_count;
        while remaining > 0 {
            let batch = remaining.min(self.batch_size);
            if rng.random::<f64>() * 100.0 < chance {
                dropping += batch;
            }
            remaining -= batch;
        }
        dropping
    }

    /// Append the drops of `mobs` mobs for one entry
    fn emit<R: Rng>(rng: &mut R, entry: &LootEntry, mobs: u32, items: &mut Vec<ItemStack>) {
        let total = Self::draw_amount(rng, entry, mobs);
        if total == 0 {
            return;
        }

        match entry.durability {
            // Equipment never stacks; each unit carries its own damage
            Some((min_damage, max_damage)) => {
                for _ in 0..total {
                    let damage = if min_damage == max_damage {
                        min_damage
                    } else {
                        rng.random_range(min_damage..=max_damage)
                    };
                    items.push(ItemStack::single(entry.item.clone()).with_damage(damage));
                }
            }
            None => items.push(ItemStack::new(entry.item.clone(), total)),
        }
    }

    /// Sum of per-mob amounts
    fn draw_amount<R: Rng>(rng: &mut R, entry: &LootEntry, mobs: u32) -> u32 {
        if entry.min_amount == entry.max_amount {
            return entry.min_amount.saturating_mul(mobs);
        }
        (0..mobs).fold(0u32, |acc, _| {
            acc.saturating_add(rng.random_range(entry.min_amount..=entry.max_amount))
        })
    }
}

impl Default for LootGenerator {
    fn default() -> Self {
        Self::new(LootRegistry::new(), DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::LootTable;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generator(table: LootTable, batch_size: u32) -> LootGenerator {
        LootGenerator::new(LootRegistry::new().with_table("ZOMBIE", table), batch_size)
    }

    #[test]
    fn test_thousand_guaranteed_units() {
        let gen = generator(LootTable::new().with_entry(LootEntry::new("STONE")), 10);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let result = gen.generate_with(&mut rng, "ZOMBIE", 1000, 1000, true);

        assert_eq!(result.mob_count, 1000);
        assert_eq!(result.count_of("STONE"), 1000);
    }

    #[test]
    fn test_zero_chance_never_drops() {
        let gen = generator(
            LootTable::new().with_entry(LootEntry::new("DIAMOND").with_chance(0.0)),
            10,
        );
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..200 {
            let result = gen.generate_with(&mut rng, "ZOMBIE", 1, 500, true);
            assert_eq!(result.count_of("DIAMOND"), 0);
        }
    }

    #[test]
    fn test_experience_scales_with_mobs() {
        let gen = generator(LootTable::new().with_experience(5), 10);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..20 {
            let result = gen.generate_with(&mut rng, "ZOMBIE", 2, 9, true);
            assert!((2..=9).contains(&result.mob_count));
            assert_eq!(result.experience, 5 * result.mob_count);
            assert!(result.items.is_empty());
        }
    }

    #[test]
    fn test_unknown_or_empty_table() {
        let gen = generator(LootTable::new(), 10);

        let empty = gen.generate("ZOMBIE", 4, 4, true);
        assert!(empty.is_empty());
        assert_eq!(empty.mob_count, 4);

        let unknown = gen.generate("CREEPER", 4, 4, true);
        assert!(unknown.is_empty());
        assert_eq!(unknown, LootResult::default());
    }

    #[test]
    fn test_reversed_range_is_accepted() {
        let gen = generator(LootTable::new().with_entry(LootEntry::new("STONE")), 10);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..20 {
            let result = gen.generate_with(&mut rng, "ZOMBIE", 8, 3, true);
            assert!((3..=8).contains(&result.mob_count));
            assert_eq!(result.count_of("STONE"), result.mob_count as u64);
        }
    }

    #[test]
    fn test_equipment_skipped_when_not_allowed() {
        let table = LootTable::new()
            .with_entry(LootEntry::new("IRON_SWORD").with_durability(5, 40))
            .with_entry(LootEntry::new("BOW").with_chance(50.0).with_durability(1, 9))
            .with_entry(LootEntry::new("BONE"));
        let gen = generator(table, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let result = gen.generate_with(&mut rng, "ZOMBIE", 30, 30, false);

        assert_eq!(result.count_of("IRON_SWORD"), 0);
        assert_eq!(result.count_of("BOW"), 0);
        assert_eq!(result.count_of("BONE"), 30);
    }

    #[test]
    fn test_equipment_units_carry_damage() {
        let table = LootTable::new().with_entry(LootEntry::new("IRON_SWORD").with_durability(5, 40));
        let gen = generator(table, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let result = gen.generate_with(&mut rng, "ZOMBIE", 12, 12, true);

        assert_eq!(result.items.len(), 12);
        for item in &result.items {
            assert_eq!(item.count, 1);
            let damage = item.damage().unwrap();
            assert!((5..=40).contains(&damage));
        }
    }

    #[test]
    fn test_single_batch_is_all_or_nothing() {
        let table = LootTable::new().with_entry(LootEntry::new("GOLD_NUGGET").with_chance(50.0));
        let gen = generator(table, 100);
        let mut rng = ChaCha8Rng::seed_from_u64(21);

        let mut saw_drop = false;
        let mut saw_none = false;
        for _ in 0..100 {
            let count = gen.generate_with(&mut rng, "ZOMBIE", 100, 100, true).count_of("GOLD_NUGGET");
            assert!(count == 0 || count == 100, "batch outcome split: {}", count);
            saw_drop |= count == 100;
            saw_none |= count == 0;
        }
        assert!(saw_drop && saw_none);
    }

    #[test]
    fn test_batches_are_multiples_of_batch_size() {
        let table = LootTable::new().with_entry(LootEntry::new("GOLD_NUGGET").with_chance(30.0));
        let gen = generator(table, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        for _ in 0..50 {
            // 95 mobs = nine full batches and one batch of five
            let count = gen.generate_with(&mut rng, "ZOMBIE", 95, 95, true).count_of("GOLD_NUGGET");
            assert!(count % 10 == 0 || count % 10 == 5);
        }
    }

    #[test]
    fn test_amount_range_respected() {
        let table = LootTable::new().with_entry(LootEntry::new("ROTTEN_FLESH").with_amount(0, 2));
        let gen = generator(table, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(13);

        for _ in 0..50 {
            let count = gen.generate_with(&mut rng, "ZOMBIE", 10, 10, true).count_of("ROTTEN_FLESH");
            assert!(count <= 20);
        }
    }

    #[test]
    fn test_reload_replaces_tables() {
        let gen = generator(LootTable::new().with_experience(1), 10);
        gen.reload(LootRegistry::new().with_table("ZOMBIE", LootTable::new().with_experience(7)));

        assert_eq!(gen.generate("ZOMBIE", 2, 2, true).experience, 14);
    }
}

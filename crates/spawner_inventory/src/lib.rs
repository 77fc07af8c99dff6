//! Spawner Inventory - Virtual Item Storage
//!
//! Slot-indexed, sparse item storage owned by each spawner. The logical slot
//! count is fixed by configuration and is independent of how many slots a
//! panel shows at once.
//!
//! # Features
//!
//! - Item stacks with instance attributes (equipment damage)
//! - Merge-first insertion, lowest empty slot next
//! - Removal that undoes the most recent placements first
//! - Paging, compaction and resizing
//!
//! # Example
//!
//! ```ignore
//! use spawner_inventory::prelude::*;
//!
//! let mut storage = VirtualInventory::new(45);
//! storage.register_item("IRON_SWORD", 1);
//!
//! let rest = storage.add_item(ItemStack::new("STONE", 100));
//! assert!(rest.is_none());
//! ```

pub mod inventory;
pub mod item;

pub mod prelude {
    pub use crate::inventory::{InventoryError, InventoryResult, VirtualInventory, DEFAULT_MAX_STACK};
    pub use crate::item::{ItemAttribute, ItemStack, DAMAGE_ATTRIBUTE};
}

pub use prelude::*;

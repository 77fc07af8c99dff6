//! Virtual inventory
//!
//! Sparse slot-indexed storage with a fixed logical size. Slots are not tied
//! to any visual grid; display layers page through them with [`VirtualInventory::page`].

use crate::item::ItemStack;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Max stack used for kinds without a registered value
pub const DEFAULT_MAX_STACK: u32 = 64;

/// Structural inventory errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Slot {index} out of range (size {size})")]
    OutOfRange { index: usize, size: usize },

    #[error("Stack of {count} {kind} exceeds max stack {max}")]
    StackOverflow { kind: String, count: u32, max: u32 },
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Placements remembered per slot for undo-style removal
const JOURNAL_LIMIT: usize = 8;

/// Occupied slot. `touched` orders slots by last placement; `journal` holds
/// `(placement, amount)` for the most recent placements, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotEntry {
    stack: ItemStack,
    #[serde(default)]
    touched: u64,
    #[serde(default)]
    journal: Vec<(u64, u32)>,
}

impl SlotEntry {
    fn placed(stack: ItemStack, seq: u64) -> Self {
        let journal = vec![(seq, stack.count)];
        Self {
            stack,
            touched: seq,
            journal,
        }
    }

    fn record(&mut self, seq: u64, amount: u32) {
        self.touched = seq;
        if self.journal.len() == JOURNAL_LIMIT {
            self.journal.remove(0);
        }
        self.journal.push((seq, amount));
    }

    /// Amount added by the newest remembered placement
    fn newest_placement(&self) -> u32 {
        self.journal.last().map_or(0, |&(_, amount)| amount)
    }

    /// Take up to `amount`, unwinding the newest placements first
    fn take(&mut self, amount: u32) -> u32 {
        let taken = self.stack.remove(amount);
        let mut left = taken;
        while left > 0 {
            let Some(last) = self.journal.last_mut() else {
                break;
            };
            if last.1 > left {
                last.1 -= left;
                left = 0;
            } else {
                left -= last.1;
                self.journal.pop();
            }
        }
        taken
    }
}

fn default_max_stack() -> u32 {
    DEFAULT_MAX_STACK
}

/// Slot-indexed item store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualInventory {
    /// Logical slot count
    size: usize,
    /// Occupied slots, ascending index
    slots: BTreeMap<usize, SlotEntry>,
    /// Placement counter
    #[serde(default)]
    touch_seq: u64,
    /// Max stack per kind
    #[serde(skip)]
    max_stacks: HashMap<String, u32>,
    #[serde(skip, default = "default_max_stack")]
    default_max_stack: u32,
}

impl VirtualInventory {
    /// Create an empty inventory with `size` slots
    pub fn new(size: usize) -> Self {
        Self {
            size,
            slots: BTreeMap::new(),
            touch_seq: 0,
            max_stacks: HashMap::new(),
            default_max_stack: DEFAULT_MAX_STACK,
        }
    }

    /// Set the max stack for unregistered kinds
    pub fn with_default_max_stack(mut self, max: u32) -> Self {
        self.default_max_stack = max.max(1);
        self
    }

    /// Register max stacks for many kinds
    pub fn with_max_stacks(mut self, max_stacks: &HashMap<String, u32>) -> Self {
        for (kind, max) in max_stacks {
            self.register_item(kind.clone(), *max);
        }
        self
    }

    /// Register the max stack of an item kind
    pub fn register_item(&mut self, kind: impl Into<String>, max_stack: u32) {
        self.max_stacks.insert(kind.into(), max_stack.max(1));
    }

    /// Max stack for an item kind
    pub fn max_stack(&self, kind: &str) -> u32 {
        self.max_stacks
            .get(kind)
            .copied()
            .unwrap_or(self.default_max_stack)
    }

    /// Logical slot count
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of occupied slots
    pub fn used_slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of empty slots
    pub fn free_slots(&self) -> usize {
        self.size.saturating_sub(self.slots.len())
    }

    /// Every slot is occupied
    pub fn is_full(&self) -> bool {
        self.free_slots() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check_index(&self, index: usize) -> InventoryResult<()> {
        if index >= self.size {
            return Err(InventoryError::OutOfRange {
                index,
                size: self.size,
            });
        }
        Ok(())
    }

    fn next_touch(&mut self) -> u64 {
        self.touch_seq += 1;
        self.touch_seq
    }

    /// Get slot contents
    pub fn get_slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(&index).map(|e| &e.stack)
    }

    /// Replace slot contents, returning the previous stack.
    /// `None` or a zero count clears the slot.
    pub fn set_slot(
        &mut self,
        index: usize,
        item: Option<ItemStack>,
    ) -> InventoryResult<Option<ItemStack>> {
        self.check_index(index)?;

        let item = match item {
            Some(item) if item.count > 0 => item,
            _ => return Ok(self.slots.remove(&index).map(|e| e.stack)),
        };

        let max = self.max_stack(&item.kind);
        if item.count > max {
            return Err(InventoryError::StackOverflow {
                kind: item.kind,
                count: item.count,
                max,
            });
        }

        let seq = self.next_touch();
        Ok(self
            .slots
            .insert(index, SlotEntry::placed(item, seq))
            .map(|e| e.stack))
    }

    /// Lowest empty slot index
    fn first_empty_slot(&self) -> Option<usize> {
        let mut expected = 0;
        for &index in self.slots.keys() {
            if index != expected {
                break;
            }
            expected += 1;
        }
        (expected < self.size).then_some(expected)
    }

    /// Add an item. Merges into compatible non-full slots first (ascending
    /// index), then fills the lowest empty slots. Returns what did not fit.
    pub fn add_item(&mut self, mut stack: ItemStack) -> Option<ItemStack> {
        if stack.count == 0 {
            return None;
        }
        let max = self.max_stack(&stack.kind);

        let touch_seq = &mut self.touch_seq;
        for entry in self.slots.values_mut() {
            if entry.stack.count < max && entry.stack.can_merge(&stack) {
                let before = stack.count;
                stack.count = entry.stack.add(stack.count, max);
                *touch_seq += 1;
                entry.record(*touch_seq, before - stack.count);
                if stack.count == 0 {
                    return None;
                }
            }
        }

        while stack.count > 0 {
            let Some(index) = self.first_empty_slot() else {
                break;
            };
            let amount = stack.count.min(max);
            stack.count -= amount;
            let seq = self.next_touch();
            self.slots
                .insert(index, SlotEntry::placed(stack.with_count(amount), seq));
        }

        (stack.count > 0).then_some(stack)
    }

    /// Add many items, returning every remainder
    pub fn add_items(&mut self, items: impl IntoIterator<Item = ItemStack>) -> Vec<ItemStack> {
        items
            .into_iter()
            .filter_map(|item| self.add_item(item))
            .collect()
    }

    /// Take up to `amount` from an occupied slot, clearing it when emptied
    fn take_from(&mut self, index: usize, amount: u32) -> u32 {
        let Some(entry) = self.slots.get_mut(&index) else {
            return 0;
        };
        let taken = entry.take(amount);
        if entry.stack.is_empty() {
            self.slots.remove(&index);
        }
        taken
    }

    /// Remove the requested amounts. Unwinds the most recent placements of
    /// a compatible stack first, taking from each slot only what that
    /// placement put there, so removing what was just added restores the
    /// previous layout. Any rest comes from the most recently filled slots
    /// (highest index on ties). Returns the amounts that could not be found.
    pub fn remove_items(&mut self, items: &[ItemStack]) -> Vec<ItemStack> {
        let mut missing = Vec::new();

        for request in items {
            let mut remaining = request.count;
            if remaining == 0 {
                continue;
            }

            let mut placements: Vec<(u64, usize)> = self
                .slots
                .iter()
                .filter(|(_, e)| e.stack.can_merge(request))
                .flat_map(|(&index, e)| e.journal.iter().map(move |&(seq, _)| (seq, index)))
                .collect();
            placements.sort_unstable_by(|a, b| b.cmp(a));

            // Journal seqs grow per slot, so the newest remaining entry is always the last
            for (_, index) in placements {
                if remaining == 0 {
                    break;
                }
                let newest = self
                    .slots
                    .get(&index)
                    .map_or(0, SlotEntry::newest_placement);
                remaining -= self.take_from(index, remaining.min(newest));
            }

            if remaining > 0 {
                let mut candidates: Vec<(u64, usize)> = self
                    .slots
                    .iter()
                    .filter(|(_, e)| e.stack.can_merge(request))
                    .map(|(&index, e)| (e.touched, index))
                    .collect();
                candidates.sort_unstable_by(|a, b| b.cmp(a));

                for (_, index) in candidates {
                    if remaining == 0 {
                        break;
                    }
                    remaining -= self.take_from(index, remaining);
                }
            }

            if remaining > 0 {
                missing.push(request.with_count(remaining));
            }
        }

        missing
    }

    /// Take up to `amount` from one slot
    pub fn remove_from_slot(
        &mut self,
        index: usize,
        amount: u32,
    ) -> InventoryResult<Option<ItemStack>> {
        self.check_index(index)?;

        let Some(entry) = self.slots.get(&index) else {
            return Ok(None);
        };
        if amount == 0 {
            return Ok(None);
        }
        if amount >= entry.stack.count {
            return Ok(self.slots.remove(&index).map(|e| e.stack));
        }
        let part = entry.stack.with_count(amount);
        self.take_from(index, amount);
        Ok(Some(part))
    }

    /// Total count of a kind across all slots
    pub fn count_of(&self, kind: &str) -> u64 {
        self.slots
            .values()
            .filter(|e| e.stack.kind == kind)
            .map(|e| e.stack.count as u64)
            .sum()
    }

    /// Total count of all items
    pub fn total_items(&self) -> u64 {
        self.slots.values().map(|e| e.stack.count as u64).sum()
    }

    /// Occupied slots in index order
    pub fn items(&self) -> impl Iterator<Item = (usize, &ItemStack)> {
        self.slots.iter().map(|(&i, e)| (i, &e.stack))
    }

    /// Owned copy of the occupied slots in index order
    pub fn layout(&self) -> Vec<(usize, ItemStack)> {
        self.items().map(|(i, s)| (i, s.clone())).collect()
    }

    /// Rebuild from a stored layout. Entries outside `size` or above their
    /// kind's max stack are rejected.
    pub fn restore_layout(
        &mut self,
        size: usize,
        layout: impl IntoIterator<Item = (usize, ItemStack)>,
    ) -> InventoryResult<()> {
        self.size = size;
        self.slots.clear();
        self.touch_seq = 0;
        for (index, stack) in layout {
            self.set_slot(index, Some(stack))?;
        }
        Ok(())
    }

    /// Slots shown on one display page
    pub fn page(&self, page: usize, page_size: usize) -> Vec<(usize, &ItemStack)> {
        if page_size == 0 {
            return Vec::new();
        }
        let start = page.saturating_mul(page_size);
        let end = start.saturating_add(page_size).min(self.size);
        if start >= end {
            return Vec::new();
        }
        self.slots
            .range(start..end)
            .map(|(&i, e)| (i, &e.stack))
            .collect()
    }

    /// Number of display pages (at least one)
    pub fn page_count(&self, page_size: usize) -> usize {
        if page_size == 0 {
            return 1;
        }
        ((self.size + page_size - 1) / page_size).max(1)
    }

    /// Merge partial stacks and order slots by kind
    pub fn sort_by_kind(&mut self) {
        let mut items: Vec<ItemStack> = std::mem::take(&mut self.slots)
            .into_values()
            .map(|e| e.stack)
            .collect();
        items.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.attributes.cmp(&b.attributes)));
        self.touch_seq = 0;

        for item in items {
            if let Some(rest) = self.add_item(item) {
                // Compaction never needs more slots than it had
                log::warn!("Dropped {} {} while sorting inventory", rest.count, rest.kind);
            }
        }
    }

    /// Change the logical size. Items in removed slots are re-homed; whatever
    /// no longer fits is returned.
    pub fn resize(&mut self, new_size: usize) -> Vec<ItemStack> {
        let displaced: Vec<ItemStack> = self
            .slots
            .split_off(&new_size)
            .into_values()
            .map(|e| e.stack)
            .collect();
        self.size = new_size;
        self.add_items(displaced)
    }

    /// Remove everything, returning the contents in slot order
    pub fn clear(&mut self) -> Vec<ItemStack> {
        self.touch_seq = 0;
        std::mem::take(&mut self.slots)
            .into_values()
            .map(|e| e.stack)
            .collect()
    }
}

impl Default for VirtualInventory {
    fn default() -> Self {
        Self::new(45)
    }
}

//! Authoritative spawner state
//!
//! Hot fields (stack size, experience, flags, delay) are atomics so the view
//! layer can read timer state every tick without contention. The only lock
//! on the cycle path is the one guarding `last_spawn`, and it is acquired
//! with a bounded timeout.

use parking_lot::{Mutex, RwLock};
use spawner_core::clock::MILLIS_PER_TICK;
use spawner_core::config::SpawnerConfig;
use spawner_core::id::{Location, SpawnerId};
use spawner_inventory::{ItemStack, VirtualInventory};
use spawner_loot::LootResult;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SpawnerError, SpawnerResult};
use crate::snapshot::SpawnerSnapshot;

/// What changed on a spawner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangedField {
    /// Inventory contents
    Storage,
    Experience,
    StackSize,
    /// Active or stopped flag
    Activity,
    EntityType,
    Filter,
    SpawnDelay,
    /// Terminal removal
    Removed,
}

/// Receives change notifications from spawner mutators
pub trait SpawnerObserver: Send + Sync {
    fn on_spawner_changed(&self, id: &SpawnerId, fields: &[ChangedField]);
}

/// Lifecycle of a spawner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created but not activated (or deactivated)
    Uninitialized,
    Active,
    /// Suppressed by the range checker
    Stopped,
    Removed,
}

/// Remaining time until the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTimer {
    /// Milliseconds left, floored at zero
    Remaining(u64),
    Inactive,
    /// Storage and experience both at capacity
    Full,
}

/// Result of a stack resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackResize {
    pub requested: u32,
    pub applied: u32,
    /// Distance between requested and applied
    pub truncated: u32,
}

impl StackResize {
    pub fn was_truncated(&self) -> bool {
        self.truncated > 0
    }
}

/// Result of merging loot into a spawner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepositOutcome {
    pub stored_items: u64,
    /// Did not fit in storage
    pub overflow_items: u64,
    /// Excluded by the spawner's filter
    pub filtered_items: u64,
    pub experience_accepted: u32,
    pub experience_discarded: u32,
}

impl DepositOutcome {
    pub fn changed_anything(&self) -> bool {
        self.stored_items > 0 || self.experience_accepted > 0
    }
}

/// Config-derived limits shared by every spawner
#[derive(Debug, Clone)]
pub struct SpawnerLimits {
    pub max_stack_size: u32,
    pub base_min_mobs: u32,
    pub base_max_mobs: u32,
    pub base_max_experience: u32,
    pub loot_slots: usize,
    pub lock_timeout: Duration,
}

impl SpawnerLimits {
    pub fn from_config(config: &SpawnerConfig) -> Self {
        Self {
            max_stack_size: config.spawner.max_stack_size.max(1),
            base_min_mobs: config.spawner.min_mobs,
            base_max_mobs: config.spawner.max_mobs,
            base_max_experience: config.spawner.max_stored_experience,
            loot_slots: config.spawner.loot_slots,
            lock_timeout: config.scheduler.lock_timeout(),
        }
    }
}

impl Default for SpawnerLimits {
    fn default() -> Self {
        Self::from_config(&SpawnerConfig::default())
    }
}

/// One logical spawner
pub struct SpawnerState {
    id: SpawnerId,
    location: Location,
    limits: SpawnerLimits,

    entity_type: RwLock<String>,
    stack_size: AtomicU32,
    min_mobs: AtomicU32,
    max_mobs: AtomicU32,

    active: AtomicBool,
    stopped: AtomicBool,
    stopped_since: AtomicU64,
    removed: AtomicBool,

    stored_experience: AtomicU32,
    max_stored_experience: AtomicU32,

    spawn_delay_ticks: AtomicU64,
    spawn_delay_ms: AtomicU64,
    /// Cycle lock; guards the read-modify-write of the last spawn time
    last_spawn: Mutex<u64>,
    /// Lock-free copy of `last_spawn` for timer reads
    last_spawn_seen: AtomicU64,

    inventory: Mutex<VirtualInventory>,
    storage_full: AtomicBool,
    filtered: RwLock<BTreeSet<String>>,

    epoch: AtomicU64,
    observer: RwLock<Option<Arc<dyn SpawnerObserver>>>,
}

impl std::fmt::Debug for SpawnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnerState")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("entity_type", &*self.entity_type.read())
            .field("stack_size", &self.stack_size())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl SpawnerState {
    /// Create an inactive spawner from configuration
    pub fn new(
        id: SpawnerId,
        location: Location,
        entity_type: impl Into<String>,
        config: &SpawnerConfig,
    ) -> Self {
        let inventory = VirtualInventory::new(config.spawner.loot_slots)
            .with_default_max_stack(config.spawner.default_item_max_stack)
            .with_max_stacks(&config.items);
        let state = Self::with_parts(
            id,
            location,
            entity_type.into(),
            SpawnerLimits::from_config(config),
            inventory,
        );
        state.set_spawn_delay_ticks_silent(config.spawner.spawn_delay_ticks);
        state
    }

    fn with_parts(
        id: SpawnerId,
        location: Location,
        entity_type: String,
        limits: SpawnerLimits,
        inventory: VirtualInventory,
    ) -> Self {
        let state = Self {
            id,
            location,
            entity_type: RwLock::new(entity_type),
            stack_size: AtomicU32::new(1),
            min_mobs: AtomicU32::new(limits.base_min_mobs),
            max_mobs: AtomicU32::new(limits.base_max_mobs),
            active: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stopped_since: AtomicU64::new(0),
            removed: AtomicBool::new(false),
            stored_experience: AtomicU32::new(0),
            max_stored_experience: AtomicU32::new(limits.base_max_experience),
            spawn_delay_ticks: AtomicU64::new(0),
            spawn_delay_ms: AtomicU64::new(0),
            last_spawn: Mutex::new(0),
            last_spawn_seen: AtomicU64::new(0),
            storage_full: AtomicBool::new(inventory.is_full()),
            inventory: Mutex::new(inventory),
            filtered: RwLock::new(BTreeSet::new()),
            epoch: AtomicU64::new(0),
            observer: RwLock::new(None),
            limits,
        };
        state.apply_stack_scaling(1);
        state
    }

    /// Rebuild a spawner from a persisted snapshot
    pub fn restore(snapshot: SpawnerSnapshot, config: &SpawnerConfig) -> SpawnerResult<Self> {
        let mut inventory = VirtualInventory::new(snapshot.inventory_size)
            .with_default_max_stack(config.spawner.default_item_max_stack)
            .with_max_stacks(&config.items);
        inventory.restore_layout(snapshot.inventory_size, snapshot.inventory)?;

        let overflow = if inventory.size() != config.spawner.loot_slots {
            inventory.resize(config.spawner.loot_slots)
        } else {
            Vec::new()
        };
        if !overflow.is_empty() {
            log::warn!(
                "Spawner {} lost {} stacks restoring into {} slots",
                snapshot.id,
                overflow.len(),
                config.spawner.loot_slots
            );
        }

        let state = Self::with_parts(
            snapshot.id,
            snapshot.location,
            snapshot.entity_type,
            SpawnerLimits::from_config(config),
            inventory,
        );
        state.set_spawn_delay_ticks_silent(snapshot.spawn_delay_ticks);
        let applied = snapshot.stack_size.clamp(1, state.limits.max_stack_size);
        state.stack_size.store(applied, Ordering::Release);
        state.apply_stack_scaling(applied);
        state.stored_experience.store(
            snapshot
                .stored_experience
                .min(state.max_stored_experience.load(Ordering::Acquire)),
            Ordering::Release,
        );
        *state.last_spawn.lock() = snapshot.last_spawn_timestamp;
        state
            .last_spawn_seen
            .store(snapshot.last_spawn_timestamp, Ordering::Release);
        state.active.store(snapshot.active, Ordering::Release);
        state.stopped.store(snapshot.stopped, Ordering::Release);
        state
            .stopped_since
            .store(snapshot.stopped_since, Ordering::Release);
        *state.filtered.write() = snapshot.filtered_items.into_iter().collect();
        Ok(state)
    }

    /// Read-only copy of every persisted field
    pub fn snapshot(&self) -> SpawnerSnapshot {
        let (inventory_size, inventory) = {
            let inv = self.inventory.lock();
            (inv.size(), inv.layout())
        };
        SpawnerSnapshot {
            id: self.id.clone(),
            location: self.location.clone(),
            entity_type: self.entity_type(),
            stack_size: self.stack_size(),
            active: self.is_active(),
            stopped: self.is_stopped(),
            stopped_since: self.stopped_since.load(Ordering::Acquire),
            stored_experience: self.stored_experience(),
            last_spawn_timestamp: self.last_spawn_timestamp(),
            spawn_delay_ticks: self.spawn_delay_ticks(),
            filtered_items: self.filtered_items(),
            inventory_size,
            inventory,
        }
    }

    // ---- identity and reads ----

    pub fn id(&self) -> &SpawnerId {
        &self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn limits(&self) -> &SpawnerLimits {
        &self.limits
    }

    pub fn entity_type(&self) -> String {
        self.entity_type.read().clone()
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size.load(Ordering::Acquire)
    }

    /// Inclusive mob range for one cycle, scaled by stack size
    pub fn mob_range(&self) -> (u32, u32) {
        (
            self.min_mobs.load(Ordering::Acquire),
            self.max_mobs.load(Ordering::Acquire),
        )
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub fn stored_experience(&self) -> u32 {
        self.stored_experience.load(Ordering::Acquire)
    }

    pub fn max_stored_experience(&self) -> u32 {
        self.max_stored_experience.load(Ordering::Acquire)
    }

    pub fn spawn_delay_ticks(&self) -> u64 {
        self.spawn_delay_ticks.load(Ordering::Acquire)
    }

    pub fn spawn_delay_ms(&self) -> u64 {
        self.spawn_delay_ms.load(Ordering::Acquire)
    }

    pub fn last_spawn_timestamp(&self) -> u64 {
        self.last_spawn_seen.load(Ordering::Acquire)
    }

    /// Revision counter, bumped on every notified change
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn is_storage_full(&self) -> bool {
        self.storage_full.load(Ordering::Acquire)
    }

    pub fn is_experience_full(&self) -> bool {
        self.stored_experience() >= self.max_stored_experience()
    }

    /// Storage and experience are both full
    pub fn at_capacity(&self) -> bool {
        self.is_storage_full() && self.is_experience_full()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.is_removed() {
            Lifecycle::Removed
        } else if !self.is_active() {
            Lifecycle::Uninitialized
        } else if self.is_stopped() {
            Lifecycle::Stopped
        } else {
            Lifecycle::Active
        }
    }

    // ---- observation ----

    /// Attach the change observer (replaces any previous one)
    pub fn set_observer(&self, observer: Arc<dyn SpawnerObserver>) {
        *self.observer.write() = Some(observer);
    }

    fn notify(&self, fields: &[ChangedField]) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_spawner_changed(&self.id, fields);
        }
    }

    // ---- cycle ----

    /// Claim the current spawn cycle. Returns true at most once per delay
    /// window, however many threads race for it. Lock contention beyond the
    /// configured timeout defers the claim to the next tick.
    pub fn try_advance_cycle(&self, now: u64) -> bool {
        match self.try_advance_cycle_within(now, self.limits.lock_timeout) {
            Ok(advanced) => advanced,
            Err(e) => {
                log::debug!("{}; deferring to next tick", e);
                false
            }
        }
    }

    /// Like [`Self::try_advance_cycle`] but reports lock timeouts
    pub fn try_advance_cycle_within(&self, now: u64, timeout: Duration) -> SpawnerResult<bool> {
        if self.is_removed() || !self.is_active() || self.is_stopped() {
            return Ok(false);
        }

        let mut last = self
            .last_spawn
            .try_lock_for(timeout)
            .ok_or_else(|| SpawnerError::LockTimeout { id: self.id.clone() })?;

        if now.saturating_sub(*last) >= self.spawn_delay_ms() {
            *last = now;
            self.last_spawn_seen.store(now, Ordering::Release);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Time left until the next cycle.
    ///
    /// A stopped spawner keeps counting down for two full delays before it
    /// reports `Inactive`, so brief range-checker flips do not flicker.
    pub fn time_until_next_cycle(&self, now: u64) -> CycleTimer {
        if self.is_removed() || !self.is_active() {
            return CycleTimer::Inactive;
        }

        let delay = self.spawn_delay_ms();
        if self.is_stopped() {
            let stopped_for = now.saturating_sub(self.stopped_since.load(Ordering::Acquire));
            if stopped_for > delay.saturating_mul(2) {
                return CycleTimer::Inactive;
            }
        }

        if self.at_capacity() {
            return CycleTimer::Full;
        }

        let elapsed = now.saturating_sub(self.last_spawn_timestamp());
        CycleTimer::Remaining(delay.saturating_sub(elapsed))
    }

    // ---- activity ----

    /// Enable or disable simulation. Enabling restarts the cycle timer.
    pub fn set_active(&self, active: bool, now: u64) {
        if self.is_removed() {
            return;
        }
        if self.active.swap(active, Ordering::AcqRel) == active {
            return;
        }
        if active {
            *self.last_spawn.lock() = now;
            self.last_spawn_seen.store(now, Ordering::Release);
        }
        self.notify(&[ChangedField::Activity]);
    }

    /// Range checker entry point
    pub fn set_stopped(&self, stopped: bool, now: u64) {
        if self.is_removed() {
            return;
        }
        if self.stopped.swap(stopped, Ordering::AcqRel) == stopped {
            return;
        }
        if stopped {
            self.stopped_since.store(now, Ordering::Release);
        }
        self.notify(&[ChangedField::Activity]);
    }

    // ---- stack ----

    fn apply_stack_scaling(&self, stack: u32) {
        let l = &self.limits;
        self.min_mobs
            .store(l.base_min_mobs.saturating_mul(stack), Ordering::Release);
        self.max_mobs
            .store(l.base_max_mobs.saturating_mul(stack), Ordering::Release);
        let max_exp = l.base_max_experience.saturating_mul(stack);
        self.max_stored_experience.store(max_exp, Ordering::Release);
        let _ = self
            .stored_experience
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur > max_exp).then_some(max_exp)
            });
    }

    /// Resize the stack, clamped to `[1, max_stack_size]`
    pub fn set_stack_size(&self, requested: u32) -> StackResize {
        if self.is_removed() {
            let current = self.stack_size();
            return StackResize {
                requested,
                applied: current,
                truncated: requested.abs_diff(current),
            };
        }
        let applied = requested.clamp(1, self.limits.max_stack_size);
        let resize = StackResize {
            requested,
            applied,
            truncated: requested.abs_diff(applied),
        };

        let previous = self.stack_size.swap(applied, Ordering::AcqRel);
        self.apply_stack_scaling(applied);
        if previous != applied {
            self.notify(&[ChangedField::StackSize, ChangedField::Experience]);
        }
        resize
    }

    /// Add up to `amount` stack units without passing the max stack size.
    /// Returns the units added.
    pub(crate) fn add_stack_units(&self, amount: u32) -> u32 {
        if self.is_removed() {
            return 0;
        }
        let max = self.limits.max_stack_size;
        let headroom = |cur: u32| amount.min(max.saturating_sub(cur));
        let Ok(previous) = self
            .stack_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                let add = headroom(cur);
                (add > 0).then(|| cur + add)
            })
        else {
            return 0;
        };
        self.apply_stack_scaling(self.stack_size().max(1));
        self.notify(&[ChangedField::StackSize, ChangedField::Experience]);
        headroom(previous)
    }

    /// Take up to `amount` stack units for a transfer. A stack drained to
    /// zero is left for the caller to remove. Returns the units taken.
    pub(crate) fn take_stack_units(&self, amount: u32) -> u32 {
        if self.is_removed() {
            return 0;
        }
        let Ok(previous) = self
            .stack_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                let take = amount.min(cur);
                (take > 0).then(|| cur - take)
            })
        else {
            return 0;
        };
        let taken = amount.min(previous);
        if previous > taken {
            self.apply_stack_scaling(self.stack_size().max(1));
            self.notify(&[ChangedField::StackSize, ChangedField::Experience]);
        }
        taken
    }

    // ---- experience ----

    /// Take all stored experience
    pub fn collect_experience(&self) -> u32 {
        if self.is_removed() {
            return 0;
        }
        let collected = self.stored_experience.swap(0, Ordering::AcqRel);
        if collected > 0 {
            self.notify(&[ChangedField::Experience]);
        }
        collected
    }

    fn add_experience_silent(&self, amount: u32) -> u32 {
        if amount == 0 {
            return 0;
        }
        let max = self.max_stored_experience();
        let capped = |cur: u32| cur.saturating_add(amount).min(max.max(cur));
        match self
            .stored_experience
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(capped(cur)))
        {
            Ok(previous) | Err(previous) => capped(previous) - previous,
        }
    }

    /// Add experience up to the cap; returns the amount accepted
    pub fn add_experience(&self, amount: u32) -> u32 {
        if self.is_removed() {
            return 0;
        }
        let accepted = self.add_experience_silent(amount);
        if accepted > 0 {
            self.notify(&[ChangedField::Experience]);
        }
        accepted
    }

    // ---- storage ----

    /// Read the inventory under its lock
    pub fn with_inventory<R>(&self, f: impl FnOnce(&VirtualInventory) -> R) -> R {
        f(&self.inventory.lock())
    }

    /// Run `f` on the inventory unless the spawner is removed. Removal
    /// clears storage under the same lock, so nothing lands after it.
    fn mutate_inventory<R>(&self, f: impl FnOnce(&mut VirtualInventory) -> R) -> Option<R> {
        let mut inv = self.inventory.lock();
        if self.is_removed() {
            return None;
        }
        let result = f(&mut inv);
        self.storage_full.store(inv.is_full(), Ordering::Release);
        Some(result)
    }

    /// Mutate the inventory under its lock and notify viewers
    pub fn with_inventory_mut<R>(
        &self,
        f: impl FnOnce(&mut VirtualInventory) -> R,
    ) -> SpawnerResult<R> {
        let result = self
            .mutate_inventory(f)
            .ok_or_else(|| SpawnerError::Removed(self.id.clone()))?;
        self.notify(&[ChangedField::Storage]);
        Ok(result)
    }

    /// Player deposit; returns what did not fit. A removed spawner takes nothing.
    pub fn store_items(&self, items: Vec<ItemStack>) -> Vec<ItemStack> {
        let Some(rest) = self.mutate_inventory(|inv| inv.add_items(items.iter().cloned())) else {
            return items;
        };
        self.notify(&[ChangedField::Storage]);
        rest
    }

    /// Player extraction; returns what could not be found
    pub fn take_items(&self, items: &[ItemStack]) -> Vec<ItemStack> {
        let Some(missing) = self.mutate_inventory(|inv| inv.remove_items(items)) else {
            return items.to_vec();
        };
        self.notify(&[ChangedField::Storage]);
        missing
    }

    /// Merge one cycle's loot into storage and experience
    pub fn deposit_loot(&self, loot: &LootResult) -> DepositOutcome {
        let mut outcome = DepositOutcome::default();
        if self.is_removed() {
            return outcome;
        }

        if !loot.items.is_empty() {
            let filtered = self.filtered.read().clone();
            let mut inv = self.inventory.lock();
            if self.is_removed() {
                return outcome;
            }
            for item in &loot.items {
                if filtered.contains(&item.kind) {
                    outcome.filtered_items += item.count as u64;
                    continue;
                }
                let rest = inv.add_item(item.clone()).map(|r| r.count).unwrap_or(0);
                outcome.stored_items += (item.count - rest) as u64;
                outcome.overflow_items += rest as u64;
            }
            self.storage_full.store(inv.is_full(), Ordering::Release);
        }

        outcome.experience_accepted = self.add_experience_silent(loot.experience);
        outcome.experience_discarded = loot.experience - outcome.experience_accepted;

        match (outcome.stored_items > 0, outcome.experience_accepted > 0) {
            (true, true) => self.notify(&[ChangedField::Storage, ChangedField::Experience]),
            (true, false) => self.notify(&[ChangedField::Storage]),
            (false, true) => self.notify(&[ChangedField::Experience]),
            (false, false) => {}
        }
        outcome
    }

    // ---- settings ----

    pub fn set_entity_type(&self, entity_type: impl Into<String>) {
        if self.is_removed() {
            return;
        }
        let entity_type = entity_type.into();
        {
            let mut current = self.entity_type.write();
            if *current == entity_type {
                return;
            }
            *current = entity_type;
        }
        self.notify(&[ChangedField::EntityType]);
    }

    fn set_spawn_delay_ticks_silent(&self, ticks: u64) {
        let ticks = ticks.max(1);
        self.spawn_delay_ticks.store(ticks, Ordering::Release);
        self.spawn_delay_ms
            .store(ticks.saturating_mul(MILLIS_PER_TICK), Ordering::Release);
    }

    /// Change the delay; the cached millisecond value follows
    pub fn set_spawn_delay_ticks(&self, ticks: u64) {
        if self.is_removed() {
            return;
        }
        self.set_spawn_delay_ticks_silent(ticks);
        self.notify(&[ChangedField::SpawnDelay]);
    }

    // ---- filter ----

    /// Flip whether a kind is kept out of storage; returns the new state
    pub fn toggle_filter(&self, kind: &str) -> bool {
        if self.is_removed() {
            return self.is_filtered(kind);
        }
        let now_filtered = {
            let mut filtered = self.filtered.write();
            if filtered.remove(kind) {
                false
            } else {
                filtered.insert(kind.to_string());
                true
            }
        };
        self.notify(&[ChangedField::Filter]);
        now_filtered
    }

    pub fn is_filtered(&self, kind: &str) -> bool {
        self.filtered.read().contains(kind)
    }

    /// Filtered kinds, sorted
    pub fn filtered_items(&self) -> Vec<String> {
        self.filtered.read().iter().cloned().collect()
    }

    // ---- removal ----

    /// Enter the terminal state. Returns the storage contents on the first
    /// call and nothing afterwards.
    pub(crate) fn mark_removed(&self) -> Vec<ItemStack> {
        if self.removed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        self.active.store(false, Ordering::Release);
        let contents = {
            let mut inv = self.inventory.lock();
            let contents = inv.clear();
            self.storage_full.store(false, Ordering::Release);
            contents
        };
        self.notify(&[ChangedField::Removed]);
        contents
    }
}

//! Spawner runtime
//!
//! Wires the registry, loot generator, view synchronizer and scheduler
//! together. The periodic cycle check claims each due spawner's cycle,
//! generates loot for its scaled mob range and deposits the result; the
//! view layer is notified by the spawner itself.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spawner_core::clock::{Clock, SystemClock};
use spawner_core::config::SpawnerConfig;
use spawner_core::id::{Location, SpawnerId, ViewerId};
use spawner_core::scheduler::{Scheduler, TaskHandle};
use spawner_inventory::ItemStack;
use spawner_loot::LootGenerator;
use spawner_state::{
    DepositOutcome, SpawnerError, SpawnerManager, SpawnerResult, SpawnerSnapshot, SpawnerState,
    StackResize, StackTransfer,
};
use spawner_view::{LogSink, ViewKind, ViewSynchronizer, ViewerSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::EngineResult;

/// Outcome of checking one spawner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Inactive, stopped, or the delay has not elapsed
    NotDue,
    /// Cycle claimed but storage and experience are both full
    AtCapacity,
    Deposited(DepositOutcome),
}

/// Totals of one cycle-check pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub checked: usize,
    pub cycles: usize,
    pub at_capacity: usize,
    pub items_stored: u64,
    pub experience_accepted: u64,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub passes: u64,
    pub cycles: u64,
    pub at_capacity: u64,
    pub items_stored: u64,
    pub items_overflowed: u64,
    pub items_filtered: u64,
    pub experience_accepted: u64,
}

#[derive(Default)]
struct EngineCounters {
    passes: AtomicU64,
    cycles: AtomicU64,
    at_capacity: AtomicU64,
    items_stored: AtomicU64,
    items_overflowed: AtomicU64,
    items_filtered: AtomicU64,
    experience_accepted: AtomicU64,
}

/// Builder for [`SpawnerEngine`]
pub struct EngineBuilder {
    config: SpawnerConfig,
    sink: Arc<dyn ViewerSink>,
    clock: Arc<dyn Clock>,
    threaded: bool,
}

impl EngineBuilder {
    pub fn new(config: SpawnerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(LogSink),
            clock: Arc::new(SystemClock),
            threaded: false,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ViewerSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the cycle check and view timer on a worker pool
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn build(self) -> Arc<SpawnerEngine> {
        let config = Arc::new(self.config);
        let scheduler = self
            .threaded
            .then(|| Arc::new(Scheduler::new(config.scheduler.worker_threads)));

        let manager = Arc::new(SpawnerManager::new(Arc::clone(&config)));
        let generator = Arc::new(LootGenerator::from_config(&config));
        let view = ViewSynchronizer::new(
            Arc::clone(&manager),
            self.sink,
            Arc::clone(&self.clock),
            &config.view,
            scheduler.clone(),
        );
        manager.add_observer(view.observer());

        Arc::new_cyclic(|self_ref| SpawnerEngine {
            config,
            clock: self.clock,
            manager,
            generator,
            view,
            scheduler,
            cycle_task: Mutex::new(None),
            counters: EngineCounters::default(),
            self_ref: self_ref.clone(),
        })
    }
}

/// The spawner runtime
pub struct SpawnerEngine {
    config: Arc<SpawnerConfig>,
    clock: Arc<dyn Clock>,
    manager: Arc<SpawnerManager>,
    generator: Arc<LootGenerator>,
    view: Arc<ViewSynchronizer>,
    scheduler: Option<Arc<Scheduler>>,
    cycle_task: Mutex<Option<TaskHandle>>,
    counters: EngineCounters,
    self_ref: Weak<SpawnerEngine>,
}

impl SpawnerEngine {
    pub fn builder(config: SpawnerConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<SpawnerManager> {
        &self.manager
    }

    pub fn generator(&self) -> &Arc<LootGenerator> {
        &self.generator
    }

    pub fn view(&self) -> &Arc<ViewSynchronizer> {
        &self.view
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // ---- lifecycle ----

    /// Start the periodic cycle check. No-op without a scheduler.
    pub fn start(&self) {
        let Some(scheduler) = &self.scheduler else {
            log::warn!("Engine built without a scheduler; drive it with run_cycle_check");
            return;
        };
        let mut task = self.cycle_task.lock();
        if task.is_some() {
            return;
        }

        let weak = self.self_ref.clone();
        let interval = self.config.scheduler.cycle_check_interval();
        *task = Some(scheduler.schedule_at_fixed_rate("cycle-check", interval, move || {
            if let Some(engine) = weak.upgrade() {
                engine.run_cycle_check(engine.now());
            }
        }));
        log::info!("Spawner engine started (cycle check every {:?})", interval);
    }

    /// Cancel the cycle check and shut the worker pool down
    pub fn stop(&self) {
        if let Some(task) = self.cycle_task.lock().take() {
            task.cancel();
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        log::info!("Spawner engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.cycle_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    // ---- cycle ----

    /// One pass over every spawner
    pub fn run_cycle_check(&self, now: u64) -> CycleReport {
        let mut report = CycleReport::default();
        for state in self.manager.all() {
            report.checked += 1;
            match self.check_spawner(&state, now) {
                CycleOutcome::NotDue => {}
                CycleOutcome::AtCapacity => {
                    report.cycles += 1;
                    report.at_capacity += 1;
                }
                CycleOutcome::Deposited(outcome) => {
                    report.cycles += 1;
                    report.items_stored += outcome.stored_items;
                    report.experience_accepted += outcome.experience_accepted as u64;
                }
            }
        }
        self.counters.passes.fetch_add(1, Ordering::Relaxed);
        report
    }

    /// Run the cycle of one spawner if it is due
    pub fn check_spawner(&self, state: &SpawnerState, now: u64) -> CycleOutcome {
        if !state.try_advance_cycle(now) {
            return CycleOutcome::NotDue;
        }
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);

        if state.at_capacity() {
            log::debug!("Spawner {} at capacity; cycle skipped", state.id());
            self.counters.at_capacity.fetch_add(1, Ordering::Relaxed);
            return CycleOutcome::AtCapacity;
        }

        let (min, max) = state.mob_range();
        let loot = self.generator.generate(
            &state.entity_type(),
            min,
            max,
            self.config.spawner.allow_equipment,
        );
        let outcome = state.deposit_loot(&loot);

        let c = &self.counters;
        c.items_stored.fetch_add(outcome.stored_items, Ordering::Relaxed);
        c.items_overflowed.fetch_add(outcome.overflow_items, Ordering::Relaxed);
        c.items_filtered.fetch_add(outcome.filtered_items, Ordering::Relaxed);
        c.experience_accepted
            .fetch_add(outcome.experience_accepted as u64, Ordering::Relaxed);

        if outcome.overflow_items > 0 {
            log::debug!(
                "Spawner {} storage overflowed by {} items",
                state.id(),
                outcome.overflow_items
            );
        }
        CycleOutcome::Deposited(outcome)
    }

    /// Check one spawner now and push its full display to open panels
    pub fn force_check(&self, id: &SpawnerId) -> SpawnerResult<CycleOutcome> {
        let state = self.live(id)?;
        let now = self.now();
        let outcome = self.check_spawner(&state, now);
        self.view.force_sync(id, now);
        Ok(outcome)
    }

    // ---- placement ----

    pub fn place(&self, location: Location, entity_type: &str) -> SpawnerResult<Arc<SpawnerState>> {
        if !self.generator.registry().contains(entity_type) {
            log::warn!("No loot table for {}; spawner will produce no loot", entity_type);
        }
        self.manager.place(location, entity_type, self.now())
    }

    /// Remove a spawner; returns its storage contents
    pub fn remove(&self, id: &SpawnerId) -> SpawnerResult<Vec<ItemStack>> {
        self.manager.remove(id)
    }

    pub fn stack_onto(
        &self,
        target: &SpawnerId,
        source: &SpawnerId,
        amount: u32,
    ) -> SpawnerResult<StackTransfer> {
        self.manager.stack_onto(target, source, amount)
    }

    // ---- player actions ----

    /// Open a panel and push its initial contents
    pub fn open_panel(&self, viewer: ViewerId, id: &SpawnerId, kind: ViewKind) -> EngineResult<()> {
        self.view.register(viewer, id.clone(), kind)?;
        self.force_check(id)?;
        Ok(())
    }

    pub fn close_panel(&self, viewer: &ViewerId) -> bool {
        self.view.unregister(viewer)
    }

    /// Viewer connection dropped
    pub fn disconnect(&self, viewer: &ViewerId) {
        if self.view.unregister(viewer) {
            log::debug!("Viewer {} disconnected with an open panel", viewer);
        }
    }

    pub fn set_stack_size(&self, id: &SpawnerId, size: u32) -> SpawnerResult<StackResize> {
        let resize = self.live(id)?.set_stack_size(size);
        if resize.was_truncated() {
            log::debug!(
                "Stack size of {} clamped from {} to {}",
                id,
                resize.requested,
                resize.applied
            );
        }
        Ok(resize)
    }

    pub fn collect_experience(&self, id: &SpawnerId) -> SpawnerResult<u32> {
        Ok(self.live(id)?.collect_experience())
    }

    /// Take items out of storage; returns what could not be found
    pub fn take_items(&self, id: &SpawnerId, items: &[ItemStack]) -> SpawnerResult<Vec<ItemStack>> {
        Ok(self.live(id)?.take_items(items))
    }

    pub fn toggle_filter(&self, id: &SpawnerId, kind: &str) -> SpawnerResult<bool> {
        Ok(self.live(id)?.toggle_filter(kind))
    }

    // ---- external hooks ----

    /// Range checker entry point
    pub fn set_stopped(&self, id: &SpawnerId, stopped: bool) -> SpawnerResult<()> {
        self.live(id)?.set_stopped(stopped, self.now());
        Ok(())
    }

    pub fn snapshot_all(&self) -> Vec<SpawnerSnapshot> {
        self.manager.snapshot_all()
    }

    /// Restore persisted spawners; returns how many were registered
    pub fn restore(&self, snapshots: Vec<SpawnerSnapshot>) -> EngineResult<usize> {
        let mut restored = 0;
        for snapshot in snapshots {
            self.manager.restore(snapshot)?;
            restored += 1;
        }
        log::info!("Restored {} spawners", restored);
        Ok(restored)
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            passes: c.passes.load(Ordering::Relaxed),
            cycles: c.cycles.load(Ordering::Relaxed),
            at_capacity: c.at_capacity.load(Ordering::Relaxed),
            items_stored: c.items_stored.load(Ordering::Relaxed),
            items_overflowed: c.items_overflowed.load(Ordering::Relaxed),
            items_filtered: c.items_filtered.load(Ordering::Relaxed),
            experience_accepted: c.experience_accepted.load(Ordering::Relaxed),
        }
    }

    fn live(&self, id: &SpawnerId) -> SpawnerResult<Arc<SpawnerState>> {
        let state = self.manager.require(id)?;
        if state.is_removed() {
            return Err(SpawnerError::Removed(id.clone()));
        }
        Ok(state)
    }
}

impl Drop for SpawnerEngine {
    fn drop(&mut self) {
        if let Some(task) = self.cycle_task.get_mut().take() {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawner_core::clock::ManualClock;

    const CONFIG: &str = r#"
        [spawner]
        max_stack_size = 100
        min_mobs = 1
        max_mobs = 1
        spawn_delay_ticks = 20
        max_stored_experience = 50
        loot_slots = 2

        [mobs.ZOMBIE]
        experience = 5

        [[mobs.ZOMBIE.drops]]
        item = "STONE"
        min = 1
        max = 1
        chance = 100.0
    "#;

    fn engine() -> (Arc<SpawnerEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = SpawnerConfig::from_toml_str(CONFIG).unwrap();
        let engine = SpawnerEngine::builder(config).with_clock(clock.clone()).build();
        (engine, clock)
    }

    #[test]
    fn test_single_stone_cycle() {
        let (engine, _clock) = engine();
        let spawner = engine.place(Location::new("world", 0, 64, 0), "ZOMBIE").unwrap();

        let report = engine.run_cycle_check(1_000);

        assert_eq!(report.cycles, 1);
        assert_eq!(report.items_stored, 1);
        assert_eq!(spawner.stored_experience(), 5);
        spawner.with_inventory(|inv| {
            assert_eq!(inv.used_slot_count(), 1);
            assert_eq!(inv.count_of("STONE"), 1);
        });
    }

    #[test]
    fn test_not_due_before_delay() {
        let (engine, _clock) = engine();
        engine.place(Location::new("world", 0, 64, 0), "ZOMBIE").unwrap();

        assert_eq!(engine.run_cycle_check(999).cycles, 0);
        assert_eq!(engine.run_cycle_check(1_000).cycles, 1);
        assert_eq!(engine.run_cycle_check(1_500).cycles, 0);
        assert_eq!(engine.stats().passes, 3);
    }

    #[test]
    fn test_at_capacity_skips_loot() {
        let (engine, _clock) = engine();
        let spawner = engine.place(Location::new("world", 0, 64, 0), "ZOMBIE").unwrap();
        spawner.store_items(vec![ItemStack::new("DIRT", 1), ItemStack::new("SAND", 1)]);
        spawner.add_experience(50);

        let id = spawner.id().clone();
        let outcome = engine.check_spawner(&engine.manager().require(&id).unwrap(), 1_000);
        assert_eq!(outcome, CycleOutcome::AtCapacity);
        assert_eq!(engine.stats().at_capacity, 1);
    }

    #[test]
    fn test_stopped_spawner_does_not_cycle() {
        let (engine, _clock) = engine();
        let spawner = engine.place(Location::new("world", 0, 64, 0), "ZOMBIE").unwrap();
        engine.set_stopped(spawner.id(), true).unwrap();

        assert_eq!(engine.run_cycle_check(5_000).cycles, 0);

        engine.set_stopped(spawner.id(), false).unwrap();
        assert_eq!(engine.run_cycle_check(5_000).cycles, 1);
    }

    #[test]
    fn test_stack_size_truncation() {
        let (engine, _clock) = engine();
        let spawner = engine.place(Location::new("world", 0, 64, 0), "ZOMBIE").unwrap();

        let resize = engine.set_stack_size(spawner.id(), 150).unwrap();
        assert_eq!(resize.applied, 100);
        assert_eq!(resize.truncated, 50);
    }

    #[test]
    fn test_removed_spawner_rejects_actions() {
        let (engine, _clock) = engine();
        let spawner = engine.place(Location::new("world", 0, 64, 0), "ZOMBIE").unwrap();
        let id = spawner.id().clone();
        engine.remove(&id).unwrap();

        assert!(matches!(engine.collect_experience(&id), Err(SpawnerError::NotFound(_))));
        assert!(matches!(engine.set_stopped(&id, true), Err(SpawnerError::NotFound(_))));
    }

    #[test]
    fn test_start_without_scheduler_is_noop() {
        let (engine, _clock) = engine();
        engine.start();
        assert!(!engine.is_running());
    }
}

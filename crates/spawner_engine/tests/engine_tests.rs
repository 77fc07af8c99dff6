//! Integration tests for spawner_engine

use parking_lot::Mutex;
use spawner_engine::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CONFIG: &str = r#"
    [spawner]
    max_stack_size = 64
    min_mobs = 1
    max_mobs = 1
    spawn_delay_ticks = 20
    max_stored_experience = 50
    loot_slots = 9
    allow_equipment = false

    [view]
    push_cooldown_ms = 250

    [mobs.ZOMBIE]
    experience = 5

    [[mobs.ZOMBIE.drops]]
    item = "STONE"
    min = 1
    max = 1
    chance = 100.0

    [[mobs.ZOMBIE.drops]]
    item = "IRON_SWORD"
    chance = 100.0
    durability = { min = 10, max = 200 }
"#;

// Records every push and close
#[derive(Default)]
struct RecordingSink {
    pushes: Mutex<Vec<(ViewerId, DisplayUpdate)>>,
    closes: Mutex<Vec<(ViewerId, SpawnerId)>>,
}

impl RecordingSink {
    fn updates_for(&self, viewer: &str) -> Vec<DisplayUpdate> {
        self.pushes
            .lock()
            .iter()
            .filter(|(v, _)| v.as_str() == viewer)
            .map(|(_, u)| u.clone())
            .collect()
    }
}

impl ViewerSink for RecordingSink {
    fn push(&self, viewer: &ViewerId, update: &DisplayUpdate) -> ViewResult<()> {
        self.pushes.lock().push((viewer.clone(), update.clone()));
        Ok(())
    }

    fn close(&self, viewer: &ViewerId, spawner: &SpawnerId) {
        self.closes.lock().push((viewer.clone(), spawner.clone()));
    }
}

struct Harness {
    engine: Arc<SpawnerEngine>,
    sink: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    harness_with(SpawnerConfig::from_toml_str(CONFIG).unwrap())
}

fn harness_with(config: SpawnerConfig) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ManualClock::new(0));
    let engine = SpawnerEngine::builder(config)
        .with_sink(sink.clone())
        .with_clock(clock.clone())
        .build();
    Harness { engine, sink, clock }
}

fn at(x: i32) -> Location {
    Location::new("world", x, 64, 0)
}

#[test]
fn test_open_panel_pushes_initial_display() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();

    h.engine
        .open_panel(ViewerId::new("alice"), spawner.id(), ViewKind::Primary)
        .unwrap();

    let updates = h.sink.updates_for("alice");
    assert_eq!(updates.len(), 1);
    let first = &updates[0];
    assert_eq!(first.get(DisplayField::Timer), Some("00:01"));
    assert_eq!(first.get(DisplayField::State), Some("active"));
    assert_eq!(first.get(DisplayField::StackSize), Some("1"));
    assert_eq!(first.get(DisplayField::Storage), Some("0/9"));
}

#[test]
fn test_cycle_updates_open_panel() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine
        .open_panel(ViewerId::new("alice"), spawner.id(), ViewKind::Primary)
        .unwrap();

    h.clock.set(1_000);
    let report = h.engine.run_cycle_check(1_000);
    assert_eq!(report.cycles, 1);

    let updates = h.sink.updates_for("alice");
    assert_eq!(updates.len(), 2);
    let last = &updates[1];
    assert_eq!(last.get(DisplayField::Experience), Some("5/50"));
    assert_eq!(last.get(DisplayField::Storage), Some("1/9"));
    assert!(last.get(DisplayField::StackSize).is_none());
}

#[test]
fn test_equipment_disabled_by_config() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();

    h.engine.run_cycle_check(1_000);

    spawner.with_inventory(|inv| {
        assert_eq!(inv.count_of("STONE"), 1);
        assert_eq!(inv.count_of("IRON_SWORD"), 0);
    });
}

#[test]
fn test_equipment_enabled_carries_damage() {
    let mut config = SpawnerConfig::from_toml_str(CONFIG).unwrap();
    config.spawner.allow_equipment = true;
    let h = harness_with(config);
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine.set_stack_size(spawner.id(), 3).unwrap();

    h.engine.run_cycle_check(1_000);

    spawner.with_inventory(|inv| {
        assert_eq!(inv.count_of("STONE"), 3);
        assert_eq!(inv.count_of("IRON_SWORD"), 3);
        for (_, item) in inv.items().filter(|(_, i)| i.kind == "IRON_SWORD") {
            let damage = item.damage().unwrap();
            assert!((10..=200).contains(&damage));
        }
    });
}

#[test]
fn test_stack_scales_loot_and_experience() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine.set_stack_size(spawner.id(), 4).unwrap();

    h.engine.run_cycle_check(1_000);

    assert_eq!(spawner.stored_experience(), 20);
    spawner.with_inventory(|inv| assert_eq!(inv.count_of("STONE"), 4));
}

#[test]
fn test_filter_keeps_items_out() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    assert!(h.engine.toggle_filter(spawner.id(), "STONE").unwrap());

    h.engine.run_cycle_check(1_000);

    assert_eq!(spawner.stored_experience(), 5);
    spawner.with_inventory(|inv| assert!(inv.is_empty()));
    assert_eq!(h.engine.stats().items_filtered, 1);
}

#[test]
fn test_collect_experience_resets() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine.run_cycle_check(1_000);
    h.engine.run_cycle_check(2_000);

    assert_eq!(h.engine.collect_experience(spawner.id()).unwrap(), 10);
    assert_eq!(h.engine.collect_experience(spawner.id()).unwrap(), 0);
}

#[test]
fn test_stopped_spawner_shows_state() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine
        .open_panel(ViewerId::new("alice"), spawner.id(), ViewKind::Primary)
        .unwrap();

    h.clock.set(500);
    h.engine.set_stopped(spawner.id(), true).unwrap();

    let updates = h.sink.updates_for("alice");
    assert_eq!(updates.last().unwrap().get(DisplayField::State), Some("stopped"));
    assert_eq!(h.engine.run_cycle_check(5_000).cycles, 0);

    // Past the grace window the timer reads inactive
    h.engine.view().tick(2_501);
    let updates = h.sink.updates_for("alice");
    assert_eq!(updates.last().unwrap().get(DisplayField::Timer), Some("inactive"));
}

#[test]
fn test_shared_timer_for_two_viewers() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine
        .open_panel(ViewerId::new("alice"), spawner.id(), ViewKind::Primary)
        .unwrap();
    h.engine
        .open_panel(ViewerId::new("bob"), spawner.id(), ViewKind::Primary)
        .unwrap();
    let before = h.engine.view().stats();

    h.engine.view().tick(400);

    let after = h.engine.view().stats();
    assert_eq!(after.timer_recomputations - before.timer_recomputations, 1);
    assert!(after.pushes - before.pushes <= 2);
}

#[test]
fn test_remove_closes_panels_and_releases_loot() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    let id = spawner.id().clone();
    h.engine
        .open_panel(ViewerId::new("alice"), &id, ViewKind::Storage)
        .unwrap();
    h.engine.run_cycle_check(1_000);

    let released = h.engine.remove(&id).unwrap();

    assert_eq!(released, vec![ItemStack::new("STONE", 1)]);
    assert_eq!(*h.sink.closes.lock(), vec![(ViewerId::new("alice"), id.clone())]);
    assert!(h.engine.view().registration(&ViewerId::new("alice")).is_none());
    assert!(h.engine.manager().at_location(&at(0)).is_none());
}

#[test]
fn test_close_panel_and_disconnect() {
    let h = harness();
    let spawner = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine
        .open_panel(ViewerId::new("alice"), spawner.id(), ViewKind::Primary)
        .unwrap();
    h.engine
        .open_panel(ViewerId::new("bob"), spawner.id(), ViewKind::Filter)
        .unwrap();

    assert!(h.engine.close_panel(&ViewerId::new("alice")));
    h.engine.disconnect(&ViewerId::new("bob"));

    assert!(h.engine.view().viewers_of(spawner.id()).is_empty());
    assert!(!h.engine.close_panel(&ViewerId::new("alice")));
}

#[test]
fn test_open_panel_unknown_spawner() {
    let h = harness();
    let err = h
        .engine
        .open_panel(ViewerId::new("alice"), &SpawnerId::new("nope"), ViewKind::Primary)
        .unwrap_err();
    assert!(matches!(err, EngineError::View(ViewError::UnknownSpawner(_))));
}

#[test]
fn test_stack_onto_merges_spawners() {
    let h = harness();
    let target = h.engine.place(at(0), "ZOMBIE").unwrap();
    let source = h.engine.place(at(1), "ZOMBIE").unwrap();
    h.engine.set_stack_size(source.id(), 5).unwrap();

    let transfer = h.engine.stack_onto(target.id(), source.id(), 5).unwrap();

    assert_eq!(transfer.moved, 5);
    assert!(transfer.source_removed);
    assert_eq!(target.stack_size(), 6);
    assert_eq!(h.engine.manager().len(), 1);
}

#[test]
fn test_snapshot_restore_round_trip() {
    let h = harness();
    let a = h.engine.place(at(0), "ZOMBIE").unwrap();
    h.engine.place(at(1), "ZOMBIE").unwrap();
    h.engine.set_stack_size(a.id(), 3).unwrap();
    h.engine.run_cycle_check(1_000);
    h.engine.set_stopped(a.id(), true).unwrap();

    let snapshots = h.engine.snapshot_all();
    let json = serde_json::to_string(&snapshots).unwrap();

    let other = harness();
    let decoded: Vec<SpawnerSnapshot> = serde_json::from_str(&json).unwrap();
    assert_eq!(other.engine.restore(decoded).unwrap(), 2);

    assert_eq!(other.engine.snapshot_all(), snapshots);
    let restored = other.engine.manager().at_location(&at(0)).unwrap();
    assert_eq!(restored.stored_experience(), 15);
    assert!(restored.is_stopped());
}

#[test]
fn test_restore_rejects_occupied_location() {
    let h = harness();
    h.engine.place(at(0), "ZOMBIE").unwrap();
    let snapshots = h.engine.snapshot_all();

    let err = h.engine.restore(snapshots).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Spawner(SpawnerError::DuplicateLocation(_))
    ));
}

#[test]
fn test_threaded_engine_runs_cycles() {
    let mut config = SpawnerConfig::from_toml_str(CONFIG).unwrap();
    config.spawner.spawn_delay_ticks = 1;
    config.scheduler.cycle_check_interval_ms = 10;
    config.scheduler.worker_threads = 2;

    let engine = SpawnerEngine::builder(config)
        .with_sink(Arc::new(RecordingSink::default()))
        .threaded(true)
        .build();
    let spawner = engine.place(at(0), "ZOMBIE").unwrap();

    engine.start();
    assert!(engine.is_running());

    let deadline = Instant::now() + Duration::from_secs(5);
    while spawner.stored_experience() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    engine.stop();

    assert!(spawner.stored_experience() > 0);
    assert!(!engine.is_running());
    assert!(engine.stats().cycles >= 1);
}

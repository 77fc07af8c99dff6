//! Live view synchronization
//!
//! Tracks which viewer has which panel open and keeps those panels current.
//! A shared periodic task recomputes each watched spawner's timer once per
//! pass and pushes it only to viewers whose last pushed value differs.
//! Spawner mutations arrive through [`SpawnerObserver`] and trigger a
//! coalesced out-of-band refresh of the affected viewers.
//!
//! Lock order is registrations, then the spawner index, then a single
//! registration. The sink is always called with none of them held.

use parking_lot::{Mutex, RwLock};
use spawner_core::clock::Clock;
use spawner_core::config::ViewSection;
use spawner_core::id::{SpawnerId, ViewerId};
use spawner_core::scheduler::{Scheduler, TaskHandle};
use spawner_state::{ChangedField, SpawnerManager, SpawnerObserver, SpawnerState};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::cache::{CacheStats, DisplayCache};
use crate::display::{self, DisplayField, DisplayUpdate, DisplayValues, ViewKind};
use crate::error::{ViewError, ViewResult};
use crate::sink::ViewerSink;
use crate::stats::{SyncCounters, SyncStats};

/// One open panel
struct Registration {
    spawner: SpawnerId,
    kind: ViewKind,
    /// Values the viewer currently shows
    last_pushed: DisplayValues,
    last_push_at: Option<u64>,
    dirty: bool,
    /// Bumped each time the registration is marked dirty
    revision: u64,
    closed: bool,
}

impl Registration {
    fn new(spawner: SpawnerId, kind: ViewKind) -> Self {
        Self {
            spawner,
            kind,
            last_pushed: DisplayValues::new(),
            last_push_at: None,
            dirty: true,
            revision: 0,
            closed: false,
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

type RegistrationRef = Arc<Mutex<Registration>>;

/// Public view of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub spawner: SpawnerId,
    pub kind: ViewKind,
    pub dirty: bool,
    pub last_push_at: Option<u64>,
}

/// Keeps open spawner panels in sync with spawner state
pub struct ViewSynchronizer {
    manager: Arc<SpawnerManager>,
    sink: Arc<dyn ViewerSink>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Arc<Scheduler>>,
    timer_interval: Duration,
    push_cooldown_ms: u64,

    registrations: RwLock<HashMap<ViewerId, RegistrationRef>>,
    by_spawner: RwLock<HashMap<SpawnerId, BTreeSet<ViewerId>>>,
    /// Spawners with a queued out-of-band refresh
    pending: Mutex<HashSet<SpawnerId>>,
    timer_task: Mutex<Option<TaskHandle>>,

    cache: DisplayCache,
    counters: SyncCounters,
    self_ref: Weak<ViewSynchronizer>,
}

impl ViewSynchronizer {
    /// Create a synchronizer. Without a scheduler, refreshes run inline and
    /// the timer only advances through [`Self::tick`].
    pub fn new(
        manager: Arc<SpawnerManager>,
        sink: Arc<dyn ViewerSink>,
        clock: Arc<dyn Clock>,
        config: &ViewSection,
        scheduler: Option<Arc<Scheduler>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            manager,
            sink,
            clock,
            scheduler,
            timer_interval: config.timer_interval(),
            push_cooldown_ms: config.push_cooldown_ms,
            registrations: RwLock::new(HashMap::new()),
            by_spawner: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            timer_task: Mutex::new(None),
            cache: DisplayCache::new(config.display_cache_capacity),
            counters: SyncCounters::default(),
            self_ref: self_ref.clone(),
        })
    }

    /// Observer to attach to the spawner manager. Holds only a weak
    /// reference so the manager does not keep the synchronizer alive.
    pub fn observer(&self) -> Arc<dyn SpawnerObserver> {
        Arc::new(SyncObserver(self.self_ref.clone()))
    }

    // ---- registration ----

    /// Bind a viewer's open panel to a spawner. Registering the same binding
    /// twice is a no-op; a different binding replaces the previous one.
    pub fn register(&self, viewer: ViewerId, spawner: SpawnerId, kind: ViewKind) -> ViewResult<()> {
        let state = self
            .manager
            .get(&spawner)
            .filter(|s| !s.is_removed())
            .ok_or_else(|| ViewError::UnknownSpawner(spawner.clone()))?;

        {
            let mut regs = self.registrations.write();
            if let Some(existing) = regs.get(&viewer) {
                let r = existing.lock();
                if r.spawner == spawner && r.kind == kind {
                    return Ok(());
                }
            }

            let mut by_spawner = self.by_spawner.write();
            if let Some(previous) = regs.remove(&viewer) {
                let mut r = previous.lock();
                r.closed = true;
                detach(&mut by_spawner, &r.spawner, &viewer);
            }
            regs.insert(
                viewer.clone(),
                Arc::new(Mutex::new(Registration::new(spawner.clone(), kind))),
            );
            by_spawner.entry(spawner.clone()).or_default().insert(viewer.clone());
        }

        // Removal may have raced the insert
        if state.is_removed() {
            self.unregister(&viewer);
            return Err(ViewError::UnknownSpawner(spawner));
        }

        log::debug!("Viewer {} opened {:?} panel of {}", viewer, kind, spawner);
        self.update_timer_task();
        Ok(())
    }

    /// Drop a viewer's registration. Returns false if it had none.
    pub fn unregister(&self, viewer: &ViewerId) -> bool {
        self.remove_registration(viewer, None)
    }

    fn remove_registration(&self, viewer: &ViewerId, expected: Option<&RegistrationRef>) -> bool {
        {
            let mut regs = self.registrations.write();
            let current = match regs.get(viewer) {
                Some(current) => current,
                None => return false,
            };
            if let Some(expected) = expected {
                if !Arc::ptr_eq(current, expected) {
                    return false;
                }
            }
            let Some(reg) = regs.remove(viewer) else {
                return false;
            };

            let mut by_spawner = self.by_spawner.write();
            let mut r = reg.lock();
            r.closed = true;
            detach(&mut by_spawner, &r.spawner, viewer);
        }

        self.update_timer_task();
        true
    }

    /// Current binding of a viewer
    pub fn registration(&self, viewer: &ViewerId) -> Option<RegistrationInfo> {
        let reg = self.registrations.read().get(viewer).cloned()?;
        let r = reg.lock();
        Some(RegistrationInfo {
            spawner: r.spawner.clone(),
            kind: r.kind,
            dirty: r.dirty,
            last_push_at: r.last_push_at,
        })
    }

    /// Viewers with a panel open on a spawner, sorted
    pub fn viewers_of(&self, spawner: &SpawnerId) -> Vec<ViewerId> {
        self.by_spawner
            .read()
            .get(spawner)
            .map(|viewers| viewers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.read().len()
    }

    fn registrations_of(&self, spawner: &SpawnerId) -> Vec<(ViewerId, RegistrationRef)> {
        let regs = self.registrations.read();
        let by_spawner = self.by_spawner.read();
        by_spawner
            .get(spawner)
            .map(|viewers| {
                viewers
                    .iter()
                    .filter_map(|v| regs.get(v).map(|r| (v.clone(), Arc::clone(r))))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---- periodic task ----

    /// Start the shared timer task on the first registration and cancel it
    /// after the last one goes away
    fn update_timer_task(&self) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        let mut task = self.timer_task.lock();
        let wanted = !self.registrations.read().is_empty();

        match (wanted, task.is_some()) {
            (true, false) => {
                let weak = self.self_ref.clone();
                *task = Some(scheduler.schedule_at_fixed_rate(
                    "view-timer",
                    self.timer_interval,
                    move || {
                        if let Some(sync) = weak.upgrade() {
                            sync.tick(sync.clock.now_millis());
                        }
                    },
                ));
                log::info!("View timer started ({:?})", self.timer_interval);
            }
            (false, true) => {
                if let Some(handle) = task.take() {
                    handle.cancel();
                }
                log::info!("View timer stopped");
            }
            _ => {}
        }
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer_task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_cancelled())
    }

    /// One timer pass over every watched spawner
    pub fn tick(&self, now: u64) {
        let spawners: Vec<SpawnerId> = self.by_spawner.read().keys().cloned().collect();
        for spawner in spawners {
            self.sync_spawner(&spawner, now, true);
        }
    }

    // ---- change handling ----

    /// React to a spawner mutation
    pub fn on_spawner_changed(&self, spawner: &SpawnerId, fields: &[ChangedField]) {
        if fields.contains(&ChangedField::Removed) {
            self.close_spawner(spawner);
            return;
        }

        let viewers = self.registrations_of(spawner);
        if viewers.is_empty() {
            return;
        }
        for (_, reg) in &viewers {
            reg.lock().mark_dirty();
        }

        if !self.pending.lock().insert(spawner.clone()) {
            return;
        }

        match &self.scheduler {
            Some(scheduler) => {
                let weak = self.self_ref.clone();
                let id = spawner.clone();
                let queued = scheduler.submit(move || {
                    if let Some(sync) = weak.upgrade() {
                        sync.flush_pending(&id);
                    }
                });
                if !queued {
                    self.flush_pending(spawner);
                }
            }
            None => self.flush_pending(spawner),
        }
    }

    fn flush_pending(&self, spawner: &SpawnerId) {
        self.pending.lock().remove(spawner);
        self.sync_spawner(spawner, self.clock.now_millis(), false);
    }

    /// Push the full current display to every viewer of a spawner
    pub fn force_sync(&self, spawner: &SpawnerId, now: u64) {
        for (_, reg) in self.registrations_of(spawner) {
            reg.lock().mark_dirty();
        }
        self.sync_spawner(spawner, now, false);
    }

    /// Force-close every panel bound to a removed spawner
    fn close_spawner(&self, spawner: &SpawnerId) {
        let closed: Vec<ViewerId> = {
            let mut regs = self.registrations.write();
            let mut by_spawner = self.by_spawner.write();
            let viewers = by_spawner.remove(spawner).unwrap_or_default();
            for viewer in &viewers {
                if let Some(reg) = regs.remove(viewer) {
                    reg.lock().closed = true;
                }
            }
            viewers.into_iter().collect()
        };

        self.pending.lock().remove(spawner);
        self.cache.evict_spawner(spawner);

        if closed.is_empty() {
            return;
        }
        for viewer in &closed {
            self.sink.close(viewer, spawner);
            SyncCounters::bump(&self.counters.panels_closed);
        }
        log::debug!("Closed {} panels of removed spawner {}", closed.len(), spawner);
        self.update_timer_task();
    }

    // ---- synchronization ----

    /// Recompute and push what changed for each viewer of one spawner.
    /// `timer_pass` also refreshes the timer of clean primary panels.
    fn sync_spawner(&self, spawner: &SpawnerId, now: u64, timer_pass: bool) {
        let viewers = self.registrations_of(spawner);
        if viewers.is_empty() {
            return;
        }
        let Some(state) = self.manager.get(spawner) else {
            self.close_spawner(spawner);
            return;
        };

        let mut timer: Option<String> = None;
        for (viewer, reg) in viewers {
            let (update, revision) = {
                let mut r = reg.lock();
                if r.closed {
                    continue;
                }

                let wanted = if r.dirty {
                    let mut values = self.cached_static_values(&state, r.kind);
                    if r.kind.shows_timer() {
                        values.insert(DisplayField::Timer, self.timer_once(&mut timer, &state, now));
                    }
                    values
                } else if timer_pass && r.kind.shows_timer() {
                    DisplayValues::from([(
                        DisplayField::Timer,
                        self.timer_once(&mut timer, &state, now),
                    )])
                } else {
                    continue;
                };

                let changed: DisplayValues = wanted
                    .into_iter()
                    .filter(|(field, value)| r.last_pushed.get(field) != Some(value))
                    .collect();

                if changed.is_empty() {
                    r.dirty = false;
                    SyncCounters::bump(&self.counters.skipped_duplicates);
                    continue;
                }
                if self.should_rate_limit(r.last_push_at, now) {
                    r.dirty = true;
                    SyncCounters::bump(&self.counters.rate_limited);
                    continue;
                }

                let update = DisplayUpdate {
                    spawner: spawner.clone(),
                    kind: r.kind,
                    fields: changed,
                };
                (update, r.revision)
            };

            self.deliver(&viewer, &reg, update, revision, now);
        }
    }

    fn deliver(
        &self,
        viewer: &ViewerId,
        reg: &RegistrationRef,
        update: DisplayUpdate,
        revision: u64,
        now: u64,
    ) {
        // Unregistered since the update was planned
        if reg.lock().closed {
            return;
        }

        match self.sink.push(viewer, &update) {
            Ok(()) => {
                SyncCounters::bump(&self.counters.pushes);
                let mut r = reg.lock();
                if !r.closed {
                    r.last_pushed.extend(update.fields);
                    r.last_push_at = Some(now);
                    if r.revision == revision {
                        r.dirty = false;
                    }
                }
            }
            Err(ViewError::ViewerUnreachable(_)) => {
                log::debug!("Viewer {} unreachable; unregistering", viewer);
                if self.remove_registration(viewer, Some(reg)) {
                    SyncCounters::bump(&self.counters.implicit_unregisters);
                }
            }
            Err(e) => log::debug!("Push to {} failed: {}", viewer, e),
        }
    }

    fn should_rate_limit(&self, last_push_at: Option<u64>, now: u64) -> bool {
        last_push_at.is_some_and(|at| now.saturating_sub(at) < self.push_cooldown_ms)
    }

    fn timer_once(&self, slot: &mut Option<String>, state: &SpawnerState, now: u64) -> String {
        slot.get_or_insert_with(|| {
            SyncCounters::bump(&self.counters.timer_recomputations);
            display::timer_value(state, now)
        })
        .clone()
    }

    fn cached_static_values(&self, state: &SpawnerState, kind: ViewKind) -> DisplayValues {
        let epoch = state.epoch();
        if let Some(values) = self.cache.get(state.id(), kind, epoch) {
            return values;
        }
        SyncCounters::bump(&self.counters.display_recomputations);
        let values = display::static_values(state, kind);
        self.cache.insert(state.id(), kind, epoch, values.clone());
        values
    }

    // ---- stats ----

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot(self.registration_count())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl SpawnerObserver for ViewSynchronizer {
    fn on_spawner_changed(&self, id: &SpawnerId, fields: &[ChangedField]) {
        ViewSynchronizer::on_spawner_changed(self, id, fields);
    }
}

impl Drop for ViewSynchronizer {
    fn drop(&mut self) {
        if let Some(handle) = self.timer_task.get_mut().take() {
            handle.cancel();
        }
    }
}

/// Weak forwarding observer
struct SyncObserver(Weak<ViewSynchronizer>);

impl SpawnerObserver for SyncObserver {
    fn on_spawner_changed(&self, id: &SpawnerId, fields: &[ChangedField]) {
        if let Some(sync) = self.0.upgrade() {
            sync.on_spawner_changed(id, fields);
        }
    }
}

fn detach(by_spawner: &mut HashMap<SpawnerId, BTreeSet<ViewerId>>, spawner: &SpawnerId, viewer: &ViewerId) {
    if let Some(viewers) = by_spawner.get_mut(spawner) {
        viewers.remove(viewer);
        if viewers.is_empty() {
            by_spawner.remove(spawner);
        }
    }
}

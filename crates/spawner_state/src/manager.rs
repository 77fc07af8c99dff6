//! Spawner registry
//!
//! Indexes live spawners by id and by location, and fans change
//! notifications out to every attached observer.

use parking_lot::{Mutex, RwLock};
use spawner_core::config::SpawnerConfig;
use spawner_core::id::{Location, SpawnerId};
use spawner_inventory::ItemStack;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SpawnerError, SpawnerResult};
use crate::snapshot::SpawnerSnapshot;
use crate::state::{ChangedField, SpawnerObserver, SpawnerState};

/// Observer that forwards to a list of observers
#[derive(Default)]
struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn SpawnerObserver>>>,
}

impl SpawnerObserver for ObserverSet {
    fn on_spawner_changed(&self, id: &SpawnerId, fields: &[ChangedField]) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_spawner_changed(id, fields);
        }
    }
}

/// Result of merging part of one stack into another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTransfer {
    /// Stack units moved onto the target
    pub moved: u32,
    /// The source gave up its whole stack and was removed
    pub source_removed: bool,
    /// Storage contents released by a removed source
    pub released: Vec<ItemStack>,
}

/// Concurrent registry of all spawners
pub struct SpawnerManager {
    config: Arc<SpawnerConfig>,
    spawners: RwLock<HashMap<SpawnerId, Arc<SpawnerState>>>,
    by_location: RwLock<HashMap<Location, SpawnerId>>,
    observers: Arc<ObserverSet>,
    /// Serializes stack transfers
    transfers: Mutex<()>,
}

impl SpawnerManager {
    pub fn new(config: Arc<SpawnerConfig>) -> Self {
        Self {
            config,
            spawners: RwLock::new(HashMap::new()),
            by_location: RwLock::new(HashMap::new()),
            observers: Arc::new(ObserverSet::default()),
            transfers: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Arc<SpawnerConfig> {
        &self.config
    }

    /// Attach an observer to every current and future spawner
    pub fn add_observer(&self, observer: Arc<dyn SpawnerObserver>) {
        self.observers.observers.write().push(observer);
    }

    /// Create and activate a spawner at an unoccupied location
    pub fn place(
        &self,
        location: Location,
        entity_type: impl Into<String>,
        now: u64,
    ) -> SpawnerResult<Arc<SpawnerState>> {
        let state = SpawnerState::new(SpawnerId::generate(), location, entity_type, &self.config);
        let state = self.insert(state)?;
        state.set_active(true, now);
        log::info!(
            "Placed {} spawner {} at {}",
            state.entity_type(),
            state.id(),
            state.location()
        );
        Ok(state)
    }

    /// Register an existing spawner
    pub fn insert(&self, state: SpawnerState) -> SpawnerResult<Arc<SpawnerState>> {
        let mut by_location = self.by_location.write();
        let mut spawners = self.spawners.write();

        if by_location.contains_key(state.location()) {
            return Err(SpawnerError::DuplicateLocation(state.location().clone()));
        }

        let id = state.id().clone();
        let state = Arc::new(state);
        state.set_observer(self.observers.clone());
        by_location.insert(state.location().clone(), id.clone());
        spawners.insert(id, Arc::clone(&state));
        Ok(state)
    }

    /// Rebuild and register a spawner from a snapshot
    pub fn restore(&self, snapshot: SpawnerSnapshot) -> SpawnerResult<Arc<SpawnerState>> {
        let state = SpawnerState::restore(snapshot, &self.config)?;
        log::debug!("Restored spawner {} at {}", state.id(), state.location());
        self.insert(state)
    }

    pub fn get(&self, id: &SpawnerId) -> Option<Arc<SpawnerState>> {
        self.spawners.read().get(id).cloned()
    }

    /// Like [`Self::get`] but as an error
    pub fn require(&self, id: &SpawnerId) -> SpawnerResult<Arc<SpawnerState>> {
        self.get(id).ok_or_else(|| SpawnerError::NotFound(id.clone()))
    }

    pub fn at_location(&self, location: &Location) -> Option<Arc<SpawnerState>> {
        let id = self.by_location.read().get(location).cloned()?;
        self.get(&id)
    }

    /// Remove a spawner and return its storage contents
    pub fn remove(&self, id: &SpawnerId) -> SpawnerResult<Vec<ItemStack>> {
        let state = {
            let mut by_location = self.by_location.write();
            let mut spawners = self.spawners.write();
            let state = spawners
                .remove(id)
                .ok_or_else(|| SpawnerError::NotFound(id.clone()))?;
            by_location.remove(state.location());
            state
        };

        // Observers run without registry locks held
        let contents = state.mark_removed();
        log::info!("Removed spawner {} ({} stacks released)", id, contents.len());
        Ok(contents)
    }

    pub fn all(&self) -> Vec<Arc<SpawnerState>> {
        self.spawners.read().values().cloned().collect()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<SpawnerId> {
        let mut ids: Vec<SpawnerId> = self.spawners.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.spawners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawners.read().is_empty()
    }

    /// Move up to `amount` stack units from `source` onto `target`.
    ///
    /// Both spawners must share an entity type. The transfer is limited by the
    /// target's headroom; a source that gives up its whole stack is removed.
    pub fn stack_onto(
        &self,
        target: &SpawnerId,
        source: &SpawnerId,
        amount: u32,
    ) -> SpawnerResult<StackTransfer> {
        let target_state = self.require(target)?;
        let source_state = self.require(source)?;
        if target == source {
            return Ok(StackTransfer::default());
        }

        let (target_type, source_type) = (target_state.entity_type(), source_state.entity_type());
        if target_type != source_type {
            return Err(SpawnerError::IncompatibleStack {
                target_type,
                source_type,
            });
        }

        let _transfer = self.transfers.lock();

        let headroom = target_state
            .limits()
            .max_stack_size
            .saturating_sub(target_state.stack_size());
        let taken = source_state.take_stack_units(amount.min(headroom));
        if taken == 0 {
            return Ok(StackTransfer::default());
        }

        // The target may have grown since its headroom was read
        let moved = target_state.add_stack_units(taken);
        if moved < taken {
            source_state.add_stack_units(taken - moved);
        }

        if source_state.stack_size() > 0 {
            return Ok(StackTransfer {
                moved,
                source_removed: false,
                released: Vec::new(),
            });
        }

        let released = match self.remove(source) {
            Ok(released) => released,
            Err(SpawnerError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(StackTransfer {
            moved,
            source_removed: true,
            released,
        })
    }

    /// Snapshots of every spawner, ordered by id
    pub fn snapshot_all(&self) -> Vec<SpawnerSnapshot> {
        let mut snapshots: Vec<SpawnerSnapshot> =
            self.all().iter().map(|s| s.snapshot()).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Change the slot count of every spawner's storage. Stacks that no longer
    /// fit are returned per spawner.
    pub fn resize_storage(&self, slots: usize) -> Vec<(SpawnerId, Vec<ItemStack>)> {
        let mut overflow = Vec::new();
        for state in self.all() {
            let Ok(lost) = state.with_inventory_mut(|inv| inv.resize(slots)) else {
                continue;
            };
            if !lost.is_empty() {
                log::warn!(
                    "Spawner {} storage shrank to {} slots; {} stacks displaced",
                    state.id(),
                    slots,
                    lost.len()
                );
                overflow.push((state.id().clone(), lost));
            }
        }
        overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn manager() -> SpawnerManager {
        let mut config = SpawnerConfig::default();
        config.spawner.max_stack_size = 10;
        SpawnerManager::new(Arc::new(config))
    }

    fn loc(x: i32) -> Location {
        Location::new("world", x, 64, 0)
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(SpawnerId, Vec<ChangedField>)>>,
    }

    impl SpawnerObserver for Recorder {
        fn on_spawner_changed(&self, id: &SpawnerId, fields: &[ChangedField]) {
            self.seen.lock().push((id.clone(), fields.to_vec()));
        }
    }

    #[test]
    fn test_place_and_lookup() {
        let manager = manager();
        let spawner = manager.place(loc(1), "ZOMBIE", 0).unwrap();

        assert!(spawner.is_active());
        assert_eq!(manager.len(), 1);
        assert!(Arc::ptr_eq(&manager.get(spawner.id()).unwrap(), &spawner));
        assert!(Arc::ptr_eq(&manager.at_location(&loc(1)).unwrap(), &spawner));
        assert!(manager.at_location(&loc(2)).is_none());
    }

    #[test]
    fn test_duplicate_location_rejected() {
        let manager = manager();
        manager.place(loc(1), "ZOMBIE", 0).unwrap();

        let err = manager.place(loc(1), "SKELETON", 0).unwrap_err();
        assert!(matches!(err, SpawnerError::DuplicateLocation(_)));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_releases_contents_and_notifies() {
        let manager = manager();
        let recorder = Arc::new(Recorder::default());
        manager.add_observer(recorder.clone());

        let spawner = manager.place(loc(1), "ZOMBIE", 0).unwrap();
        spawner.store_items(vec![ItemStack::new("ROTTEN_FLESH", 12)]);
        let id = spawner.id().clone();

        let released = manager.remove(&id).unwrap();
        assert_eq!(released, vec![ItemStack::new("ROTTEN_FLESH", 12)]);
        assert!(spawner.is_removed());
        assert!(manager.at_location(&loc(1)).is_none());
        assert!(matches!(manager.remove(&id), Err(SpawnerError::NotFound(_))));

        let seen = recorder.seen.lock();
        assert_eq!(seen.last().unwrap(), &(id, vec![ChangedField::Removed]));
    }

    #[test]
    fn test_stack_onto_partial_and_full() {
        let manager = manager();
        let target = manager.place(loc(1), "ZOMBIE", 0).unwrap();
        let source = manager.place(loc(2), "ZOMBIE", 0).unwrap();
        target.set_stack_size(6);
        source.set_stack_size(7);

        // Target headroom is 4
        let transfer = manager.stack_onto(target.id(), source.id(), 7).unwrap();
        assert_eq!(transfer.moved, 4);
        assert!(!transfer.source_removed);
        assert_eq!(target.stack_size(), 10);
        assert_eq!(source.stack_size(), 3);

        target.set_stack_size(2);
        source.store_items(vec![ItemStack::new("IRON_INGOT", 5)]);
        let transfer = manager.stack_onto(target.id(), source.id(), 3).unwrap();
        assert_eq!(transfer.moved, 3);
        assert!(transfer.source_removed);
        assert_eq!(transfer.released, vec![ItemStack::new("IRON_INGOT", 5)]);
        assert_eq!(target.stack_size(), 5);
        assert!(manager.get(source.id()).is_none());
    }

    #[test]
    fn test_concurrent_transfers_conserve_units() {
        let mut config = SpawnerConfig::default();
        config.spawner.max_stack_size = 50;
        let manager = Arc::new(SpawnerManager::new(Arc::new(config)));
        let source = manager.place(loc(0), "ZOMBIE", 0).unwrap();
        source.set_stack_size(20);
        let targets: Vec<_> = (1..=4)
            .map(|x| manager.place(loc(x), "ZOMBIE", 0).unwrap())
            .collect();

        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let manager = manager.clone();
                let target = target.id().clone();
                let source = source.id().clone();
                std::thread::spawn(move || {
                    let mut moved = 0;
                    while let Ok(transfer) = manager.stack_onto(&target, &source, 1) {
                        moved += transfer.moved;
                        if transfer.source_removed {
                            break;
                        }
                    }
                    moved
                })
            })
            .collect();
        let moved: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(moved, 20);
        assert_eq!(targets.iter().map(|t| t.stack_size()).sum::<u32>(), 4 + 20);
        assert!(source.is_removed());
    }

    #[test]
    fn test_transfer_survives_shrinking_source() {
        let manager = Arc::new(manager());
        let target = manager.place(loc(1), "ZOMBIE", 0).unwrap();
        let source = manager.place(loc(2), "ZOMBIE", 0).unwrap();

        let shrinker = {
            let source = source.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    source.set_stack_size(1 + i % 5);
                }
            })
        };
        for _ in 0..500 {
            if manager.stack_onto(target.id(), source.id(), 5).is_err() {
                break;
            }
            target.set_stack_size(1);
        }
        shrinker.join().unwrap();

        assert!(target.stack_size() >= 1 && target.stack_size() <= 10);
        assert!(source.stack_size() <= 10);
    }

    #[test]
    fn test_stack_onto_incompatible() {
        let manager = manager();
        let target = manager.place(loc(1), "ZOMBIE", 0).unwrap();
        let source = manager.place(loc(2), "SKELETON", 0).unwrap();

        let err = manager.stack_onto(target.id(), source.id(), 1).unwrap_err();
        assert!(matches!(err, SpawnerError::IncompatibleStack { .. }));
    }

    #[test]
    fn test_snapshot_restore() {
        let manager = manager();
        let spawner = manager.place(loc(1), "ZOMBIE", 250).unwrap();
        spawner.set_stack_size(4);
        spawner.add_experience(30);
        spawner.toggle_filter("ROTTEN_FLESH");
        spawner.store_items(vec![ItemStack::new("IRON_INGOT", 70)]);
        let snapshot = spawner.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: SpawnerSnapshot = serde_json::from_str(&json).unwrap();

        let other = manager_with_same_config(&manager);
        let restored = other.restore(decoded).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.mob_range(), (4, 16));
        assert!(restored.is_filtered("ROTTEN_FLESH"));
        assert_eq!(snapshot.total_items(), 70);
    }

    fn manager_with_same_config(manager: &SpawnerManager) -> SpawnerManager {
        SpawnerManager::new(Arc::clone(manager.config()))
    }

    #[test]
    fn test_resize_storage_reports_overflow() {
        let manager = manager();
        let spawner = manager.place(loc(1), "ZOMBIE", 0).unwrap();
        spawner.store_items((0..5).map(|i| ItemStack::new(format!("K{}", i), 1)).collect());

        let overflow = manager.resize_storage(3);
        assert_eq!(overflow.len(), 1);
        assert_eq!(overflow[0].1.len(), 2);
        spawner.with_inventory(|inv| assert_eq!(inv.size(), 3));
    }
}

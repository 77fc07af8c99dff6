//! Panel kinds, display fields and value formatting

use serde::{Deserialize, Serialize};
use spawner_core::id::SpawnerId;
use spawner_state::{CycleTimer, Lifecycle, SpawnerState};
use std::collections::BTreeMap;

/// Slots shown on one storage page
pub const STORAGE_PAGE_SIZE: usize = 45;

/// Kind of panel a viewer has open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    /// Main spawner panel with the live timer
    Primary,
    /// Loot storage pages
    Storage,
    /// Item filter settings
    Filter,
}

impl ViewKind {
    /// Fields shown by this panel kind
    pub fn fields(self) -> &'static [DisplayField] {
        match self {
            ViewKind::Primary => &[
                DisplayField::Timer,
                DisplayField::StackSize,
                DisplayField::Experience,
                DisplayField::Storage,
                DisplayField::EntityType,
                DisplayField::State,
            ],
            ViewKind::Storage => &[
                DisplayField::Storage,
                DisplayField::Pages,
                DisplayField::Experience,
            ],
            ViewKind::Filter => &[DisplayField::Filter],
        }
    }

    pub fn shows_timer(self) -> bool {
        self == ViewKind::Primary
    }
}

/// One displayed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DisplayField {
    Timer,
    StackSize,
    Experience,
    Storage,
    EntityType,
    State,
    Pages,
    Filter,
}

impl DisplayField {
    /// Key used by the display layer
    pub fn name(self) -> &'static str {
        match self {
            DisplayField::Timer => "timer",
            DisplayField::StackSize => "stack_size",
            DisplayField::Experience => "experience",
            DisplayField::Storage => "storage",
            DisplayField::EntityType => "entity_type",
            DisplayField::State => "state",
            DisplayField::Pages => "pages",
            DisplayField::Filter => "filter",
        }
    }
}

/// Field values keyed by field
pub type DisplayValues = BTreeMap<DisplayField, String>;

/// Changed fields sent to one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayUpdate {
    pub spawner: SpawnerId,
    pub kind: ViewKind,
    pub fields: DisplayValues,
}

impl DisplayUpdate {
    pub fn get(&self, field: DisplayField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// `(name, value)` pairs for the display layer
    pub fn named(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(f, v)| (f.name(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Timer text: `mm:ss` rounded up to the next second, or a status word
pub fn format_timer(timer: CycleTimer) -> String {
    match timer {
        CycleTimer::Remaining(ms) => {
            let secs = (ms + 999) / 1000;
            format!("{:02}:{:02}", secs / 60, secs % 60)
        }
        CycleTimer::Inactive => "inactive".to_string(),
        CycleTimer::Full => "full".to_string(),
    }
}

/// Compute the timer text for a spawner
pub fn timer_value(state: &SpawnerState, now: u64) -> String {
    format_timer(state.time_until_next_cycle(now))
}

/// Compute every non-timer field of a panel kind
pub fn static_values(state: &SpawnerState, kind: ViewKind) -> DisplayValues {
    let mut values = DisplayValues::new();
    for &field in kind.fields() {
        let value = match field {
            DisplayField::Timer => continue,
            DisplayField::StackSize => state.stack_size().to_string(),
            DisplayField::Experience => format!(
                "{}/{}",
                state.stored_experience(),
                state.max_stored_experience()
            ),
            DisplayField::Storage => {
                state.with_inventory(|inv| format!("{}/{}", inv.used_slot_count(), inv.size()))
            }
            DisplayField::EntityType => state.entity_type(),
            DisplayField::State => lifecycle_name(state.lifecycle()).to_string(),
            DisplayField::Pages => state
                .with_inventory(|inv| inv.page_count(STORAGE_PAGE_SIZE))
                .to_string(),
            DisplayField::Filter => {
                let filtered = state.filtered_items();
                if filtered.is_empty() {
                    "none".to_string()
                } else {
                    filtered.join(",")
                }
            }
        };
        values.insert(field, value);
    }
    values
}

fn lifecycle_name(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::Uninitialized => "inactive",
        Lifecycle::Active => "active",
        Lifecycle::Stopped => "stopped",
        Lifecycle::Removed => "removed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawner_core::config::SpawnerConfig;
    use spawner_core::id::Location;
    use spawner_inventory::ItemStack;

    #[test]
    fn test_format_timer() {
        assert_eq!(format_timer(CycleTimer::Remaining(0)), "00:00");
        assert_eq!(format_timer(CycleTimer::Remaining(1)), "00:01");
        assert_eq!(format_timer(CycleTimer::Remaining(25_000)), "00:25");
        assert_eq!(format_timer(CycleTimer::Remaining(61_500)), "01:02");
        assert_eq!(format_timer(CycleTimer::Inactive), "inactive");
        assert_eq!(format_timer(CycleTimer::Full), "full");
    }

    #[test]
    fn test_kind_field_sets() {
        assert!(ViewKind::Primary.fields().contains(&DisplayField::Timer));
        assert!(!ViewKind::Storage.fields().contains(&DisplayField::Timer));
        assert_eq!(ViewKind::Filter.fields(), &[DisplayField::Filter]);
    }

    #[test]
    fn test_static_values() {
        let state = SpawnerState::new(
            SpawnerId::new("S1"),
            Location::new("world", 0, 0, 0),
            "SKELETON",
            &SpawnerConfig::default(),
        );
        state.set_active(true, 0);
        state.store_items(vec![ItemStack::new("BONE", 100)]);
        state.add_experience(12);

        let primary = static_values(&state, ViewKind::Primary);
        assert!(!primary.contains_key(&DisplayField::Timer));
        assert_eq!(primary[&DisplayField::Storage], "2/45");
        assert_eq!(primary[&DisplayField::Experience], "12/1000");
        assert_eq!(primary[&DisplayField::EntityType], "SKELETON");
        assert_eq!(primary[&DisplayField::State], "active");

        let storage = static_values(&state, ViewKind::Storage);
        assert_eq!(storage[&DisplayField::Pages], "1");

        state.toggle_filter("BONE");
        state.toggle_filter("ARROW");
        assert_eq!(static_values(&state, ViewKind::Filter)[&DisplayField::Filter], "ARROW,BONE");
    }
}

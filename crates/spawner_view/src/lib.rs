//! # Spawner View
//!
//! Keeps many concurrently open spawner panels up to date without
//! recomputing shared values per viewer.
//!
//! ## Features
//!
//! - Registration of viewer panels (primary, storage, filter)
//! - Shared timer pass: one computation per spawner, pushed only on change
//! - Per-viewer caches of last pushed values with dirty flags
//! - Push cooldown per viewer
//! - Bounded, epoch-validated cache of computed display values
//! - Implicit unregistration of unreachable viewers
//!
//! ## Example
//!
//! ```ignore
//! use spawner_view::prelude::*;
//!
//! let sync = ViewSynchronizer::new(manager.clone(), sink, clock, &config.view, Some(scheduler));
//! manager.add_observer(sync.observer());
//!
//! sync.register(viewer, spawner_id.clone(), ViewKind::Primary)?;
//! sync.force_sync(&spawner_id, now);
//! ```

pub mod cache;
pub mod display;
pub mod error;
pub mod sink;
pub mod stats;
pub mod synchronizer;

pub mod prelude {
    pub use crate::cache::{CacheStats, DisplayCache};
    pub use crate::display::{
        format_timer, DisplayField, DisplayUpdate, DisplayValues, ViewKind, STORAGE_PAGE_SIZE,
    };
    pub use crate::error::{ViewError, ViewResult};
    pub use crate::sink::{LogSink, ViewerSink};
    pub use crate::stats::SyncStats;
    pub use crate::synchronizer::{RegistrationInfo, ViewSynchronizer};
}

pub use prelude::*;

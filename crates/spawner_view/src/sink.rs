//! Display-layer boundary

use spawner_core::id::{SpawnerId, ViewerId};

use crate::display::DisplayUpdate;
use crate::error::ViewResult;

/// Delivers panel updates to connected viewers.
///
/// Implementations must not call back into the synchronizer from `push`
/// while holding their own locks. Returning
/// [`crate::ViewError::ViewerUnreachable`] unregisters the viewer.
pub trait ViewerSink: Send + Sync {
    /// Send changed fields to one viewer
    fn push(&self, viewer: &ViewerId, update: &DisplayUpdate) -> ViewResult<()>;

    /// Force-close a viewer's panel for a spawner
    fn close(&self, viewer: &ViewerId, spawner: &SpawnerId);
}

/// Sink that logs every update
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ViewerSink for LogSink {
    fn push(&self, viewer: &ViewerId, update: &DisplayUpdate) -> ViewResult<()> {
        let fields: Vec<String> = update
            .named()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        log::info!("[{} <- {}] {}", viewer, update.spawner, fields.join(" "));
        Ok(())
    }

    fn close(&self, viewer: &ViewerId, spawner: &SpawnerId) {
        log::info!("[{} <- {}] panel closed", viewer, spawner);
    }
}

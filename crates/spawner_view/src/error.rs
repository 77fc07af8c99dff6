//! View errors

use spawner_core::id::{SpawnerId, ViewerId};
use thiserror::Error;

/// Errors raised by the view layer
#[derive(Debug, Error)]
pub enum ViewError {
    /// The viewer's connection is gone; the registration is dropped
    #[error("Viewer unreachable: {0}")]
    ViewerUnreachable(ViewerId),

    #[error("Unknown spawner: {0}")]
    UnknownSpawner(SpawnerId),
}

pub type ViewResult<T> = Result<T, ViewError>;

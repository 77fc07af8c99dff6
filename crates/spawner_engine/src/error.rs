//! Engine errors

use spawner_core::config::ConfigError;
use spawner_state::SpawnerError;
use spawner_view::ViewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Spawner(#[from] SpawnerError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;

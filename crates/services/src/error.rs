//! Shared error types for the services crate.

use thiserror::Error;

use practice_core::config::ConfigError;
use practice_core::model::SessionRecordError;
use practice_core::scheduler::SchedulerError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the engine services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("storage call `{operation}` timed out")]
    Timeout { operation: &'static str },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Session(#[from] SessionRecordError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors emitted while wiring the engine together.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod messages;
pub mod progression_service;
pub mod scheduler_service;
pub mod sessions;
pub mod tag_graph_service;
mod timeout;

pub use practice_core::Clock;

pub use engine::Engine;
pub use error::{EngineInitError, ServiceError};
pub use messages::{Request, Response};
pub use progression_service::ProgressionService;
pub use scheduler_service::SchedulerService;
pub use sessions::{AttemptOutcome, SessionAssembler, SessionCompletion, SessionWorkflow};
pub use tag_graph_service::{RebuildOutcome, TagGraphService};

#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AttemptRepository, InMemoryRepository, ProblemRepository, ProgressionRepository,
    SessionRepository, Storage, StorageError, TagRelationshipRepository,
};

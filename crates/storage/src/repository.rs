use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::graph::TagGraph;
use practice_core::model::{
    Difficulty, Problem, ProblemId, RecordedAttempt, SessionId, SessionRecord, SessionType,
};
use practice_core::progression::ProgressionState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Domain(#[from] practice_core::Error),
}

/// Problem records with their scheduling state.
#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Persist or update a problem, replacing its tag list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the problem cannot be stored.
    async fn upsert_problem(&self, problem: &Problem) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_problem(&self, id: ProblemId) -> Result<Problem, StorageError>;

    /// All problems ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    async fn list_problems(&self) -> Result<Vec<Problem>, StorageError>;

    /// Attempted problems due at `now` whose difficulty fits under `cap`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    async fn due_problems(
        &self,
        now: DateTime<Utc>,
        cap: Difficulty,
    ) -> Result<Vec<Problem>, StorageError>;

    /// Never-attempted problems under `cap`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    async fn new_problems(&self, cap: Difficulty) -> Result<Vec<Problem>, StorageError>;
}

/// Append-only attempt history.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Append an attempt and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn append_attempt(&self, attempt: &RecordedAttempt) -> Result<i64, StorageError>;

    /// History for one problem in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn attempts_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<RecordedAttempt>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn list_attempts(&self) -> Result<Vec<RecordedAttempt>, StorageError>;

    /// Well-dated attempts at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecordedAttempt>, StorageError>;
}

/// The persisted tag graph, replaced wholesale on rebuild.
#[async_trait]
pub trait TagRelationshipRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn has_relationships(&self) -> Result<bool, StorageError>;

    /// Atomically swap the stored graph for `graph`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the swap fails; the previous graph is kept.
    async fn replace_relationships(&self, graph: &TagGraph) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    async fn load_relationships(&self) -> Result<TagGraph, StorageError>;
}

#[async_trait]
pub trait ProgressionRepository: Send + Sync {
    /// Stored progression, or the initial state if none was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    async fn load_progression(&self) -> Result<ProgressionState, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the state cannot be stored.
    async fn save_progression(&self, state: &ProgressionState) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failure.
    async fn active_session(
        &self,
        session_type: SessionType,
    ) -> Result<Option<SessionRecord>, StorageError>;

    /// Insert `session` unless an active session of its type already exists.
    ///
    /// Returns whichever session is active afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn insert_session(&self, session: &SessionRecord)
    -> Result<SessionRecord, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist.
    async fn update_session(&self, session: &SessionRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    problems: Arc<Mutex<HashMap<ProblemId, Problem>>>,
    attempts: Arc<Mutex<Vec<RecordedAttempt>>>,
    graph: Arc<Mutex<TagGraph>>,
    progression: Arc<Mutex<Option<ProgressionState>>>,
    sessions: Arc<Mutex<HashMap<SessionId, SessionRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn sorted_by_id(mut problems: Vec<Problem>) -> Vec<Problem> {
    problems.sort_by_key(|p| p.id);
    problems
}

#[async_trait]
impl ProblemRepository for InMemoryRepository {
    async fn upsert_problem(&self, problem: &Problem) -> Result<(), StorageError> {
        let mut guard = self.problems.lock().map_err(poisoned)?;
        guard.insert(problem.id, problem.clone());
        Ok(())
    }

    async fn get_problem(&self, id: ProblemId) -> Result<Problem, StorageError> {
        let guard = self.problems.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_problems(&self) -> Result<Vec<Problem>, StorageError> {
        let guard = self.problems.lock().map_err(poisoned)?;
        Ok(sorted_by_id(guard.values().cloned().collect()))
    }

    async fn due_problems(
        &self,
        now: DateTime<Utc>,
        cap: Difficulty,
    ) -> Result<Vec<Problem>, StorageError> {
        let guard = self.problems.lock().map_err(poisoned)?;
        Ok(sorted_by_id(
            guard
                .values()
                .filter(|p| p.is_due(now) && cap.admits(p.difficulty))
                .cloned()
                .collect(),
        ))
    }

    async fn new_problems(&self, cap: Difficulty) -> Result<Vec<Problem>, StorageError> {
        let guard = self.problems.lock().map_err(poisoned)?;
        Ok(sorted_by_id(
            guard
                .values()
                .filter(|p| p.is_new() && cap.admits(p.difficulty))
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, attempt: &RecordedAttempt) -> Result<i64, StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        guard.push(attempt.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Conflict)
    }

    async fn attempts_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<RecordedAttempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|a| a.problem_id == problem_id)
            .cloned()
            .collect())
    }

    async fn list_attempts(&self) -> Result<Vec<RecordedAttempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecordedAttempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|a| a.attempted_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TagRelationshipRepository for InMemoryRepository {
    async fn has_relationships(&self) -> Result<bool, StorageError> {
        let guard = self.graph.lock().map_err(poisoned)?;
        Ok(!guard.is_empty())
    }

    async fn replace_relationships(&self, graph: &TagGraph) -> Result<(), StorageError> {
        let mut guard = self.graph.lock().map_err(poisoned)?;
        *guard = graph.clone();
        Ok(())
    }

    async fn load_relationships(&self) -> Result<TagGraph, StorageError> {
        let guard = self.graph.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl ProgressionRepository for InMemoryRepository {
    async fn load_progression(&self) -> Result<ProgressionState, StorageError> {
        let guard = self.progression.lock().map_err(poisoned)?;
        Ok(guard.clone().unwrap_or_default())
    }

    async fn save_progression(&self, state: &ProgressionState) -> Result<(), StorageError> {
        let mut guard = self.progression.lock().map_err(poisoned)?;
        *guard = Some(state.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn active_session(
        &self,
        session_type: SessionType,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .find(|s| s.session_type == session_type && s.is_active())
            .cloned())
    }

    async fn insert_session(
        &self,
        session: &SessionRecord,
    ) -> Result<SessionRecord, StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        if session.is_active() {
            if let Some(existing) = guard
                .values()
                .find(|s| s.session_type == session.session_type && s.is_active())
            {
                return Ok(existing.clone());
            }
        }
        if guard.contains_key(&session.id) {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn update_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(poisoned)?;
        match guard.get_mut(&session.id) {
            Some(slot) => {
                *slot = session.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub problems: Arc<dyn ProblemRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub tags: Arc<dyn TagRelationshipRepository>,
    pub progression: Arc<dyn ProgressionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one repository value for every concern.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: ProblemRepository
            + AttemptRepository
            + TagRelationshipRepository
            + ProgressionRepository
            + SessionRepository
            + Clone
            + 'static,
    {
        Self {
            problems: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            tags: Arc::new(repo.clone()),
            progression: Arc::new(repo.clone()),
            sessions: Arc::new(repo),
        }
    }
}

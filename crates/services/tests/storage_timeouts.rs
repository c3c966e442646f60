use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use practice_core::config::EngineConfig;
use practice_core::model::{Difficulty, Problem, ProblemId, RecordedAttempt, TagName};
use practice_core::progression::ProgressionState;
use practice_core::time::fixed_now;
use services::{Clock, Engine, Request, Response};
use storage::repository::{
    AttemptRepository, InMemoryRepository, ProblemRepository, ProgressionRepository, Storage,
    StorageError,
};

const DELAY: Duration = Duration::from_millis(300);

/// Delegates to an in-memory repository after sleeping past the engine deadline.
#[derive(Clone)]
struct SlowRepository {
    inner: InMemoryRepository,
}

#[async_trait]
impl ProgressionRepository for SlowRepository {
    async fn load_progression(&self) -> Result<ProgressionState, StorageError> {
        tokio::time::sleep(DELAY).await;
        self.inner.load_progression().await
    }

    async fn save_progression(&self, state: &ProgressionState) -> Result<(), StorageError> {
        tokio::time::sleep(DELAY).await;
        self.inner.save_progression(state).await
    }
}

#[async_trait]
impl AttemptRepository for SlowRepository {
    async fn append_attempt(&self, attempt: &RecordedAttempt) -> Result<i64, StorageError> {
        self.inner.append_attempt(attempt).await
    }

    async fn attempts_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<RecordedAttempt>, StorageError> {
        tokio::time::sleep(DELAY).await;
        self.inner.attempts_for_problem(problem_id).await
    }

    async fn list_attempts(&self) -> Result<Vec<RecordedAttempt>, StorageError> {
        self.inner.list_attempts().await
    }

    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecordedAttempt>, StorageError> {
        self.inner.attempts_since(since).await
    }
}

async fn slow_engine() -> (InMemoryRepository, Engine) {
    let inner = InMemoryRepository::new();
    for id in 1..=6_u64 {
        let difficulty = if id % 2 == 0 {
            Difficulty::Medium
        } else {
            Difficulty::Easy
        };
        let problem = Problem::new(
            ProblemId::new(id),
            format!("P{id}"),
            [TagName::new("array").unwrap()],
            difficulty,
        );
        inner.upsert_problem(&problem).await.unwrap();
    }

    let slow = SlowRepository {
        inner: inner.clone(),
    };
    let mut storage = Storage::from_repository(inner.clone());
    storage.progression = Arc::new(slow.clone());
    storage.attempts = Arc::new(slow);

    let config = EngineConfig {
        storage_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let engine = Engine::new(&storage, &config, Clock::fixed(fixed_now())).unwrap();
    (inner, engine)
}

#[tokio::test]
async fn settings_fall_back_when_progression_times_out() {
    let (_inner, engine) = slow_engine().await;

    let response = engine
        .handle(Request::BuildAdaptiveSessionSettings {
            session_type: Default::default(),
            state: None,
        })
        .await;
    let Response::SessionSettings { settings } = response else {
        panic!("unexpected response");
    };
    assert!(!settings.is_onboarding);
    assert_eq!(settings.current_difficulty_cap, Difficulty::Easy);
    assert_eq!(settings.session_length, 6);
    assert!(settings.number_of_new_problems <= settings.session_length);

    let response = engine
        .handle(Request::GetOrCreateSession {
            session_type: Default::default(),
        })
        .await;
    let Response::Session { session } = response else {
        panic!("unexpected response");
    };
    assert!(!session.problem_ids.is_empty());
}

#[tokio::test]
async fn progression_timeout_leaves_state_unchanged() {
    let (inner, engine) = slow_engine().await;

    let response = engine
        .handle(Request::EvaluateDifficultyProgression {
            session_accuracy: 0.95,
            state: None,
        })
        .await;
    let Response::Error { message } = response else {
        panic!("unexpected response");
    };
    assert!(message.contains("timed out"));
    assert_eq!(inner.load_progression().await.unwrap(), ProgressionState::default());
}

#[tokio::test]
async fn evaluate_attempts_surfaces_timeout() {
    let (inner, engine) = slow_engine().await;
    let id = ProblemId::new(1);
    inner
        .append_attempt(&RecordedAttempt::new(id, fixed_now(), true, 3.0, 300))
        .await
        .unwrap();
    let before = inner.get_problem(id).await.unwrap();

    let err = engine
        .scheduler()
        .evaluate_attempts(id)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(inner.get_problem(id).await.unwrap(), before);
}

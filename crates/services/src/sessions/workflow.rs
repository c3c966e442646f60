use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use practice_core::Clock;
use practice_core::model::{
    PerformanceSummary, RecordedAttempt, SessionId, SessionRecord, valid_chronological,
};
use practice_core::progression::ProgressionUpdate;
use practice_core::scheduler::Evaluation;
use storage::repository::{AttemptRepository, SessionRepository};

use crate::error::ServiceError;
use crate::progression_service::ProgressionService;
use crate::scheduler_service::SchedulerService;
use crate::timeout::StorageDeadline;

/// Result of recording a single attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub attempt_id: i64,
    pub evaluation: Evaluation,
}

/// Result of completing a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCompletion {
    pub session: SessionRecord,
    /// Absent when nothing was attempted, so an abandoned session does not count.
    pub progression: Option<ProgressionUpdate>,
}

/// Records attempts and completes sessions.
pub struct SessionWorkflow {
    clock: Clock,
    attempts: Arc<dyn AttemptRepository>,
    sessions: Arc<dyn SessionRepository>,
    scheduler: Arc<SchedulerService>,
    progression: Arc<ProgressionService>,
    deadline: StorageDeadline,
}

impl SessionWorkflow {
    #[must_use]
    pub(crate) fn new(
        clock: Clock,
        attempts: Arc<dyn AttemptRepository>,
        sessions: Arc<dyn SessionRepository>,
        scheduler: Arc<SchedulerService>,
        progression: Arc<ProgressionService>,
        deadline: StorageDeadline,
    ) -> Self {
        Self {
            clock,
            attempts,
            sessions,
            scheduler,
            progression,
            deadline,
        }
    }

    /// Append an attempt, mark its session active and re-evaluate the problem.
    ///
    /// The attempt is stored as given; malformed fields are skipped later by
    /// every aggregation rather than rejected here.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if storage fails or times out, or if the problem
    /// cannot be evaluated.
    pub async fn record_attempt(
        &self,
        attempt: &RecordedAttempt,
    ) -> Result<AttemptOutcome, ServiceError> {
        let attempt_id = self
            .deadline
            .run("append_attempt", self.attempts.append_attempt(attempt))
            .await?;

        if let Some(session_id) = attempt.session_id {
            self.touch_session(session_id).await?;
        }

        let evaluation = self.scheduler.evaluate_attempts(attempt.problem_id).await?;
        debug!(
            attempt_id,
            problem_id = %attempt.problem_id,
            success = ?attempt.success,
            "recorded attempt"
        );
        Ok(AttemptOutcome {
            attempt_id,
            evaluation,
        })
    }

    async fn touch_session(&self, id: SessionId) -> Result<(), ServiceError> {
        let mut session = self
            .deadline
            .run("get_session", self.sessions.get_session(id))
            .await?;
        if session.is_active() {
            session.touch(self.clock.now());
            self.deadline
                .run("update_session", self.sessions.update_session(&session))
                .await?;
        }
        Ok(())
    }

    /// Score a session from the attempts made on its problems since it was
    /// created, store the summary and advance difficulty progression.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Session` if the session is already completed or
    /// discarded, or `ServiceError` for storage failures and timeouts.
    pub async fn complete_session(&self, id: SessionId) -> Result<SessionCompletion, ServiceError> {
        let mut session = self
            .deadline
            .run("get_session", self.sessions.get_session(id))
            .await?;
        let recorded = self
            .deadline
            .run("attempts_since", self.attempts.attempts_since(session.created_at))
            .await?;

        let scored: Vec<RecordedAttempt> = recorded
            .into_iter()
            .filter(|a| session.contains(a.problem_id))
            .filter(|a| a.session_id.is_none_or(|sid| sid == id))
            .collect();
        let performance = PerformanceSummary::from_attempts(&valid_chronological(&scored))?;
        let accuracy = performance.accuracy();
        let attempted = performance.attempted();

        session.complete(performance, self.clock.now())?;
        self.deadline
            .run("update_session", self.sessions.update_session(&session))
            .await?;

        let progression = if attempted == 0 {
            None
        } else {
            Some(self.progression.record_session(accuracy).await?.0)
        };

        info!(
            session_id = %id,
            attempted,
            accuracy,
            cap = ?progression.map(|p| p.current_difficulty_cap),
            "completed session"
        );
        Ok(SessionCompletion {
            session,
            progression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use practice_core::config::SchedulerConfig;
    use practice_core::model::{
        Difficulty, Problem, ProblemId, SessionRecordError, SessionStatus, SessionType, TagName,
    };
    use practice_core::progression::ProgressionController;
    use practice_core::scheduler::LeitnerScheduler;
    use practice_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, ProblemRepository, ProgressionRepository};

    fn workflow(repo: &InMemoryRepository, clock: Clock) -> SessionWorkflow {
        let deadline = StorageDeadline::new(std::time::Duration::from_secs(1));
        let scheduler = Arc::new(SchedulerService::new(
            LeitnerScheduler::new(SchedulerConfig::default()).unwrap(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            deadline,
        ));
        let progression = Arc::new(ProgressionService::new(
            ProgressionController::default(),
            Arc::new(repo.clone()),
            deadline,
        ));
        SessionWorkflow::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            scheduler,
            progression,
            deadline,
        )
    }

    async fn seed_session(repo: &InMemoryRepository, ids: &[u64]) -> SessionRecord {
        for id in ids {
            let problem = Problem::new(
                ProblemId::new(*id),
                format!("P{id}"),
                [TagName::new("array").unwrap()],
                Difficulty::Easy,
            );
            repo.upsert_problem(&problem).await.unwrap();
        }
        let session = SessionRecord::new(
            SessionId::generate(),
            SessionType::Standard,
            ids.iter().copied().map(ProblemId::new).collect(),
            fixed_now(),
        );
        repo.insert_session(&session).await.unwrap()
    }

    #[tokio::test]
    async fn recording_touches_session_and_evaluates() {
        let repo = InMemoryRepository::new();
        let session = seed_session(&repo, &[1]).await;
        let later = fixed_now() + Duration::minutes(20);
        let svc = workflow(&repo, Clock::fixed(later));

        let attempt =
            RecordedAttempt::new(ProblemId::new(1), later, true, 4.0, 600).in_session(session.id);
        let outcome = svc.record_attempt(&attempt).await.unwrap();
        assert_eq!(outcome.evaluation.total_attempts, 1);
        assert_eq!(outcome.evaluation.box_level.value(), 2);

        let stored = repo.get_session(session.id).await.unwrap();
        assert_eq!(stored.last_activity_at, later);
    }

    #[tokio::test]
    async fn completion_scores_session_problems_only() {
        let repo = InMemoryRepository::new();
        let session = seed_session(&repo, &[1, 2]).await;
        let later = fixed_now() + Duration::hours(1);
        let svc = workflow(&repo, Clock::fixed(later));

        for (id, success) in [(1, true), (2, false), (3, true)] {
            let attempt = RecordedAttempt::new(
                ProblemId::new(id),
                fixed_now() + Duration::minutes(5),
                success,
                5.0,
                300,
            );
            repo.append_attempt(&attempt).await.unwrap();
        }
        let stale =
            RecordedAttempt::new(ProblemId::new(1), fixed_now() - Duration::days(1), true, 5.0, 300);
        repo.append_attempt(&stale).await.unwrap();

        let completion = svc.complete_session(session.id).await.unwrap();
        let performance = completion.session.performance.clone().unwrap();
        assert_eq!(performance.attempted(), 2);
        assert_eq!(performance.solved(), 1);
        assert_eq!(completion.session.status, SessionStatus::Completed);
        assert_eq!(completion.progression.unwrap().num_sessions_completed, 1);
        assert_eq!(repo.load_progression().await.unwrap().num_sessions_completed, 1);

        let err = svc.complete_session(session.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Session(SessionRecordError::AlreadyCompleted)
        ));
    }

    #[tokio::test]
    async fn empty_session_does_not_count_toward_progression() {
        let repo = InMemoryRepository::new();
        let session = seed_session(&repo, &[1]).await;
        let completion = workflow(&repo, Clock::fixed(fixed_now()))
            .complete_session(session.id)
            .await
            .unwrap();
        assert!(completion.progression.is_none());
        assert_eq!(repo.load_progression().await.unwrap().num_sessions_completed, 0);
    }
}

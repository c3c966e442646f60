use std::sync::Arc;

use tracing::debug;

use practice_core::model::ProblemId;
use practice_core::scheduler::{Evaluation, LeitnerScheduler};
use storage::repository::{AttemptRepository, ProblemRepository};

use crate::error::ServiceError;
use crate::timeout::StorageDeadline;

/// Applies attempt history to a problem's box level and review date.
pub struct SchedulerService {
    scheduler: LeitnerScheduler,
    problems: Arc<dyn ProblemRepository>,
    attempts: Arc<dyn AttemptRepository>,
    deadline: StorageDeadline,
}

impl SchedulerService {
    #[must_use]
    pub(crate) fn new(
        scheduler: LeitnerScheduler,
        problems: Arc<dyn ProblemRepository>,
        attempts: Arc<dyn AttemptRepository>,
        deadline: StorageDeadline,
    ) -> Self {
        Self {
            scheduler,
            problems,
            attempts,
            deadline,
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &LeitnerScheduler {
        &self.scheduler
    }

    /// Re-evaluate a problem from its full attempt history and persist the result.
    ///
    /// A problem with no valid attempts is left as it is and reports zero attempts.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Timeout` if a storage call exceeds its deadline,
    /// `ServiceError::Storage` for repository failures and
    /// `ServiceError::Scheduler` if the stability model rejects the history.
    /// Nothing is persisted on error.
    pub async fn evaluate_attempts(&self, id: ProblemId) -> Result<Evaluation, ServiceError> {
        let problem = self
            .deadline
            .run("get_problem", self.problems.get_problem(id))
            .await?;
        let history = self
            .deadline
            .run("attempts_for_problem", self.attempts.attempts_for_problem(id))
            .await?;

        let (updated, evaluation) = self.scheduler.evaluate(&problem, &history)?;
        if updated != problem {
            self.deadline
                .run("upsert_problem", self.problems.upsert_problem(&updated))
                .await?;
        }

        debug!(
            problem_id = %id,
            box_level = evaluation.box_level.value(),
            attempts = evaluation.total_attempts,
            next_review_at = ?evaluation.next_review_at,
            "evaluated attempts"
        );
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use practice_core::config::SchedulerConfig;
    use practice_core::model::{BoxLevel, Difficulty, Problem, RecordedAttempt, TagName};
    use practice_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    fn service(repo: &InMemoryRepository) -> SchedulerService {
        SchedulerService::new(
            LeitnerScheduler::new(SchedulerConfig::default()).unwrap(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            StorageDeadline::new(std::time::Duration::from_secs(1)),
        )
    }

    async fn seed_problem(repo: &InMemoryRepository, id: u64) -> ProblemId {
        let problem = Problem::new(
            ProblemId::new(id),
            format!("P{id}"),
            [TagName::new("array").unwrap()],
            Difficulty::Easy,
        );
        repo.upsert_problem(&problem).await.unwrap();
        problem.id
    }

    #[tokio::test]
    async fn successes_promote_and_persist() {
        let repo = InMemoryRepository::new();
        let id = seed_problem(&repo, 1).await;
        for day in 0..2 {
            let at = fixed_now() + Duration::days(day);
            repo.append_attempt(&RecordedAttempt::new(id, at, true, 3.0, 300))
                .await
                .unwrap();
        }

        let evaluation = service(&repo).evaluate_attempts(id).await.unwrap();
        assert_eq!(evaluation.box_level, BoxLevel::new(3).unwrap());
        assert_eq!(evaluation.total_attempts, 2);

        let stored = repo.get_problem(id).await.unwrap();
        assert_eq!(stored.box_level, evaluation.box_level);
        assert_eq!(stored.next_review_at, evaluation.next_review_at);
        assert!(stored.next_review_at.unwrap() > fixed_now() + Duration::days(1));
    }

    #[tokio::test]
    async fn repeated_evaluation_is_idempotent() {
        let repo = InMemoryRepository::new();
        let id = seed_problem(&repo, 1).await;
        repo.append_attempt(&RecordedAttempt::new(id, fixed_now(), true, 5.0, 600))
            .await
            .unwrap();

        let svc = service(&repo);
        let first = svc.evaluate_attempts(id).await.unwrap();
        let second = svc.evaluate_attempts(id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn no_history_leaves_problem_unchanged() {
        let repo = InMemoryRepository::new();
        let id = seed_problem(&repo, 1).await;
        let before = repo.get_problem(id).await.unwrap();

        let evaluation = service(&repo).evaluate_attempts(id).await.unwrap();
        assert_eq!(evaluation.total_attempts, 0);
        assert_eq!(evaluation.box_level, before.box_level);
        assert_eq!(evaluation.next_review_at, before.next_review_at);
        assert_eq!(repo.get_problem(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_problem_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = service(&repo)
            .evaluate_attempts(ProblemId::new(42))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(StorageError::NotFound)));
    }
}

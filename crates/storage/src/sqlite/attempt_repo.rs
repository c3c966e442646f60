use chrono::{DateTime, Utc};
use practice_core::model::{ProblemId, RecordedAttempt};

use super::SqliteRepository;
use super::mapping::{conn, format_ts, map_attempt_row, problem_id_to_i64};
use crate::repository::{AttemptRepository, StorageError};

const ATTEMPT_COLUMNS: &str =
    "problem_id, session_id, attempted_at, success, perceived_difficulty, time_spent_secs";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(&self, attempt: &RecordedAttempt) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO attempts (
                    problem_id, session_id, attempted_at, success,
                    perceived_difficulty, time_spent_secs
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(problem_id_to_i64(attempt.problem_id)?)
        .bind(attempt.session_id.map(|id| id.to_string()))
        .bind(attempt.attempted_at.map(format_ts))
        .bind(attempt.success)
        .bind(attempt.perceived_difficulty)
        .bind(attempt.time_spent_secs.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn attempts_for_problem(
        &self,
        problem_id: ProblemId,
    ) -> Result<Vec<RecordedAttempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE problem_id = ?1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(problem_id_to_i64(problem_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_attempt_row).collect()
    }

    async fn list_attempts(&self) -> Result<Vec<RecordedAttempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_attempt_row).collect()
    }

    async fn attempts_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecordedAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE attempted_at >= ?1 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(format_ts(since))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        // Text that sorts after `since` but does not parse decodes with no date.
        Ok(rows
            .iter()
            .map(map_attempt_row)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|a| a.attempted_at.is_some())
            .collect())
    }
}

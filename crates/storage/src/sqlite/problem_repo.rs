use std::collections::HashMap;

use chrono::{DateTime, Utc};
use practice_core::model::{Difficulty, Problem, ProblemId, TagName};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{
    conn, difficulty_to_i64, format_ts, map_problem_row, problem_id_from_i64, problem_id_to_i64,
    ser,
};
use crate::repository::{ProblemRepository, StorageError};

const PROBLEM_COLUMNS: &str = r"
    id, title, difficulty, box_level, stability, consecutive_failures, cooldown,
    attempt_count, last_attempt_at, next_review_at
";

impl SqliteRepository {
    /// Tag lists for every problem, in stored order.
    async fn load_tags(&self) -> Result<HashMap<ProblemId, Vec<TagName>>, StorageError> {
        let rows = sqlx::query("SELECT problem_id, tag FROM problem_tags ORDER BY problem_id, position")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut tags: HashMap<ProblemId, Vec<TagName>> = HashMap::new();
        for row in rows {
            let id = problem_id_from_i64(row.try_get("problem_id").map_err(ser)?)?;
            let tag: String = row.try_get("tag").map_err(ser)?;
            let tag = TagName::new(tag).map_err(|e| StorageError::Domain(e.into()))?;
            tags.entry(id).or_default().push(tag);
        }
        Ok(tags)
    }

    async fn attach_tags(&self, rows: Vec<SqliteRow>) -> Result<Vec<Problem>, StorageError> {
        let mut tags = self.load_tags().await?;
        rows.iter()
            .map(|row| {
                let id = problem_id_from_i64(row.try_get("id").map_err(ser)?)?;
                map_problem_row(row, tags.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ProblemRepository for SqliteRepository {
    async fn upsert_problem(&self, problem: &Problem) -> Result<(), StorageError> {
        let id = problem_id_to_i64(problem.id)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO problems (
                id, title, difficulty, box_level, stability, consecutive_failures,
                cooldown, attempt_count, last_attempt_at, next_review_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                difficulty = excluded.difficulty,
                box_level = excluded.box_level,
                stability = excluded.stability,
                consecutive_failures = excluded.consecutive_failures,
                cooldown = excluded.cooldown,
                attempt_count = excluded.attempt_count,
                last_attempt_at = excluded.last_attempt_at,
                next_review_at = excluded.next_review_at
            ",
        )
        .bind(id)
        .bind(problem.title.as_str())
        .bind(difficulty_to_i64(problem.difficulty))
        .bind(i64::from(problem.box_level.value()))
        .bind(problem.stability)
        .bind(i64::from(problem.consecutive_failures))
        .bind(problem.cooldown)
        .bind(i64::from(problem.attempt_count))
        .bind(problem.last_attempt_at.map(format_ts))
        .bind(problem.next_review_at.map(format_ts))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM problem_tags WHERE problem_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, tag) in problem.tags.iter().enumerate() {
            sqlx::query("INSERT INTO problem_tags (problem_id, position, tag) VALUES (?1, ?2, ?3)")
                .bind(id)
                .bind(i64::try_from(position).map_err(ser)?)
                .bind(tag.as_str())
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_problem(&self, id: ProblemId) -> Result<Problem, StorageError> {
        let sql = format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ?1");
        let rows = sqlx::query(&sql)
            .bind(problem_id_to_i64(id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        self.attach_tags(rows)
            .await?
            .pop()
            .ok_or(StorageError::NotFound)
    }

    async fn list_problems(&self) -> Result<Vec<Problem>, StorageError> {
        let sql = format!("SELECT {PROBLEM_COLUMNS} FROM problems ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        self.attach_tags(rows).await
    }

    async fn due_problems(
        &self,
        now: DateTime<Utc>,
        cap: Difficulty,
    ) -> Result<Vec<Problem>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROBLEM_COLUMNS} FROM problems
            WHERE (attempt_count > 0 OR last_attempt_at IS NOT NULL)
              AND next_review_at IS NOT NULL
              AND next_review_at <= ?1
              AND difficulty <= ?2
            ORDER BY id
            "
        );
        let rows = sqlx::query(&sql)
            .bind(format_ts(now))
            .bind(difficulty_to_i64(cap))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        self.attach_tags(rows).await
    }

    async fn new_problems(&self, cap: Difficulty) -> Result<Vec<Problem>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROBLEM_COLUMNS} FROM problems
            WHERE attempt_count = 0 AND last_attempt_at IS NULL AND difficulty <= ?1
            ORDER BY id
            "
        );
        let rows = sqlx::query(&sql)
            .bind(difficulty_to_i64(cap))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        self.attach_tags(rows).await
    }
}

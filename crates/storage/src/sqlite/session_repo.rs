use practice_core::model::{SessionId, SessionRecord, SessionType};

use super::SqliteRepository;
use super::mapping::{conn, format_ts, map_session_row, ser};
use crate::repository::{SessionRepository, StorageError};

const SESSION_COLUMNS: &str = r"
    id, session_type, status, created_at, last_activity_at, problem_ids,
    completed_at, attempted, solved
";

fn performance_counts(session: &SessionRecord) -> (Option<i64>, Option<i64>) {
    session.performance.as_ref().map_or((None, None), |p| {
        (Some(i64::from(p.attempted())), Some(i64::from(p.solved())))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqliteRepository {
    async fn fetch_active(
        &self,
        session_type: SessionType,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_type = ?1 AND status = 'active'"
        );
        let row = sqlx::query(&sql)
            .bind(session_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_session_row).transpose()
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn active_session(
        &self,
        session_type: SessionType,
    ) -> Result<Option<SessionRecord>, StorageError> {
        self.fetch_active(session_type).await
    }

    async fn insert_session(
        &self,
        session: &SessionRecord,
    ) -> Result<SessionRecord, StorageError> {
        let problem_ids = serde_json::to_string(&session.problem_ids).map_err(ser)?;
        let (attempted, solved) = performance_counts(session);

        let inserted = sqlx::query(
            r"
                INSERT INTO sessions (
                    id, session_type, status, created_at, last_activity_at, problem_ids,
                    completed_at, attempted, solved
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(session.id.to_string())
        .bind(session.session_type.as_str())
        .bind(session.status.as_str())
        .bind(format_ts(session.created_at))
        .bind(format_ts(session.last_activity_at))
        .bind(problem_ids)
        .bind(session.completed_at.map(format_ts))
        .bind(attempted)
        .bind(solved)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(session.clone()),
            // The partial unique index admits one active session per type.
            Err(err) if session.is_active() && is_unique_violation(&err) => self
                .fetch_active(session.session_type)
                .await?
                .ok_or(StorageError::Conflict),
            Err(err) if is_unique_violation(&err) => Err(StorageError::Conflict),
            Err(err) => Err(conn(err)),
        }
    }

    async fn update_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let problem_ids = serde_json::to_string(&session.problem_ids).map_err(ser)?;
        let (attempted, solved) = performance_counts(session);

        let res = sqlx::query(
            r"
                UPDATE sessions SET
                    status = ?2,
                    last_activity_at = ?3,
                    problem_ids = ?4,
                    completed_at = ?5,
                    attempted = ?6,
                    solved = ?7
                WHERE id = ?1
            ",
        )
        .bind(session.id.to_string())
        .bind(session.status.as_str())
        .bind(format_ts(session.last_activity_at))
        .bind(problem_ids)
        .bind(session.completed_at.map(format_ts))
        .bind(attempted)
        .bind(solved)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StorageError::Conflict
            } else {
                conn(err)
            }
        })?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref()
            .map(map_session_row)
            .transpose()?
            .ok_or(StorageError::NotFound)
    }
}

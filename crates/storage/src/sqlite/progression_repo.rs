use practice_core::progression::ProgressionState;

use super::SqliteRepository;
use super::mapping::{conn, difficulty_to_i64, map_progression_row, ser};
use crate::repository::{ProgressionRepository, StorageError};

#[async_trait::async_trait]
impl ProgressionRepository for SqliteRepository {
    async fn load_progression(&self) -> Result<ProgressionState, StorageError> {
        let row = sqlx::query(
            r"
                SELECT current_difficulty_cap, consecutive_high, consecutive_low,
                       sessions_completed, recent_accuracies
                FROM progression_state
                WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref()
            .map_or_else(|| Ok(ProgressionState::default()), map_progression_row)
    }

    async fn save_progression(&self, state: &ProgressionState) -> Result<(), StorageError> {
        let recent = serde_json::to_string(&state.recent_accuracies).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO progression_state (
                    id, current_difficulty_cap, consecutive_high, consecutive_low,
                    sessions_completed, recent_accuracies
                )
                VALUES (1, ?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    current_difficulty_cap = excluded.current_difficulty_cap,
                    consecutive_high = excluded.consecutive_high,
                    consecutive_low = excluded.consecutive_low,
                    sessions_completed = excluded.sessions_completed,
                    recent_accuracies = excluded.recent_accuracies
            ",
        )
        .bind(difficulty_to_i64(state.current_difficulty_cap))
        .bind(i64::from(state.consecutive_high_accuracy_sessions))
        .bind(i64::from(state.consecutive_low_accuracy_sessions))
        .bind(i64::from(state.num_sessions_completed))
        .bind(recent)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

use std::sync::Arc;

use tracing::info;

use practice_core::progression::{ProgressionController, ProgressionState, ProgressionUpdate};
use storage::repository::ProgressionRepository;

use crate::error::ServiceError;
use crate::timeout::StorageDeadline;

/// Loads, advances and stores the learner's difficulty progression.
pub struct ProgressionService {
    controller: ProgressionController,
    progression: Arc<dyn ProgressionRepository>,
    deadline: StorageDeadline,
}

impl ProgressionService {
    #[must_use]
    pub(crate) fn new(
        controller: ProgressionController,
        progression: Arc<dyn ProgressionRepository>,
        deadline: StorageDeadline,
    ) -> Self {
        Self {
            controller,
            progression,
            deadline,
        }
    }

    #[must_use]
    pub fn controller(&self) -> &ProgressionController {
        &self.controller
    }

    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn load(&self) -> Result<ProgressionState, ServiceError> {
        self.deadline
            .run("load_progression", self.progression.load_progression())
            .await
    }

    /// Fold a scored session into the stored state and persist it.
    ///
    /// If either storage call fails or times out the stored state is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn record_session(
        &self,
        accuracy: f64,
    ) -> Result<(ProgressionUpdate, ProgressionState), ServiceError> {
        let mut state = self.load().await?;
        let before = state.current_difficulty_cap;
        let update = self.controller.evaluate(accuracy, &mut state);
        self.deadline
            .run("save_progression", self.progression.save_progression(&state))
            .await?;

        if update.current_difficulty_cap != before {
            info!(
                from = before.as_str(),
                to = update.current_difficulty_cap.as_str(),
                sessions = update.num_sessions_completed,
                "difficulty cap changed"
            );
        }
        Ok((update, state))
    }
}

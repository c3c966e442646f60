use std::sync::Arc;

use tracing::{debug, warn};

use practice_core::Clock;
use practice_core::config::EngineConfig;
use practice_core::progression::ProgressionController;
use practice_core::scheduler::LeitnerScheduler;
use storage::repository::Storage;

use crate::error::{EngineInitError, ServiceError};
use crate::messages::{Request, Response};
use crate::progression_service::ProgressionService;
use crate::scheduler_service::SchedulerService;
use crate::sessions::{SessionAssembler, SessionWorkflow};
use crate::tag_graph_service::TagGraphService;
use crate::timeout::StorageDeadline;

/// Assembles the engine services over one storage backend.
#[derive(Clone)]
pub struct Engine {
    scheduler: Arc<SchedulerService>,
    tags: Arc<TagGraphService>,
    progression: Arc<ProgressionService>,
    assembler: Arc<SessionAssembler>,
    workflow: Arc<SessionWorkflow>,
}

impl Engine {
    /// Wire services over an existing storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if the configuration is invalid or the
    /// stability model cannot be built.
    pub fn new(
        storage: &Storage,
        config: &EngineConfig,
        clock: Clock,
    ) -> Result<Self, EngineInitError> {
        config.validate()?;
        let deadline = StorageDeadline::new(config.storage_timeout());

        let scheduler = Arc::new(SchedulerService::new(
            LeitnerScheduler::new(config.scheduler.clone())?,
            Arc::clone(&storage.problems),
            Arc::clone(&storage.attempts),
            deadline,
        ));
        let tags = Arc::new(TagGraphService::new(
            Arc::clone(&storage.problems),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.tags),
            config.mastery.clone(),
            deadline,
        ));
        let progression = Arc::new(ProgressionService::new(
            ProgressionController::new(config.session.clone(), config.progression.clone()),
            Arc::clone(&storage.progression),
            deadline,
        ));
        let assembler = Arc::new(
            SessionAssembler::new(
                clock,
                Arc::clone(&storage.problems),
                Arc::clone(&storage.sessions),
                Arc::clone(&progression),
                Arc::clone(&tags),
                config.focus_areas.clone(),
                config.stale_after(),
                deadline,
            )
            .with_shuffle_new(config.session.shuffle_new),
        );
        let workflow = Arc::new(SessionWorkflow::new(
            clock,
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.sessions),
            Arc::clone(&scheduler),
            Arc::clone(&progression),
            deadline,
        ));

        Ok(Self {
            scheduler,
            tags,
            progression,
            assembler,
            workflow,
        })
    }

    /// Build an engine backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineInitError` if storage initialization or wiring fails.
    pub async fn new_sqlite(
        db_url: &str,
        config: &EngineConfig,
        clock: Clock,
    ) -> Result<Self, EngineInitError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::new(&storage, config, clock)
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<SchedulerService> {
        Arc::clone(&self.scheduler)
    }

    #[must_use]
    pub fn tags(&self) -> Arc<TagGraphService> {
        Arc::clone(&self.tags)
    }

    #[must_use]
    pub fn progression(&self) -> Arc<ProgressionService> {
        Arc::clone(&self.progression)
    }

    #[must_use]
    pub fn assembler(&self) -> Arc<SessionAssembler> {
        Arc::clone(&self.assembler)
    }

    #[must_use]
    pub fn workflow(&self) -> Arc<SessionWorkflow> {
        Arc::clone(&self.workflow)
    }

    /// Serve one request; failures become `Response::Error`.
    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "request failed");
                Response::error(err.to_string())
            }
        }
    }

    /// Serve one JSON-encoded request and encode the response.
    pub async fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                debug!(error = %err, "malformed request");
                Response::error(format!("invalid request: {err}"))
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(r#"{{"type":"error","message":"failed to encode response: {err}"}}"#)
        })
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ServiceError> {
        let response = match request {
            Request::GetOrCreateSession { session_type } => Response::Session {
                session: self.assembler.get_or_create(session_type).await?,
            },
            Request::RefreshSession { session_type } => Response::Session {
                session: self.assembler.refresh(session_type).await?,
            },
            Request::EvaluateDifficultyProgression {
                session_accuracy,
                state: Some(mut state),
            } => {
                let update = self
                    .progression
                    .controller()
                    .evaluate(session_accuracy, &mut state);
                Response::Progression { update, state }
            }
            Request::EvaluateDifficultyProgression {
                session_accuracy,
                state: None,
            } => {
                let (update, state) = self.progression.record_session(session_accuracy).await?;
                Response::Progression { update, state }
            }
            Request::BuildAdaptiveSessionSettings {
                session_type,
                state,
            } => Response::SessionSettings {
                settings: self.assembler.adaptive_settings(session_type, state).await,
            },
            Request::GetTagRelationships => Response::TagRelationships {
                relationships: self.tags.relationships().await?,
            },
            Request::GetHighlyRelatedTags {
                mastered_tags,
                missing_tags,
                limit,
            } => Response::RelatedTags {
                tags: self
                    .tags
                    .highly_related(&mastered_tags, &missing_tags, limit)
                    .await?,
            },
            Request::GetNextFiveTagsFromNextTier { mastery_data } => {
                let mastered = match mastery_data {
                    Some(data) => self.tags.mastered_from(&data),
                    None => self.tags.mastered_tags().await?,
                };
                Response::NextTier(self.tags.next_tier_suggestion(&mastered).await?)
            }
            Request::RebuildTagGraph { force } => {
                Response::GraphRebuilt(self.tags.rebuild(force).await?)
            }
            Request::RecordAttempt { attempt } => {
                Response::AttemptRecorded(self.workflow.record_attempt(&attempt).await?)
            }
            Request::CompleteSession { session_id } => {
                Response::SessionCompleted(self.workflow.complete_session(session_id).await?)
            }
            Request::EvaluateAttempts { problem_id } => {
                Response::Evaluation(self.scheduler.evaluate_attempts(problem_id).await?)
            }
        };
        Ok(response)
    }
}

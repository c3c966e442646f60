use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use practice_core::Clock;
use practice_core::assembly::{AssembledSession, AssemblyRequest};
use practice_core::model::{SessionId, SessionRecord, SessionType, TagName};
use practice_core::progression::{ProgressionState, SessionSettings};
use storage::repository::{ProblemRepository, SessionRepository};

use super::plan::SessionBuilder;
use crate::error::ServiceError;
use crate::progression_service::ProgressionService;
use crate::tag_graph_service::TagGraphService;
use crate::timeout::StorageDeadline;

/// Creates, reuses and replaces the active session of each type.
pub struct SessionAssembler {
    clock: Clock,
    problems: Arc<dyn ProblemRepository>,
    sessions: Arc<dyn SessionRepository>,
    progression: Arc<ProgressionService>,
    tags: Arc<TagGraphService>,
    focus_areas: Vec<TagName>,
    stale_after: Duration,
    deadline: StorageDeadline,
    shuffle_new: bool,
    create_lock: Mutex<()>,
}

impl SessionAssembler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        clock: Clock,
        problems: Arc<dyn ProblemRepository>,
        sessions: Arc<dyn SessionRepository>,
        progression: Arc<ProgressionService>,
        tags: Arc<TagGraphService>,
        focus_areas: Vec<TagName>,
        stale_after: Duration,
        deadline: StorageDeadline,
    ) -> Self {
        Self {
            clock,
            problems,
            sessions,
            progression,
            tags,
            focus_areas,
            stale_after,
            deadline,
            shuffle_new: false,
            create_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_shuffle_new(mut self, shuffle_new: bool) -> Self {
        self.shuffle_new = shuffle_new;
        self
    }

    /// Return the active session of `session_type`, creating one if needed.
    ///
    /// An active session is returned unchanged until it goes stale; a stale
    /// session is discarded and replaced.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if session storage fails or times out.
    pub async fn get_or_create(
        &self,
        session_type: SessionType,
    ) -> Result<SessionRecord, ServiceError> {
        let _guard = self.create_lock.lock().await;
        let now = self.clock.now();

        if let Some(mut active) = self
            .deadline
            .run("active_session", self.sessions.active_session(session_type))
            .await?
        {
            if !active.is_stale(now, self.stale_after) {
                debug!(session_id = %active.id, "reusing active session");
                return Ok(active);
            }
            info!(
                session_id = %active.id,
                last_activity_at = %active.last_activity_at,
                "discarding stale session"
            );
            active.discard();
            self.deadline
                .run("update_session", self.sessions.update_session(&active))
                .await?;
        }

        self.create(session_type).await
    }

    /// Discard the active session of `session_type` and assemble a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if session storage fails or times out.
    pub async fn refresh(&self, session_type: SessionType) -> Result<SessionRecord, ServiceError> {
        let _guard = self.create_lock.lock().await;

        if let Some(mut active) = self
            .deadline
            .run("active_session", self.sessions.active_session(session_type))
            .await?
        {
            info!(session_id = %active.id, "discarding session on refresh");
            active.discard();
            self.deadline
                .run("update_session", self.sessions.update_session(&active))
                .await?;
        }

        self.create(session_type).await
    }

    /// Settings for the next session, including tag eligibility.
    ///
    /// With `state` absent the stored progression is used; if it cannot be
    /// loaded in time, conservative fallback settings are returned instead.
    /// Tag eligibility that cannot be derived leaves the session unrestricted.
    pub async fn adaptive_settings(
        &self,
        session_type: SessionType,
        state: Option<ProgressionState>,
    ) -> SessionSettings {
        let controller = self.progression.controller();
        let state = match state {
            Some(state) => Ok(state),
            None => self.progression.load().await,
        };
        let settings = match state {
            Ok(state) => controller.build_settings(&state, session_type),
            Err(err) => {
                warn!(error = %err, "progression unavailable, using fallback settings");
                controller.fallback_settings(session_type)
            }
        };
        if settings.is_onboarding {
            return settings;
        }

        match self.tag_eligibility().await {
            Ok((allowed, focus)) => settings.with_tags(allowed, focus),
            Err(err) => {
                warn!(error = %err, "tag eligibility unavailable, leaving tags unrestricted");
                settings
            }
        }
    }

    /// Mastered tags plus next-tier suggestions; focus is the configured
    /// focus areas, or the suggestions when none are configured.
    async fn tag_eligibility(&self) -> Result<(BTreeSet<TagName>, Vec<TagName>), ServiceError> {
        let mastered = self.tags.mastered_tags().await?;
        let suggestion = self.tags.next_tier_suggestion(&mastered).await?;

        let focus = if self.focus_areas.is_empty() {
            suggestion.suggested.clone()
        } else {
            self.focus_areas.clone()
        };
        let mut allowed = mastered;
        allowed.extend(suggestion.suggested);
        Ok((allowed, focus))
    }

    /// Load candidates and select a session's problems.
    ///
    /// A small pool yields a smaller session rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if candidate problems cannot be loaded.
    pub async fn fetch_and_assemble(
        &self,
        request: &AssemblyRequest,
    ) -> Result<AssembledSession, ServiceError> {
        let now = self.clock.now();
        let due = self
            .deadline
            .run(
                "due_problems",
                self.problems.due_problems(now, request.difficulty_cap),
            )
            .await?;
        let new = match request.session_type {
            SessionType::Review => Vec::new(),
            SessionType::Standard => {
                self.deadline
                    .run("new_problems", self.problems.new_problems(request.difficulty_cap))
                    .await?
            }
        };
        debug!(
            due = due.len(),
            new = new.len(),
            cap = request.difficulty_cap.as_str(),
            "loaded session candidates"
        );

        let assembled = SessionBuilder::new(request)
            .with_shuffle_new(self.shuffle_new)
            .build(now, due, new);
        debug!(
            reviews = assembled.reviews_selected,
            new = assembled.new_selected,
            "selected session problems"
        );
        Ok(assembled)
    }

    async fn create(&self, session_type: SessionType) -> Result<SessionRecord, ServiceError> {
        let settings = self.adaptive_settings(session_type, None).await;
        let request = AssemblyRequest::from_settings(session_type, &settings);
        let assembled = self.fetch_and_assemble(&request).await?;

        let record = SessionRecord::new(
            SessionId::generate(),
            session_type,
            assembled.problem_ids(),
            self.clock.now(),
        );
        let stored = self
            .deadline
            .run("insert_session", self.sessions.insert_session(&record))
            .await?;

        if stored.id == record.id {
            info!(
                session_id = %stored.id,
                session_type = session_type.as_str(),
                problems = stored.problem_ids.len(),
                onboarding = settings.is_onboarding,
                cap = settings.current_difficulty_cap.as_str(),
                "created session"
            );
        } else {
            debug!(session_id = %stored.id, "another caller created the session first");
        }
        Ok(stored)
    }
}

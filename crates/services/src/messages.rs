//! JSON request and response shapes understood by [`crate::Engine::handle`].
//!
//! Both enums are internally tagged on `"type"`:
//!
//! ```json
//! {"type": "getOrCreateSession", "session_type": "standard"}
//! {"type": "rebuildTagGraph", "force": true}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use practice_core::graph::TierSuggestion;
use practice_core::mastery::TagMastery;
use practice_core::model::{
    ProblemId, RecordedAttempt, SessionId, SessionRecord, SessionType, TagName,
};
use practice_core::progression::{ProgressionState, ProgressionUpdate, SessionSettings};
use practice_core::scheduler::Evaluation;

use crate::sessions::{AttemptOutcome, SessionCompletion};
use crate::tag_graph_service::RebuildOutcome;

fn default_related_limit() -> usize {
    practice_core::graph::TIER_SUGGESTION_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    GetOrCreateSession {
        #[serde(default)]
        session_type: SessionType,
    },
    RefreshSession {
        #[serde(default)]
        session_type: SessionType,
    },
    /// With `state` the update is computed and returned without touching
    /// storage; without it the stored state is advanced and saved.
    EvaluateDifficultyProgression {
        session_accuracy: f64,
        #[serde(default)]
        state: Option<ProgressionState>,
    },
    BuildAdaptiveSessionSettings {
        #[serde(default)]
        session_type: SessionType,
        #[serde(default)]
        state: Option<ProgressionState>,
    },
    GetTagRelationships,
    GetHighlyRelatedTags {
        mastered_tags: Vec<TagName>,
        missing_tags: Vec<TagName>,
        #[serde(default = "default_related_limit")]
        limit: usize,
    },
    /// Without `mastery_data` mastery is derived from stored attempt history.
    GetNextFiveTagsFromNextTier {
        #[serde(default)]
        mastery_data: Option<Vec<TagMastery>>,
    },
    RebuildTagGraph {
        #[serde(default)]
        force: bool,
    },
    RecordAttempt {
        attempt: RecordedAttempt,
    },
    CompleteSession {
        session_id: SessionId,
    },
    EvaluateAttempts {
        problem_id: ProblemId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Session {
        session: SessionRecord,
    },
    Progression {
        update: ProgressionUpdate,
        state: ProgressionState,
    },
    SessionSettings {
        settings: SessionSettings,
    },
    TagRelationships {
        relationships: BTreeMap<TagName, BTreeMap<TagName, u32>>,
    },
    RelatedTags {
        tags: Vec<TagName>,
    },
    NextTier(TierSuggestion),
    GraphRebuilt(RebuildOutcome),
    AttemptRecorded(AttemptOutcome),
    SessionCompleted(SessionCompletion),
    Evaluation(Evaluation),
    Error {
        message: String,
    },
}

impl Response {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

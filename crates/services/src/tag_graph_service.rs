use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use practice_core::config::MasteryConfig;
use practice_core::graph::{TIER_SUGGESTION_LIMIT, TagGraph, TierSuggestion};
use practice_core::mastery::{TagMastery, compute_tag_mastery, mastered_tags};
use practice_core::model::TagName;
use storage::repository::{AttemptRepository, ProblemRepository, TagRelationshipRepository};

use crate::error::ServiceError;
use crate::timeout::StorageDeadline;

/// Outcome of a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildOutcome {
    /// False when a graph already existed and the rebuild was not forced.
    pub rebuilt: bool,
    pub tag_count: usize,
}

/// Owns the tag relationship graph: rebuilds, lookups and tier suggestions.
pub struct TagGraphService {
    problems: Arc<dyn ProblemRepository>,
    attempts: Arc<dyn AttemptRepository>,
    tags: Arc<dyn TagRelationshipRepository>,
    mastery: MasteryConfig,
    deadline: StorageDeadline,
    rebuild_lock: Mutex<()>,
}

impl TagGraphService {
    #[must_use]
    pub(crate) fn new(
        problems: Arc<dyn ProblemRepository>,
        attempts: Arc<dyn AttemptRepository>,
        tags: Arc<dyn TagRelationshipRepository>,
        mastery: MasteryConfig,
        deadline: StorageDeadline,
    ) -> Self {
        Self {
            problems,
            attempts,
            tags,
            mastery,
            deadline,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Rebuild the graph from the current problem catalog.
    ///
    /// Concurrent callers are serialized. When relationships already exist
    /// the call is a no-op unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if loading problems or replacing the graph fails.
    pub async fn rebuild(&self, force: bool) -> Result<RebuildOutcome, ServiceError> {
        let _guard = self.rebuild_lock.lock().await;

        if !force
            && self
                .deadline
                .run("has_relationships", self.tags.has_relationships())
                .await?
        {
            let existing = self
                .deadline
                .run("load_relationships", self.tags.load_relationships())
                .await?;
            debug!(tags = existing.len(), "tag graph present, skipping rebuild");
            return Ok(RebuildOutcome {
                rebuilt: false,
                tag_count: existing.len(),
            });
        }

        let problems = self
            .deadline
            .run("list_problems", self.problems.list_problems())
            .await?;
        let graph = TagGraph::build(&problems);
        self.deadline
            .run("replace_relationships", self.tags.replace_relationships(&graph))
            .await?;

        info!(problems = problems.len(), tags = graph.len(), force, "rebuilt tag graph");
        Ok(RebuildOutcome {
            rebuilt: true,
            tag_count: graph.len(),
        })
    }

    /// The stored graph, building it first when none exists yet.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn graph(&self) -> Result<TagGraph, ServiceError> {
        let graph = self
            .deadline
            .run("load_relationships", self.tags.load_relationships())
            .await?;
        if !graph.is_empty() {
            return Ok(graph);
        }
        if self.rebuild(false).await?.rebuilt {
            return self
                .deadline
                .run("load_relationships", self.tags.load_relationships())
                .await;
        }
        Ok(graph)
    }

    /// Every tag with its weighted neighbours.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn relationships(
        &self,
    ) -> Result<BTreeMap<TagName, BTreeMap<TagName, u32>>, ServiceError> {
        Ok(self.graph().await?.relationships())
    }

    /// Missing tags most strongly connected to the mastered ones, best first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn highly_related(
        &self,
        mastered: &[TagName],
        missing: &[TagName],
        limit: usize,
    ) -> Result<Vec<TagName>, ServiceError> {
        Ok(self.graph().await?.related_tags(mastered, missing, limit))
    }

    /// Per-tag attempt totals over the whole attempt history.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn tag_mastery(&self) -> Result<BTreeMap<TagName, TagMastery>, ServiceError> {
        let problems = self
            .deadline
            .run("list_problems", self.problems.list_problems())
            .await?;
        let attempts = self
            .deadline
            .run("list_attempts", self.attempts.list_attempts())
            .await?;
        Ok(compute_tag_mastery(&problems, &attempts))
    }

    /// Tags that meet the configured mastery thresholds.
    #[must_use]
    pub fn mastered_from<'a>(
        &self,
        mastery: impl IntoIterator<Item = &'a TagMastery>,
    ) -> BTreeSet<TagName> {
        mastery
            .into_iter()
            .filter(|m| m.is_mastered(&self.mastery))
            .map(|m| m.tag.clone())
            .collect()
    }

    /// Mastered tags derived from stored history.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn mastered_tags(&self) -> Result<BTreeSet<TagName>, ServiceError> {
        Ok(mastered_tags(&self.tag_mastery().await?, &self.mastery))
    }

    /// Up to five tags to learn next, from the first tier not yet mastered.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` on storage failure or timeout.
    pub async fn next_tier_suggestion(
        &self,
        mastered: &BTreeSet<TagName>,
    ) -> Result<TierSuggestion, ServiceError> {
        let suggestion = self
            .graph()
            .await?
            .next_tier_suggestion(mastered, TIER_SUGGESTION_LIMIT);
        debug!(
            tier = suggestion.classification.as_str(),
            suggested = suggestion.suggested.len(),
            "next tier suggestion"
        );
        Ok(suggestion)
    }
}

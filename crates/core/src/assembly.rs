//! Selection policy for assembling a session from candidate problems.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, Problem, ProblemId, SessionType, TagName};
use crate::progression::SessionSettings;

/// Everything assembly needs to know about the session being built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRequest {
    pub session_type: SessionType,
    pub session_length: u32,
    pub number_of_new_problems: u32,
    /// Empty means unrestricted.
    pub allowed_tags: BTreeSet<TagName>,
    pub difficulty_cap: Difficulty,
    pub focus_areas: Vec<TagName>,
    pub is_onboarding: bool,
}

/// Problems chosen for a session, reviews first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssembledSession {
    pub problems: Vec<Problem>,
    pub reviews_selected: usize,
    pub new_selected: usize,
}

impl AssembledSession {
    #[must_use]
    pub fn problem_ids(&self) -> Vec<ProblemId> {
        self.problems.iter().map(|p| p.id).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl AssemblyRequest {
    #[must_use]
    pub fn from_settings(session_type: SessionType, settings: &SessionSettings) -> Self {
        Self {
            session_type,
            session_length: settings.session_length,
            number_of_new_problems: settings.number_of_new_problems,
            allowed_tags: settings.current_allowed_tags.clone(),
            difficulty_cap: settings.current_difficulty_cap,
            focus_areas: settings.user_focus_areas.clone(),
            is_onboarding: settings.is_onboarding,
        }
    }

    /// Cap always applies; tag restrictions apply outside onboarding when non-empty.
    #[must_use]
    pub fn admits(&self, problem: &Problem) -> bool {
        if !self.difficulty_cap.admits(problem.difficulty) {
            return false;
        }
        self.is_onboarding || self.allowed_tags.is_empty() || problem.has_any_tag(&self.allowed_tags)
    }

    fn is_focus(&self, problem: &Problem) -> bool {
        problem.tags.iter().any(|t| self.focus_areas.contains(t))
    }

    /// Pick the session's problems from due and never-attempted candidates.
    ///
    /// Due problems are ordered most overdue first with cooldown problems last.
    /// New problems keep the caller's order among equals after focus-area tags
    /// and then easier difficulty are moved forward. When one pool runs short the
    /// other fills the free slots; review sessions never take new problems.
    #[must_use]
    pub fn assemble(
        &self,
        now: DateTime<Utc>,
        due: impl IntoIterator<Item = Problem>,
        new: impl IntoIterator<Item = Problem>,
    ) -> AssembledSession {
        let length = usize::try_from(self.session_length).unwrap_or(usize::MAX);
        let new_quota = match self.session_type {
            SessionType::Review => 0,
            SessionType::Standard => {
                usize::try_from(self.number_of_new_problems).unwrap_or(usize::MAX).min(length)
            }
        };
        let review_quota = length - new_quota;

        let mut seen = HashSet::new();
        let mut reviews: Vec<Problem> = due
            .into_iter()
            .filter(|p| p.is_due(now) && self.admits(p) && seen.insert(p.id))
            .collect();
        reviews.sort_by_key(|p| (p.cooldown, p.next_review_at, p.id));

        let mut fresh: Vec<Problem> = match self.session_type {
            SessionType::Review => Vec::new(),
            SessionType::Standard => new
                .into_iter()
                .filter(|p| p.is_new() && self.admits(p) && seen.insert(p.id))
                .collect(),
        };
        fresh.sort_by_key(|p| (!self.is_focus(p), p.difficulty));

        let take_reviews = reviews.len().min(review_quota);
        let take_new = fresh.len().min(new_quota);
        let spare = length - take_reviews - take_new;
        let extra_reviews = (reviews.len() - take_reviews).min(spare);
        let extra_new = (fresh.len() - take_new).min(spare - extra_reviews);

        let reviews_selected = take_reviews + extra_reviews;
        let new_selected = take_new + extra_new;
        let mut problems: Vec<Problem> = reviews.into_iter().take(reviews_selected).collect();
        problems.extend(fresh.into_iter().take(new_selected));

        AssembledSession {
            problems,
            reviews_selected,
            new_selected,
        }
    }
}

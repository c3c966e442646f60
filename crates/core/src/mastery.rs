use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::MasteryConfig;
use crate::model::{Problem, ProblemId, RecordedAttempt, TagName};

/// Per-tag attempt totals derived from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMastery {
    pub tag: TagName,
    pub total_attempts: u32,
    pub successful_attempts: u32,
}

impl TagMastery {
    #[must_use]
    pub fn new(tag: TagName) -> Self {
        Self {
            tag,
            total_attempts: 0,
            successful_attempts: 0,
        }
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            f64::from(self.successful_attempts) / f64::from(self.total_attempts)
        }
    }

    #[must_use]
    pub fn is_mastered(&self, config: &MasteryConfig) -> bool {
        self.total_attempts >= config.min_attempts && self.success_rate() >= config.success_rate
    }
}

/// Aggregate valid attempts onto every tag of the attempted problem.
///
/// Attempts for unknown problems and malformed records are ignored.
#[must_use]
pub fn compute_tag_mastery(
    problems: &[Problem],
    attempts: &[RecordedAttempt],
) -> BTreeMap<TagName, TagMastery> {
    let tags_by_problem: HashMap<ProblemId, &[TagName]> = problems
        .iter()
        .map(|p| (p.id, p.tags.as_slice()))
        .collect();

    let mut mastery: BTreeMap<TagName, TagMastery> = BTreeMap::new();
    for attempt in attempts.iter().filter_map(RecordedAttempt::validate) {
        let Some(tags) = tags_by_problem.get(&attempt.problem_id) else {
            continue;
        };
        for tag in *tags {
            let entry = mastery
                .entry(tag.clone())
                .or_insert_with(|| TagMastery::new(tag.clone()));
            entry.total_attempts = entry.total_attempts.saturating_add(1);
            if attempt.success {
                entry.successful_attempts = entry.successful_attempts.saturating_add(1);
            }
        }
    }
    mastery
}

#[must_use]
pub fn mastered_tags(
    mastery: &BTreeMap<TagName, TagMastery>,
    config: &MasteryConfig,
) -> BTreeSet<TagName> {
    mastery
        .values()
        .filter(|m| m.is_mastered(config))
        .map(|m| m.tag.clone())
        .collect()
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::{Difficulty, ProblemId, TagName};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProblemError {
    #[error("box level must be in 1..=8, got {0}")]
    InvalidBoxLevel(i64),
    #[error("stability must be finite and non-negative, got {0}")]
    InvalidStability(f64),
}

//
// ─── BOX LEVEL ─────────────────────────────────────────────────────────────────
//

/// Leitner box, always within `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BoxLevel(u8);

impl BoxLevel {
    pub const MIN: BoxLevel = BoxLevel(1);
    pub const MAX: BoxLevel = BoxLevel(8);

    /// # Errors
    ///
    /// Returns `ProblemError::InvalidBoxLevel` outside `1..=8`.
    pub fn new(level: u8) -> Result<Self, ProblemError> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ProblemError::InvalidBoxLevel(i64::from(level)))
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Advance `steps` boxes, capped at the top box.
    #[must_use]
    pub fn promote(self, steps: usize) -> Self {
        let steps = u8::try_from(steps).unwrap_or(u8::MAX);
        Self(self.0.saturating_add(steps).min(Self::MAX.0))
    }

    /// Retreat `steps` boxes, floored at the first box.
    #[must_use]
    pub fn demote(self, steps: usize) -> Self {
        let steps = u8::try_from(steps).unwrap_or(u8::MAX);
        Self(self.0.saturating_sub(steps).max(Self::MIN.0))
    }
}

impl Default for BoxLevel {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<u8> for BoxLevel {
    type Error = ProblemError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BoxLevel> for u8 {
    fn from(value: BoxLevel) -> Self {
        value.0
    }
}

//
// ─── PROBLEM ───────────────────────────────────────────────────────────────────
//

/// A catalog problem together with the learner's scheduling state for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub title: String,
    pub tags: Vec<TagName>,
    pub difficulty: Difficulty,
    pub box_level: BoxLevel,
    pub stability: f64,
    pub consecutive_failures: u32,
    pub cooldown: bool,
    /// Valid attempts seen by the last evaluation pass.
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
}

impl Problem {
    /// A fresh, never-attempted problem in the first box.
    ///
    /// Duplicate tags are dropped, keeping first occurrence order.
    #[must_use]
    pub fn new(
        id: ProblemId,
        title: impl Into<String>,
        tags: impl IntoIterator<Item = TagName>,
        difficulty: Difficulty,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let tags = tags
            .into_iter()
            .filter(|tag| seen.insert(tag.clone()))
            .collect();
        Self {
            id,
            title: title.into(),
            tags,
            difficulty,
            box_level: BoxLevel::MIN,
            stability: 0.0,
            consecutive_failures: 0,
            cooldown: false,
            attempt_count: 0,
            last_attempt_at: None,
            next_review_at: None,
        }
    }

    /// Rehydrate scheduling state from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProblemError::InvalidStability` for negative or non-finite stability.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ProblemId,
        title: String,
        tags: Vec<TagName>,
        difficulty: Difficulty,
        box_level: BoxLevel,
        stability: f64,
        consecutive_failures: u32,
        cooldown: bool,
        attempt_count: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        next_review_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProblemError> {
        if !stability.is_finite() || stability < 0.0 {
            return Err(ProblemError::InvalidStability(stability));
        }
        let mut problem = Self::new(id, title, tags, difficulty);
        problem.box_level = box_level;
        problem.stability = stability;
        problem.consecutive_failures = consecutive_failures;
        problem.cooldown = cooldown;
        problem.attempt_count = attempt_count;
        problem.last_attempt_at = last_attempt_at;
        problem.next_review_at = next_review_at;
        Ok(problem)
    }

    /// Never attempted: candidate for the "new problems" part of a session.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.attempt_count == 0 && self.last_attempt_at.is_none()
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_new() && self.next_review_at.is_some_and(|at| at <= now)
    }

    /// How far past its review date the problem is; `None` if not scheduled.
    #[must_use]
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_review_at.map(|at| now.signed_duration_since(at))
    }

    #[must_use]
    pub fn has_any_tag(&self, tags: &BTreeSet<TagName>) -> bool {
        self.tags.iter().any(|tag| tags.contains(tag))
    }
}

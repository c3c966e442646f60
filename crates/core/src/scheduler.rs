//! Leitner-box scheduling for practice problems.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SchedulerConfig;
use crate::model::{Attempt, BoxLevel, Problem, ProblemId, RecordedAttempt, valid_chronological};
use crate::stability::{StabilityInput, StabilityModel, build_model};
use crate::time::elapsed_days;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error("FSRS scheduling failed: {0}")]
    Fsrs(String),
    #[error("desired retention must be in (0, 1], got {provided}")]
    InvalidRetention { provided: f32 },
    #[error("elapsed days must be finite, got {provided}")]
    InvalidElapsedDays { provided: f64 },
}

//
// ─── INTERVALS ─────────────────────────────────────────────────────────────────
//

/// Base review interval for a box.
#[must_use]
pub fn base_interval_days(level: BoxLevel) -> u32 {
    match level.value() {
        0 | 1 => 1,
        2 => 3,
        3 => 7,
        4 => 14,
        5 => 30,
        6 => 60,
        7 => 90,
        _ => 120,
    }
}

/// Scale the base interval by stability, within half to one and a half times the base.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn scaled_interval_days(level: BoxLevel, stability: f64) -> i64 {
    let base = f64::from(base_interval_days(level));
    let factor = if stability.is_finite() {
        (stability / base).clamp(0.5, 1.5)
    } else {
        1.0
    };
    ((base * factor).round() as i64).max(1)
}

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub total_attempts: u32,
    pub successful_attempts: u32,
    pub unsuccessful_attempts: u32,
}

impl AttemptStats {
    fn from_attempts(attempts: &[Attempt]) -> Self {
        let mut stats = Self::default();
        for attempt in attempts {
            stats.total_attempts = stats.total_attempts.saturating_add(1);
            if attempt.success {
                stats.successful_attempts = stats.successful_attempts.saturating_add(1);
            } else {
                stats.unsuccessful_attempts = stats.unsuccessful_attempts.saturating_add(1);
            }
        }
        stats
    }
}

/// Box level and counters derived from a problem's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reassessment {
    pub stats: AttemptStats,
    pub box_level: BoxLevel,
    /// Mean self-rated difficulty; `None` without valid attempts.
    pub average_difficulty: Option<f64>,
    pub consecutive_failures: u32,
    pub cooldown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSchedule {
    pub box_level: BoxLevel,
    pub stability: f64,
    pub interval_days: i64,
    pub next_review_at: DateTime<Utc>,
}

/// Result of evaluating a problem against its attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub problem_id: ProblemId,
    pub box_level: BoxLevel,
    pub total_attempts: u32,
    pub next_review_at: Option<DateTime<Utc>>,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Leitner scheduler with a pluggable stability model.
pub struct LeitnerScheduler {
    config: SchedulerConfig,
    model: Box<dyn StabilityModel>,
}

impl std::fmt::Debug for LeitnerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeitnerScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LeitnerScheduler {
    /// # Errors
    ///
    /// Returns `SchedulerError` if the configured stability model cannot be built.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let model = build_model(&config)?;
        Ok(Self { config, model })
    }

    #[must_use]
    pub fn with_model(config: SchedulerConfig, model: Box<dyn StabilityModel>) -> Self {
        Self { config, model }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Recompute box level and failure counters from history.
    ///
    /// `attempts` must be in recording order. Only attempts recorded after the
    /// problem's last evaluation move the box, so evaluating unchanged history
    /// twice leaves the level where it is.
    #[must_use]
    pub fn reassess(&self, problem: &Problem, attempts: &[RecordedAttempt]) -> Reassessment {
        let valid = valid_chronological(attempts);
        let fresh = fresh_attempts(problem, attempts);
        self.reassess_valid(problem, &valid, &fresh)
    }

    fn reassess_valid(
        &self,
        problem: &Problem,
        valid: &[Attempt],
        fresh: &[Attempt],
    ) -> Reassessment {
        let stats = AttemptStats::from_attempts(valid);
        let average_difficulty = (!valid.is_empty()).then(|| {
            let sum: f64 = valid.iter().map(|a| a.perceived_difficulty).sum();
            sum / f64::from(stats.total_attempts.max(1))
        });

        let box_level = match fresh.last() {
            None => problem.box_level,
            Some(last) => {
                let run = trailing_run(fresh, last.success);
                if last.success {
                    problem.box_level.promote(run)
                } else {
                    problem.box_level.demote(run)
                }
            }
        };

        let failures = match valid.last() {
            Some(last) if !last.success => trailing_run(valid, false),
            _ => 0,
        };
        let consecutive_failures = u32::try_from(failures).unwrap_or(u32::MAX);

        Reassessment {
            stats,
            box_level,
            average_difficulty,
            consecutive_failures,
            cooldown: consecutive_failures >= self.config.cooldown_failures,
        }
    }

    /// Next review after `last_attempt`, given the problem's current stability.
    ///
    /// `previous_at` is the preceding review; `None` treats the attempt as the first.
    ///
    /// # Errors
    ///
    /// Propagates stability model failures.
    pub fn next_review(
        &self,
        problem: &Problem,
        box_level: BoxLevel,
        last_attempt: &Attempt,
        previous_at: Option<DateTime<Utc>>,
    ) -> Result<ReviewSchedule, SchedulerError> {
        let elapsed = previous_at.map_or(0.0, |at| elapsed_days(at, last_attempt.attempted_at));
        let stability = self.model.next_stability(&StabilityInput {
            previous_stability: problem.stability,
            elapsed_days: elapsed,
            success: last_attempt.success,
            perceived_difficulty: last_attempt.perceived_difficulty,
            time_spent_secs: last_attempt.time_spent_secs,
            problem_difficulty: problem.difficulty,
        })?;
        let interval_days = scaled_interval_days(box_level, stability);
        Ok(ReviewSchedule {
            box_level,
            stability,
            interval_days,
            next_review_at: last_attempt.attempted_at + Duration::days(interval_days),
        })
    }

    /// Apply history to a problem, returning the updated problem and a summary.
    ///
    /// `attempts` must be in recording order. With no valid attempts the problem
    /// is returned unchanged.
    ///
    /// # Errors
    ///
    /// Propagates stability model failures; nothing is applied in that case.
    pub fn evaluate(
        &self,
        problem: &Problem,
        attempts: &[RecordedAttempt],
    ) -> Result<(Problem, Evaluation), SchedulerError> {
        let valid = valid_chronological(attempts);
        let mut updated = problem.clone();
        if valid.is_empty() {
            return Ok((updated, evaluation(problem, 0)));
        }

        let fresh = fresh_attempts(problem, attempts);
        let reassessment = self.reassess_valid(problem, &valid, &fresh);
        updated.consecutive_failures = reassessment.consecutive_failures;
        updated.cooldown = reassessment.cooldown;
        updated.attempt_count = reassessment.stats.total_attempts;

        if let Some(last) = fresh.last() {
            let mut previous_at = problem.last_attempt_at;
            for attempt in &fresh {
                let schedule =
                    self.next_review(&updated, reassessment.box_level, attempt, previous_at)?;
                updated.stability = schedule.stability;
                updated.next_review_at = Some(schedule.next_review_at);
                previous_at = Some(attempt.attempted_at);
            }
            updated.box_level = reassessment.box_level;
            updated.last_attempt_at = problem.last_attempt_at.max(Some(last.attempted_at));
        }

        let summary = evaluation(&updated, reassessment.stats.total_attempts);
        Ok((updated, summary))
    }
}

fn evaluation(problem: &Problem, total_attempts: u32) -> Evaluation {
    Evaluation {
        problem_id: problem.id,
        box_level: problem.box_level,
        total_attempts,
        next_review_at: problem.next_review_at,
    }
}

/// Valid attempts recorded after the last evaluation, oldest first.
///
/// The stored attempt count marks where the unapplied tail of the recording
/// order begins, so same-instant and back-dated attempts are still applied once.
fn fresh_attempts(problem: &Problem, attempts: &[RecordedAttempt]) -> Vec<Attempt> {
    let applied = usize::try_from(problem.attempt_count).unwrap_or(usize::MAX);
    let mut fresh: Vec<Attempt> = attempts
        .iter()
        .filter_map(RecordedAttempt::validate)
        .skip(applied)
        .collect();
    fresh.sort_by_key(|a| a.attempted_at);
    fresh
}

fn trailing_run(attempts: &[Attempt], success: bool) -> usize {
    attempts
        .iter()
        .rev()
        .take_while(|a| a.success == success)
        .count()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

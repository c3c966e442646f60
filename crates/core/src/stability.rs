//! Continuous memory-stability models.
//!
//! A stability value is measured in days. The scheduler only relies on it being
//! non-decreasing in elapsed time and success and non-increasing in reported
//! difficulty; both models here honor that.

use crate::config::{SchedulerConfig, StabilityKind};
use crate::model::Difficulty;
use crate::scheduler::SchedulerError;

/// One attempt as seen by a stability model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityInput {
    /// Zero for a problem that has never been reviewed.
    pub previous_stability: f64,
    pub elapsed_days: f64,
    pub success: bool,
    /// Self-rated difficulty on the 1-10 attempt scale.
    pub perceived_difficulty: f64,
    pub time_spent_secs: u32,
    pub problem_difficulty: Difficulty,
}

pub trait StabilityModel: Send + Sync {
    /// Stability after this attempt.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError` if the input is out of range or the model fails.
    fn next_stability(&self, input: &StabilityInput) -> Result<f64, SchedulerError>;
}

/// Build the configured model.
///
/// # Errors
///
/// Returns `SchedulerError::InvalidRetention` for a retention outside `(0, 1]`.
pub fn build_model(config: &SchedulerConfig) -> Result<Box<dyn StabilityModel>, SchedulerError> {
    Ok(match config.stability {
        StabilityKind::Fsrs => Box::new(FsrsStability::try_new(config.desired_retention)?),
        StabilityKind::Exponential => Box::new(ExponentialStability::default()),
    })
}

fn check_elapsed(elapsed_days: f64) -> Result<f64, SchedulerError> {
    if elapsed_days.is_finite() {
        Ok(elapsed_days.max(0.0))
    } else {
        Err(SchedulerError::InvalidElapsedDays {
            provided: elapsed_days,
        })
    }
}

//
// ─── FSRS ──────────────────────────────────────────────────────────────────────
//

/// Review grade derived from an attempt's outcome, self-rating and time spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// Self-ratings at or above this are graded `Hard`.
    const HARD_FROM: f64 = 7.0;
    /// Self-ratings at or below this are graded `Easy`.
    const EASY_UP_TO: f64 = 3.0;

    #[must_use]
    pub fn from_input(input: &StabilityInput) -> Self {
        if !input.success {
            return Rating::Again;
        }
        let over_time = input.time_spent_secs > time_limit_secs(input.problem_difficulty);
        if input.perceived_difficulty >= Self::HARD_FROM || over_time {
            Rating::Hard
        } else if input.perceived_difficulty <= Self::EASY_UP_TO {
            Rating::Easy
        } else {
            Rating::Good
        }
    }
}

/// Expected solve time; going over it downgrades a success to `Hard`.
#[must_use]
pub fn time_limit_secs(difficulty: Difficulty) -> u32 {
    match difficulty {
        Difficulty::Easy => 15 * 60,
        Difficulty::Medium => 25 * 60,
        Difficulty::Hard => 40 * 60,
    }
}

/// FSRS item difficulty (1-10) for a problem's catalog difficulty.
///
/// The self-rating already picks the grade, so the memory state carries the
/// problem's fixed difficulty instead.
#[must_use]
pub fn fsrs_item_difficulty(difficulty: Difficulty) -> f32 {
    match difficulty {
        Difficulty::Easy => 3.0,
        Difficulty::Medium => 5.5,
        Difficulty::Hard => 8.0,
    }
}

/// Stability from the FSRS memory model with default parameters.
#[derive(Debug, Clone, Copy)]
pub struct FsrsStability {
    desired_retention: f32,
}

impl FsrsStability {
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidRetention` unless `0 < retention <= 1`.
    pub fn try_new(desired_retention: f32) -> Result<Self, SchedulerError> {
        if !(desired_retention > 0.0 && desired_retention <= 1.0) {
            return Err(SchedulerError::InvalidRetention {
                provided: desired_retention,
            });
        }
        Ok(Self { desired_retention })
    }

    #[must_use]
    pub fn desired_retention(&self) -> f32 {
        self.desired_retention
    }
}

impl StabilityModel for FsrsStability {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn next_stability(&self, input: &StabilityInput) -> Result<f64, SchedulerError> {
        let elapsed = check_elapsed(input.elapsed_days)?;
        // The model is rebuilt per call so the scheduler stays `Send + Sync`.
        let fsrs = fsrs::FSRS::new(Some(&[])).map_err(|e| SchedulerError::Fsrs(e.to_string()))?;

        let memory = (input.previous_stability > 0.0).then(|| fsrs::MemoryState {
            stability: input.previous_stability as f32,
            difficulty: fsrs_item_difficulty(input.problem_difficulty),
        });
        let next = fsrs
            .next_states(memory, self.desired_retention, elapsed.round() as u32)
            .map_err(|e| SchedulerError::Fsrs(e.to_string()))?;

        let state = match Rating::from_input(input) {
            Rating::Again => next.again,
            Rating::Hard => next.hard,
            Rating::Good => next.good,
            Rating::Easy => next.easy,
        };
        Ok(f64::from(state.memory.stability).max(0.0))
    }
}

//
// ─── EXPONENTIAL ───────────────────────────────────────────────────────────────
//

/// Closed-form stability growth without model parameters.
///
/// Success multiplies stability by a factor that grows with elapsed time
/// relative to the current stability and shrinks with reported difficulty.
/// Failure halves it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialStability {
    pub initial: f64,
    pub growth: f64,
    pub lapse_factor: f64,
}

impl Default for ExponentialStability {
    fn default() -> Self {
        Self {
            initial: 1.0,
            growth: 1.5,
            lapse_factor: 0.5,
        }
    }
}

impl StabilityModel for ExponentialStability {
    fn next_stability(&self, input: &StabilityInput) -> Result<f64, SchedulerError> {
        let elapsed = check_elapsed(input.elapsed_days)?;
        let current = input.previous_stability.max(self.initial);
        if !input.success {
            return Ok((current * self.lapse_factor).max(self.initial * self.lapse_factor));
        }
        let difficulty = input
            .perceived_difficulty
            .clamp(crate::model::PERCEIVED_DIFFICULTY_MIN, crate::model::PERCEIVED_DIFFICULTY_MAX);
        let ease = (11.0 - difficulty) / 10.0;
        let spacing = (elapsed / current).ln_1p();
        Ok(current * (1.0 + self.growth * ease * (1.0 + spacing)))
    }
}

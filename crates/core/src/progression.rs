//! Session-level difficulty progression and adaptive session sizing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::{ProgressionConfig, SessionConfig};
use crate::model::{Difficulty, SessionType, TagName};

/// Persisted progression counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProgressionState {
    pub current_difficulty_cap: Difficulty,
    pub consecutive_high_accuracy_sessions: u32,
    pub consecutive_low_accuracy_sessions: u32,
    pub num_sessions_completed: u32,
    /// Most recent session accuracies, oldest first.
    pub recent_accuracies: Vec<f64>,
}

impl ProgressionState {
    /// Mean of the recent accuracies; `None` before any session is scored.
    #[must_use]
    pub fn rolling_accuracy(&self) -> Option<f64> {
        if self.recent_accuracies.is_empty() {
            return None;
        }
        let sum: f64 = self.recent_accuracies.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let len = self.recent_accuracies.len() as f64;
        Some(sum / len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionUpdate {
    pub current_difficulty_cap: Difficulty,
    pub num_sessions_completed: u32,
}

/// Per-request session parameters; recomputed every time, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub session_length: u32,
    pub number_of_new_problems: u32,
    /// Empty means unrestricted.
    pub current_allowed_tags: BTreeSet<TagName>,
    pub current_difficulty_cap: Difficulty,
    pub user_focus_areas: Vec<TagName>,
    pub is_onboarding: bool,
}

impl SessionSettings {
    /// Attach tag eligibility; onboarding sessions keep no restriction and no focus.
    #[must_use]
    pub fn with_tags(mut self, allowed: BTreeSet<TagName>, focus: Vec<TagName>) -> Self {
        if !self.is_onboarding {
            self.current_allowed_tags = allowed;
            self.user_focus_areas = focus;
        }
        self
    }

    #[must_use]
    pub fn review_slots(&self) -> u32 {
        self.session_length.saturating_sub(self.number_of_new_problems)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    High,
    Middle,
    Low,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressionController {
    session: SessionConfig,
    progression: ProgressionConfig,
}

impl ProgressionController {
    #[must_use]
    pub fn new(session: SessionConfig, progression: ProgressionConfig) -> Self {
        Self {
            session,
            progression,
        }
    }

    /// Fold one scored session into `state`.
    ///
    /// The cap moves at most one step, and only when a streak reaches its
    /// configured length; the streak then restarts.
    pub fn evaluate(&self, accuracy: f64, state: &mut ProgressionState) -> ProgressionUpdate {
        let accuracy = if accuracy.is_nan() {
            0.0
        } else {
            accuracy.clamp(0.0, 1.0)
        };
        let p = &self.progression;
        state.num_sessions_completed = state.num_sessions_completed.saturating_add(1);

        if accuracy >= p.high_accuracy {
            state.consecutive_high_accuracy_sessions += 1;
            state.consecutive_low_accuracy_sessions = 0;
            if state.consecutive_high_accuracy_sessions >= p.promotion_streak {
                state.current_difficulty_cap = state.current_difficulty_cap.step_up();
                state.consecutive_high_accuracy_sessions = 0;
            }
        } else if accuracy < p.low_accuracy {
            state.consecutive_low_accuracy_sessions += 1;
            state.consecutive_high_accuracy_sessions = 0;
            if state.consecutive_low_accuracy_sessions >= p.demotion_streak {
                state.current_difficulty_cap = state.current_difficulty_cap.step_down();
                state.consecutive_low_accuracy_sessions = 0;
            }
        } else {
            state.consecutive_high_accuracy_sessions = 0;
            state.consecutive_low_accuracy_sessions = 0;
        }

        state.recent_accuracies.push(accuracy);
        let excess = state
            .recent_accuracies
            .len()
            .saturating_sub(p.rolling_window);
        state.recent_accuracies.drain(..excess);

        ProgressionUpdate {
            current_difficulty_cap: state.current_difficulty_cap,
            num_sessions_completed: state.num_sessions_completed,
        }
    }

    #[must_use]
    pub fn is_onboarding(&self, state: &ProgressionState) -> bool {
        state.num_sessions_completed < self.session.onboarding_sessions
    }

    /// Length, new-problem count and cap for the next session.
    ///
    /// Tag eligibility is left empty; see [`SessionSettings::with_tags`].
    #[must_use]
    pub fn build_settings(
        &self,
        state: &ProgressionState,
        session_type: SessionType,
    ) -> SessionSettings {
        if self.is_onboarding(state) {
            let length = self.session.onboarding_length;
            return SessionSettings {
                session_length: length,
                number_of_new_problems: new_for(session_type, length, 1.0),
                current_allowed_tags: BTreeSet::new(),
                current_difficulty_cap: Difficulty::Easy,
                user_focus_areas: Vec::new(),
                is_onboarding: true,
            };
        }

        let band = match state.rolling_accuracy() {
            Some(acc) if acc > self.progression.high_accuracy => Band::High,
            Some(acc) if acc < self.progression.low_accuracy => Band::Low,
            _ => Band::Middle,
        };
        let (length_factor, new_ratio) = match band {
            Band::High => (0.8, 0.4),
            Band::Middle => (1.0, 0.3),
            Band::Low => (1.25, 0.2),
        };
        let length = round_u32(f64::from(self.session.base_length) * length_factor)
            .clamp(self.session.min_length, self.session.max_length);

        SessionSettings {
            session_length: length,
            number_of_new_problems: new_for(session_type, length, new_ratio),
            current_allowed_tags: BTreeSet::new(),
            current_difficulty_cap: state.current_difficulty_cap,
            user_focus_areas: Vec::new(),
            is_onboarding: false,
        }
    }

    /// Settings used when progression state cannot be loaded in time.
    #[must_use]
    pub fn fallback_settings(&self, session_type: SessionType) -> SessionSettings {
        let length = self
            .session
            .base_length
            .clamp(self.session.min_length, self.session.max_length);
        SessionSettings {
            session_length: length,
            number_of_new_problems: new_for(session_type, length, 0.3),
            current_allowed_tags: BTreeSet::new(),
            current_difficulty_cap: Difficulty::Easy,
            user_focus_areas: Vec::new(),
            is_onboarding: false,
        }
    }
}

fn new_for(session_type: SessionType, length: u32, ratio: f64) -> u32 {
    match session_type {
        SessionType::Review => 0,
        SessionType::Standard => round_u32(f64::from(length) * ratio).min(length),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_u32(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

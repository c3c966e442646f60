use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Attempt, ProblemId, SessionId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionRecordError {
    #[error("session already completed")]
    AlreadyCompleted,

    #[error("session was discarded")]
    Discarded,

    #[error("solved count ({solved}) exceeds attempted count ({attempted})")]
    CountMismatch { attempted: u32, solved: u32 },

    #[error("too many attempts for a single session: {len}")]
    TooManyAttempts { len: usize },

    #[error("unknown session {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },
}

//
// ─── SESSION TYPE / STATUS ─────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Reviews first, topped up with new problems.
    #[default]
    Standard,
    /// Due reviews only.
    Review,
}

impl SessionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Standard => "standard",
            SessionType::Review => "review",
        }
    }

    /// # Errors
    ///
    /// Returns `SessionRecordError::UnknownVariant` for unrecognised input.
    pub fn parse(s: &str) -> Result<Self, SessionRecordError> {
        match s {
            "standard" => Ok(SessionType::Standard),
            "review" => Ok(SessionType::Review),
            other => Err(SessionRecordError::UnknownVariant {
                field: "type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Discarded,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Discarded => "discarded",
        }
    }

    /// # Errors
    ///
    /// Returns `SessionRecordError::UnknownVariant` for unrecognised input.
    pub fn parse(s: &str) -> Result<Self, SessionRecordError> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "discarded" => Ok(SessionStatus::Discarded),
            other => Err(SessionRecordError::UnknownVariant {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

//
// ─── PERFORMANCE SUMMARY ───────────────────────────────────────────────────────
//

/// Scored outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    attempted: u32,
    solved: u32,
    accuracy: f64,
}

impl PerformanceSummary {
    /// Rehydrate a summary from persisted counts; accuracy is recomputed.
    ///
    /// # Errors
    ///
    /// Returns `SessionRecordError::CountMismatch` if `solved > attempted`.
    pub fn from_counts(attempted: u32, solved: u32) -> Result<Self, SessionRecordError> {
        if solved > attempted {
            return Err(SessionRecordError::CountMismatch { attempted, solved });
        }
        let accuracy = if attempted == 0 {
            0.0
        } else {
            f64::from(solved) / f64::from(attempted)
        };
        Ok(Self {
            attempted,
            solved,
            accuracy,
        })
    }

    /// Build a summary from the validated attempts made during a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionRecordError::TooManyAttempts` if the count cannot fit in `u32`.
    pub fn from_attempts(attempts: &[Attempt]) -> Result<Self, SessionRecordError> {
        let attempted = u32::try_from(attempts.len())
            .map_err(|_| SessionRecordError::TooManyAttempts { len: attempts.len() })?;
        let solved = attempts
            .iter()
            .filter(|a| a.success)
            .fold(0_u32, |acc, _| acc.saturating_add(1));
        Self::from_counts(attempted, solved)
    }

    #[must_use]
    pub fn attempted(&self) -> u32 {
        self.attempted
    }

    #[must_use]
    pub fn solved(&self) -> u32 {
        self.solved
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }
}

//
// ─── SESSION RECORD ────────────────────────────────────────────────────────────
//

/// A persisted, assembled practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub problem_ids: Vec<ProblemId>,
    pub completed_at: Option<DateTime<Utc>>,
    pub performance: Option<PerformanceSummary>,
}

impl SessionRecord {
    #[must_use]
    pub fn new(
        id: SessionId,
        session_type: SessionType,
        problem_ids: Vec<ProblemId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_type,
            status: SessionStatus::Active,
            created_at,
            last_activity_at: created_at,
            problem_ids,
            completed_at: None,
            performance: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// True once the session has seen no activity for longer than `window`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.last_activity_at) > window
    }

    #[must_use]
    pub fn contains(&self, problem_id: ProblemId) -> bool {
        self.problem_ids.contains(&problem_id)
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }

    pub fn discard(&mut self) {
        if self.is_active() {
            self.status = SessionStatus::Discarded;
        }
    }

    /// Mark the session completed with its scored performance.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyCompleted` or `Discarded` if the session is no longer active.
    pub fn complete(
        &mut self,
        performance: PerformanceSummary,
        at: DateTime<Utc>,
    ) -> Result<(), SessionRecordError> {
        match self.status {
            SessionStatus::Completed => Err(SessionRecordError::AlreadyCompleted),
            SessionStatus::Discarded => Err(SessionRecordError::Discarded),
            SessionStatus::Active => {
                self.status = SessionStatus::Completed;
                self.completed_at = Some(at);
                self.touch(at);
                self.performance = Some(performance);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn attempt(id: u64, success: bool) -> Attempt {
        Attempt {
            problem_id: ProblemId::new(id),
            session_id: None,
            attempted_at: fixed_now(),
            success,
            perceived_difficulty: 5.0,
            time_spent_secs: 60,
        }
    }

    #[test]
    fn summary_counts_solved_attempts() {
        let summary = PerformanceSummary::from_attempts(&[
            attempt(1, true),
            attempt(2, false),
            attempt(3, true),
            attempt(4, true),
        ])
        .unwrap();
        assert_eq!(summary.attempted(), 4);
        assert_eq!(summary.solved(), 3);
        assert!((summary.accuracy() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary_has_zero_accuracy() {
        let summary = PerformanceSummary::from_attempts(&[]).unwrap();
        assert_eq!(summary.accuracy(), 0.0);
    }

    #[test]
    fn summary_rejects_inconsistent_counts() {
        assert!(matches!(
            PerformanceSummary::from_counts(1, 2),
            Err(SessionRecordError::CountMismatch { .. })
        ));
    }

    #[test]
    fn staleness_follows_last_activity() {
        let now = fixed_now();
        let mut record = SessionRecord::new(
            SessionId::generate(),
            SessionType::Standard,
            vec![ProblemId::new(1)],
            now - Duration::hours(50),
        );
        assert!(record.is_stale(now, Duration::hours(48)));
        record.touch(now - Duration::hours(1));
        assert!(!record.is_stale(now, Duration::hours(48)));
    }

    #[test]
    fn complete_only_once() {
        let now = fixed_now();
        let mut record =
            SessionRecord::new(SessionId::generate(), SessionType::Review, Vec::new(), now);
        let summary = PerformanceSummary::from_counts(2, 1).unwrap();
        record.complete(summary.clone(), now).unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(
            record.complete(summary, now).unwrap_err(),
            SessionRecordError::AlreadyCompleted
        );
    }

    #[test]
    fn session_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionType::Review).unwrap(),
            "\"review\""
        );
        assert_eq!(SessionType::parse("standard").unwrap(), SessionType::Standard);
        assert!(SessionStatus::parse("paused").is_err());
    }
}

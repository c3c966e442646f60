use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::model::{ProblemId, SessionId};

/// Lowest and highest self-rated difficulty on the attempt scale.
pub const PERCEIVED_DIFFICULTY_MIN: f64 = 1.0;
pub const PERCEIVED_DIFFICULTY_MAX: f64 = 10.0;

//
// ─── RECORDED ATTEMPT ─────────────────────────────────────────────────────────
//

/// An attempt exactly as it sits in history.
///
/// History is append-only and may contain entries written by older clients, so
/// every field that can be malformed is optional here. Use [`RecordedAttempt::validate`]
/// to obtain a strict [`Attempt`]; malformed records are skipped by the scheduler
/// instead of failing a whole reassessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAttempt {
    pub problem_id: ProblemId,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// `None` when the stored timestamp could not be parsed.
    #[serde(default, deserialize_with = "malformed_as_none")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "malformed_as_none")]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "malformed_as_none")]
    pub perceived_difficulty: Option<f64>,
    #[serde(default, deserialize_with = "malformed_as_none")]
    pub time_spent_secs: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeValid<T> {
    Valid(T),
    Malformed(IgnoredAny),
}

/// Read a field that may hold a value of the wrong shape, keeping it as `None`.
fn malformed_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<MaybeValid<T>>::deserialize(deserializer)? {
        Some(MaybeValid::Valid(value)) => Some(value),
        Some(MaybeValid::Malformed(_)) | None => None,
    })
}

impl RecordedAttempt {
    /// A well-formed attempt, as produced by the engine itself.
    #[must_use]
    pub fn new(
        problem_id: ProblemId,
        attempted_at: DateTime<Utc>,
        success: bool,
        perceived_difficulty: f64,
        time_spent_secs: u32,
    ) -> Self {
        Self {
            problem_id,
            session_id: None,
            attempted_at: Some(attempted_at),
            success: Some(success),
            perceived_difficulty: Some(perceived_difficulty),
            time_spent_secs: Some(time_spent_secs),
        }
    }

    #[must_use]
    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Strict view of this record, or `None` if it is malformed.
    ///
    /// A record is malformed when its timestamp is missing, its outcome is null, or
    /// its self-rated difficulty is missing or not a finite number. In-range
    /// clamping is applied to finite difficulties; missing time spent counts as zero.
    #[must_use]
    pub fn validate(&self) -> Option<Attempt> {
        let attempted_at = self.attempted_at?;
        let success = self.success?;
        let perceived = self.perceived_difficulty.filter(|d| d.is_finite())?;
        Some(Attempt {
            problem_id: self.problem_id,
            session_id: self.session_id,
            attempted_at,
            success,
            perceived_difficulty: perceived
                .clamp(PERCEIVED_DIFFICULTY_MIN, PERCEIVED_DIFFICULTY_MAX),
            time_spent_secs: self.time_spent_secs.unwrap_or(0),
        })
    }
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// A validated attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub problem_id: ProblemId,
    pub session_id: Option<SessionId>,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub perceived_difficulty: f64,
    pub time_spent_secs: u32,
}

/// Validate and chronologically sort a history, dropping malformed records.
#[must_use]
pub fn valid_chronological(records: &[RecordedAttempt]) -> Vec<Attempt> {
    let mut attempts: Vec<Attempt> = records.iter().filter_map(RecordedAttempt::validate).collect();
    attempts.sort_by_key(|a| a.attempted_at);
    attempts
}

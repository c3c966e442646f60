use chrono::{DateTime, SecondsFormat, Utc};
use practice_core::model::{
    BoxLevel, Difficulty, PerformanceSummary, Problem, ProblemId, RecordedAttempt, SessionId,
    SessionRecord, SessionStatus, SessionType, TagName,
};
use practice_core::progression::ProgressionState;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn domain<E: Into<practice_core::Error>>(e: E) -> StorageError {
    StorageError::Domain(e.into())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn problem_id_from_i64(v: i64) -> Result<ProblemId, StorageError> {
    u64::try_from(v)
        .map(ProblemId::new)
        .map_err(|_| StorageError::Serialization("problem_id sign overflow".into()))
}

pub(crate) fn problem_id_to_i64(id: ProblemId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("problem_id overflow".into()))
}

/// Timestamps are stored as fixed-width RFC 3339 text so they compare correctly as strings.
pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(field: &'static str, raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid {field} '{raw}': {e}")))
}

fn parse_opt_ts(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    raw.map(|s| parse_ts(field, &s)).transpose()
}

pub(crate) fn difficulty_from_i64(v: i64) -> Result<Difficulty, StorageError> {
    u8::try_from(v)
        .ok()
        .and_then(Difficulty::from_rank)
        .ok_or_else(|| StorageError::Serialization(format!("invalid difficulty rank: {v}")))
}

pub(crate) fn difficulty_to_i64(d: Difficulty) -> i64 {
    i64::from(d.rank())
}

pub(crate) fn map_problem_row(row: &SqliteRow, tags: Vec<TagName>) -> Result<Problem, StorageError> {
    let box_level: i64 = row.try_get("box_level").map_err(ser)?;
    let box_level = u8::try_from(box_level)
        .map_err(|_| StorageError::Serialization(format!("invalid box_level: {box_level}")))
        .and_then(|level| BoxLevel::new(level).map_err(domain))?;

    Problem::from_persisted(
        problem_id_from_i64(row.try_get("id").map_err(ser)?)?,
        row.try_get("title").map_err(ser)?,
        tags,
        difficulty_from_i64(row.try_get("difficulty").map_err(ser)?)?,
        box_level,
        row.try_get("stability").map_err(ser)?,
        u32_from_i64(
            "consecutive_failures",
            row.try_get("consecutive_failures").map_err(ser)?,
        )?,
        row.try_get::<bool, _>("cooldown").map_err(ser)?,
        u32_from_i64("attempt_count", row.try_get("attempt_count").map_err(ser)?)?,
        parse_opt_ts("last_attempt_at", row.try_get("last_attempt_at").map_err(ser)?)?,
        parse_opt_ts("next_review_at", row.try_get("next_review_at").map_err(ser)?)?,
    )
    .map_err(domain)
}

/// Attempt rows are decoded leniently: an unreadable timestamp becomes `None`
/// so the scheduler can skip the record instead of failing the whole history.
pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<RecordedAttempt, StorageError> {
    let session_id = row
        .try_get::<Option<String>, _>("session_id")
        .map_err(ser)?
        .map(|raw| raw.parse::<SessionId>().map_err(domain))
        .transpose()?;
    let attempted_at = row
        .try_get::<Option<String>, _>("attempted_at")
        .map_err(ser)?
        .and_then(|raw| parse_ts("attempted_at", &raw).ok());
    let time_spent_secs = row
        .try_get::<Option<i64>, _>("time_spent_secs")
        .map_err(ser)?
        .and_then(|secs| u32::try_from(secs).ok());

    Ok(RecordedAttempt {
        problem_id: problem_id_from_i64(row.try_get("problem_id").map_err(ser)?)?,
        session_id,
        attempted_at,
        success: row.try_get("success").map_err(ser)?,
        perceived_difficulty: row.try_get("perceived_difficulty").map_err(ser)?,
        time_spent_secs,
    })
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<SessionRecord, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let session_type: String = row.try_get("session_type").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let problem_ids: String = row.try_get("problem_ids").map_err(ser)?;
    let problem_ids: Vec<ProblemId> = serde_json::from_str(&problem_ids).map_err(ser)?;

    let attempted: Option<i64> = row.try_get("attempted").map_err(ser)?;
    let solved: Option<i64> = row.try_get("solved").map_err(ser)?;
    let performance = match (attempted, solved) {
        (Some(attempted), Some(solved)) => Some(
            PerformanceSummary::from_counts(
                u32_from_i64("attempted", attempted)?,
                u32_from_i64("solved", solved)?,
            )
            .map_err(domain)?,
        ),
        _ => None,
    };

    let created_at: String = row.try_get("created_at").map_err(ser)?;
    let last_activity_at: String = row.try_get("last_activity_at").map_err(ser)?;
    Ok(SessionRecord {
        id: id.parse::<SessionId>().map_err(domain)?,
        session_type: SessionType::parse(&session_type).map_err(domain)?,
        status: SessionStatus::parse(&status).map_err(domain)?,
        created_at: parse_ts("created_at", &created_at)?,
        last_activity_at: parse_ts("last_activity_at", &last_activity_at)?,
        problem_ids,
        completed_at: parse_opt_ts("completed_at", row.try_get("completed_at").map_err(ser)?)?,
        performance,
    })
}

pub(crate) fn map_progression_row(row: &SqliteRow) -> Result<ProgressionState, StorageError> {
    let recent: String = row.try_get("recent_accuracies").map_err(ser)?;
    Ok(ProgressionState {
        current_difficulty_cap: difficulty_from_i64(
            row.try_get("current_difficulty_cap").map_err(ser)?,
        )?,
        consecutive_high_accuracy_sessions: u32_from_i64(
            "consecutive_high",
            row.try_get("consecutive_high").map_err(ser)?,
        )?,
        consecutive_low_accuracy_sessions: u32_from_i64(
            "consecutive_low",
            row.try_get("consecutive_low").map_err(ser)?,
        )?,
        num_sessions_completed: u32_from_i64(
            "sessions_completed",
            row.try_get("sessions_completed").map_err(ser)?,
        )?,
        recent_accuracies: serde_json::from_str(&recent).map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::time::fixed_now;

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = format_ts(fixed_now());
        let b = format_ts(fixed_now() + chrono::Duration::milliseconds(1500));
        assert_eq!(a, "2023-11-14T22:13:20.000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_ts("at", &a).unwrap(), fixed_now());
    }

    #[test]
    fn difficulty_rank_roundtrips() {
        for d in Difficulty::ALL {
            assert_eq!(difficulty_from_i64(difficulty_to_i64(d)).unwrap(), d);
        }
        assert!(difficulty_from_i64(7).is_err());
    }
}

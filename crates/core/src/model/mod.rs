mod attempt;
mod difficulty;
mod ids;
mod problem;
mod session;
mod tag;

pub use ids::{ParseIdError, ProblemId, SessionId};

pub use attempt::{
    Attempt, PERCEIVED_DIFFICULTY_MAX, PERCEIVED_DIFFICULTY_MIN, RecordedAttempt,
    valid_chronological,
};
pub use difficulty::{Difficulty, DifficultyParseError};
pub use problem::{BoxLevel, Problem, ProblemError};
pub use session::{
    PerformanceSummary, SessionRecord, SessionRecordError, SessionStatus, SessionType,
};
pub use tag::{ProblemCounts, TagError, TagName, TagNode, Tier};

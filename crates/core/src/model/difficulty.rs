use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown difficulty: {0}")]
pub struct DifficultyParseError(pub String);

/// Catalog difficulty of a problem.
///
/// Ordering follows the progression ladder: `Easy < Medium < Hard`, so a
/// difficulty cap admits every problem that compares `<=` to it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Edge-weight increment contributed by a problem of this difficulty.
    ///
    /// Co-occurrence on easier problems marks a more foundational relationship,
    /// so it weighs more.
    #[must_use]
    pub fn weight_multiplier(self) -> u32 {
        match self {
            Difficulty::Easy => 3,
            Difficulty::Medium => 2,
            Difficulty::Hard => 1,
        }
    }

    /// Next difficulty up the ladder, saturating at `Hard`.
    #[must_use]
    pub fn step_up(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    /// Next difficulty down the ladder, saturating at `Easy`.
    #[must_use]
    pub fn step_down(self) -> Self {
        match self {
            Difficulty::Hard => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
        }
    }

    /// True when a problem of difficulty `other` fits under this cap.
    #[must_use]
    pub fn admits(self, other: Difficulty) -> bool {
        other <= self
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Stable numeric rank (0..=2), used for storage and ordering in queries.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    /// Inverse of [`Difficulty::rank`].
    #[must_use]
    pub fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Difficulty::Easy),
            1 => Some(Difficulty::Medium),
            2 => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(DifficultyParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_saturates_at_both_ends() {
        assert_eq!(Difficulty::Easy.step_up(), Difficulty::Medium);
        assert_eq!(Difficulty::Medium.step_up(), Difficulty::Hard);
        assert_eq!(Difficulty::Hard.step_up(), Difficulty::Hard);
        assert_eq!(Difficulty::Hard.step_down(), Difficulty::Medium);
        assert_eq!(Difficulty::Easy.step_down(), Difficulty::Easy);
    }

    #[test]
    fn cap_admits_easier_problems_only() {
        assert!(Difficulty::Medium.admits(Difficulty::Easy));
        assert!(Difficulty::Medium.admits(Difficulty::Medium));
        assert!(!Difficulty::Medium.admits(Difficulty::Hard));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(" medium ".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn rank_roundtrips() {
        for d in Difficulty::ALL {
            assert_eq!(Difficulty::from_rank(d.rank()), Some(d));
        }
        assert_eq!(Difficulty::from_rank(9), None);
    }
}

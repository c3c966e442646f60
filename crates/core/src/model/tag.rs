use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::Difficulty;

/// Normalized tag name (trimmed, lowercase, non-empty).
///
/// Every tag entering the engine goes through this type, so `"Dynamic Programming "`
/// and `"dynamic programming"` address the same graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// Create a normalized tag name.
    ///
    /// # Errors
    ///
    /// Returns `TagError::EmptyName` if the name is empty after trimming.
    pub fn new(value: impl AsRef<str>) -> Result<Self, TagError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TagError::EmptyName);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TagName {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagName> for String {
    fn from(value: TagName) -> Self {
        value.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagError {
    #[error("tag name cannot be empty")]
    EmptyName,
    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

//
// ─── TIER ──────────────────────────────────────────────────────────────────────
//

/// Pedagogical depth of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    CoreConcept,
    FundamentalTechnique,
    AdvancedTechnique,
}

impl Tier {
    /// Learning order in which tiers are unlocked.
    pub const ORDER: [Tier; 3] = [
        Tier::CoreConcept,
        Tier::FundamentalTechnique,
        Tier::AdvancedTechnique,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::CoreConcept => "core_concept",
            Tier::FundamentalTechnique => "fundamental_technique",
            Tier::AdvancedTechnique => "advanced_technique",
        }
    }

    /// Parse the storage representation produced by [`Tier::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `TagError::UnknownTier` for any other string.
    pub fn parse(s: &str) -> Result<Self, TagError> {
        match s {
            "core_concept" => Ok(Tier::CoreConcept),
            "fundamental_technique" => Ok(Tier::FundamentalTechnique),
            "advanced_technique" => Ok(Tier::AdvancedTechnique),
            other => Err(TagError::UnknownTier(other.to_string())),
        }
    }
}

//
// ─── PROBLEM COUNTS ────────────────────────────────────────────────────────────
//

/// How many catalog problems of each difficulty carry a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProblemCounts {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl ProblemCounts {
    #[must_use]
    pub fn new(easy: u32, medium: u32, hard: u32) -> Self {
        Self { easy, medium, hard }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.easy
            .saturating_add(self.medium)
            .saturating_add(self.hard)
    }

    pub fn record(&mut self, difficulty: Difficulty) {
        match difficulty {
            Difficulty::Easy => self.easy = self.easy.saturating_add(1),
            Difficulty::Medium => self.medium = self.medium.saturating_add(1),
            Difficulty::Hard => self.hard = self.hard.saturating_add(1),
        }
    }
}

//
// ─── TAG NODE ──────────────────────────────────────────────────────────────────
//

/// One tag in the relationship graph, as persisted per tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagNode {
    pub tag: TagName,
    pub related: BTreeMap<TagName, u32>,
    pub counts: ProblemCounts,
    pub classification: Tier,
}

impl TagNode {
    #[must_use]
    pub fn weight_to(&self, other: &TagName) -> u32 {
        self.related.get(other).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_name_normalizes_case_and_whitespace() {
        let tag = TagName::new("  Dynamic Programming ").unwrap();
        assert_eq!(tag.as_str(), "dynamic programming");
        assert_eq!(tag, TagName::new("dynamic programming").unwrap());
    }

    #[test]
    fn tag_name_rejects_blank() {
        assert_eq!(TagName::new("   ").unwrap_err(), TagError::EmptyName);
    }

    #[test]
    fn tag_name_deserializes_through_normalization() {
        let tag: TagName = serde_json::from_str("\"Graph\"").unwrap();
        assert_eq!(tag.as_str(), "graph");
        assert!(serde_json::from_str::<TagName>("\"\"").is_err());
    }

    #[test]
    fn tier_storage_roundtrip() {
        for tier in Tier::ORDER {
            assert_eq!(Tier::parse(tier.as_str()).unwrap(), tier);
        }
        assert!(Tier::parse("expert").is_err());
    }

    #[test]
    fn counts_record_by_difficulty() {
        let mut counts = ProblemCounts::default();
        counts.record(Difficulty::Easy);
        counts.record(Difficulty::Hard);
        counts.record(Difficulty::Hard);
        assert_eq!(counts, ProblemCounts::new(1, 0, 2));
        assert_eq!(counts.total(), 3);
    }
}

use serde::Deserialize;

use practice_core::model::{Difficulty, Problem, ProblemId, TagName};
use storage::repository::{ProblemRepository, StorageError};

/// One problem as it appears in an import file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
    pub tags: Vec<TagName>,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Parse a JSON array of catalog entries.
///
/// # Errors
///
/// Returns the parse error for malformed JSON or invalid tags.
pub fn parse_catalog(content: &str) -> Result<Vec<CatalogEntry>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Upsert catalog entries, keeping scheduling state of problems already stored.
///
/// # Errors
///
/// Returns `StorageError` if a read or write fails.
pub async fn import_catalog(
    problems: &dyn ProblemRepository,
    entries: Vec<CatalogEntry>,
) -> Result<ImportSummary, StorageError> {
    let mut summary = ImportSummary::default();
    for entry in entries {
        let fresh = Problem::new(
            ProblemId::new(entry.id),
            entry.title,
            entry.tags,
            entry.difficulty,
        );
        let problem = match problems.get_problem(fresh.id).await {
            Ok(mut existing) => {
                existing.title = fresh.title;
                existing.tags = fresh.tags;
                existing.difficulty = fresh.difficulty;
                summary.updated += 1;
                existing
            }
            Err(StorageError::NotFound) => {
                summary.inserted += 1;
                fresh
            }
            Err(err) => return Err(err),
        };
        problems.upsert_problem(&problem).await?;
    }
    Ok(summary)
}

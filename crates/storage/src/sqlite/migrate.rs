use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;
use super::mapping::format_ts;

const SCHEMA_V1: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS problems (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 0 AND 2),
        box_level INTEGER NOT NULL CHECK (box_level BETWEEN 1 AND 8),
        stability REAL NOT NULL CHECK (stability >= 0),
        consecutive_failures INTEGER NOT NULL CHECK (consecutive_failures >= 0),
        cooldown INTEGER NOT NULL CHECK (cooldown IN (0, 1)),
        attempt_count INTEGER NOT NULL CHECK (attempt_count >= 0),
        last_attempt_at TEXT,
        next_review_at TEXT
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS problem_tags (
        problem_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        tag TEXT NOT NULL,
        PRIMARY KEY (problem_id, tag),
        FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS attempts (
        id INTEGER PRIMARY KEY,
        problem_id INTEGER NOT NULL,
        session_id TEXT,
        attempted_at TEXT,
        success INTEGER,
        perceived_difficulty REAL,
        time_spent_secs INTEGER
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS tag_nodes (
        tag TEXT PRIMARY KEY,
        easy INTEGER NOT NULL CHECK (easy >= 0),
        medium INTEGER NOT NULL CHECK (medium >= 0),
        hard INTEGER NOT NULL CHECK (hard >= 0),
        classification TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS tag_edges (
        tag TEXT NOT NULL,
        related_tag TEXT NOT NULL,
        weight INTEGER NOT NULL CHECK (weight >= 0),
        PRIMARY KEY (tag, related_tag),
        FOREIGN KEY (tag) REFERENCES tag_nodes(tag) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS progression_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        current_difficulty_cap INTEGER NOT NULL CHECK (current_difficulty_cap BETWEEN 0 AND 2),
        consecutive_high INTEGER NOT NULL CHECK (consecutive_high >= 0),
        consecutive_low INTEGER NOT NULL CHECK (consecutive_low >= 0),
        sessions_completed INTEGER NOT NULL CHECK (sessions_completed >= 0),
        recent_accuracies TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        session_type TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_activity_at TEXT NOT NULL,
        problem_ids TEXT NOT NULL,
        completed_at TEXT,
        attempted INTEGER,
        solved INTEGER
    );
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active_per_type
        ON sessions(session_type) WHERE status = 'active';
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_problems_due
        ON problems(attempt_count, next_review_at, difficulty);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_attempts_problem_time
        ON attempts(problem_id, attempted_at);
    ",
];

/// Applies pending schema versions, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;
        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(format_ts(Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}

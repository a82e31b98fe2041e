pub mod models;

use chrono::{SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;

use crate::social::FollowError;
use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial",
        include_str!("../../migrations/001_initial.sql"),
    ),
    (
        "002_social_graph",
        include_str!("../../migrations/002_social_graph.sql"),
    ),
    (
        "003_notifications",
        include_str!("../../migrations/003_notifications.sql"),
    ),
];

/// Errors shared by every SQLite-backed repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Follow(#[from] FollowError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas are per connection, so every pooled connection gets them
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        register_functions(conn)
    });
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

/// SQLite's built-in `lower()` only folds ASCII. `unicode_lower()` folds
/// everything Rust's `str::to_lowercase` does, so searches match "Björk"
/// against "BJÖRK".
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| s.to_lowercase()))
        },
    )
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Current UTC time as RFC 3339 with millisecond precision, so that stored
/// timestamps sort lexically in chronological order.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Run `f` inside a `BEGIN IMMEDIATE` transaction, rolling back on error.
/// A failed `COMMIT` is rolled back too, so the connection always goes back
/// to the pool in autocommit mode.
pub fn with_transaction<T, E>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    conn.execute("BEGIN IMMEDIATE", [])?;

    let result = f(conn).and_then(|value| match conn.execute("COMMIT", []) {
        Ok(_) => Ok(value),
        Err(e) => Err(e.into()),
    });

    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute("ROLLBACK", []) {
            tracing::error!("Rollback failed: {}", e);
        }
    }

    result
}

/// Fresh migrated database in a temp dir, for tests.
#[cfg(test)]
pub(crate) fn test_pool() -> (DbPool, tempfile::TempDir) {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let pool = create_pool(&temp_dir.path().join("test.db")).unwrap();
    run_migrations(&pool).unwrap();
    (pool, temp_dir)
}

//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates the four relations
//! used by the rating workflow. Every statement is idempotent so the service
//! and the ingestion CLI can both call [`init_database`] on start-up.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL lets selection queries read while ratings are written
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_sessions_table(pool).await?;
    create_images_table(pool).await?;
    create_ratings_table(pool).await?;
    create_clicked_coordinates_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            step INTEGER NOT NULL CHECK (step BETWEEN 0 AND 4),
            created_at TIMESTAMP NOT NULL,
            user TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the images table
///
/// `image_meta` enforces at most one image per (slice, file1, display, step).
/// The index coalesces NULL slices because SQLite treats NULLs as distinct
/// in plain UNIQUE constraints.
async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            img BLOB NOT NULL,
            slice INTEGER,
            file1 TEXT NOT NULL,
            file2 TEXT,
            display INTEGER NOT NULL CHECK (display BETWEEN 0 AND 2),
            step INTEGER NOT NULL CHECK (step BETWEEN 0 AND 4),
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS image_meta \
         ON images(IFNULL(slice, -1), file1, display, step)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_step_file ON images(step, file1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_ratings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ratings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            rating INTEGER NOT NULL CHECK (rating BETWEEN 0 AND 2),
            source_data_issue BOOLEAN NOT NULL DEFAULT 0,
            comments TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ratings_image ON ratings(image_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_clicked_coordinates_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clicked_coordinates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            x REAL,
            y REAL,
            source_data_issue BOOLEAN NOT NULL DEFAULT 0,
            comments TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_clicked_coordinates_image ON clicked_coordinates(image_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

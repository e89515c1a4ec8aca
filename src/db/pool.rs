use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Type alias for the SQLite connection pool.
/// Used throughout the application for database access.
pub type DbPool = SqlitePool;

/// Creates the database connection pool.
///
/// Connection options:
/// - **WAL mode**: readers never block the single writer, which is what
///   keeps "password change revokes sessions" visible to subsequent reads.
/// - **Foreign keys**: ON, so deleting a user cascades to their sessions.
/// - **Busy timeout**: 60 seconds to ride out writer contention.
/// - **Auto-create**: the database file is created if missing.
///
/// Migrations are NOT run here; the binary runs them separately so a
/// migration failure can map to its own exit code.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    ensure_sqlite_directory(database_url)?;

    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(60));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Database pool created successfully");
    Ok(pool)
}

fn ensure_sqlite_directory(database_url: &str) -> Result<(), sqlx::Error> {
    if let Some(db_path) = sqlite_file_path(database_url) {
        if let Some(parent) = db_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    tracing::error!(error = %err, path = ?parent, "Failed to create SQLite directory");
                    return Err(sqlx::Error::Io(err));
                }
            }
        }
    }

    Ok(())
}

fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    const PREFIX: &str = "sqlite:";

    if !database_url.starts_with(PREFIX) {
        return None;
    }

    let mut remainder = &database_url[PREFIX.len()..];

    // Memory-only databases have no directory to create.
    if remainder.starts_with(':') || remainder.is_empty() {
        return None;
    }

    // Strip optional query parameters (e.g., ?mode=rwc)
    if let Some((path_part, _)) = remainder.split_once('?') {
        remainder = path_part;
    }

    // Normalize slashes for mixed OS environments
    let normalized = if remainder.starts_with("///") {
        &remainder[2..]
    } else if remainder.starts_with("//") {
        &remainder[1..]
    } else {
        remainder
    };

    if normalized.trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(normalized))
}

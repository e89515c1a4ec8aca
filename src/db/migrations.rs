//! Schema Migrations
//!
//! Migrations are embedded, named with a sortable numeric prefix, and applied
//! in lexicographic order inside a single transaction. Applied names are
//! recorded in `schema_migrations`, so re-running on an already-migrated
//! database is a no-op. The transaction takes SQLite's write lock for its
//! duration, which makes concurrent startup of several replicas safe: one
//! applies, the rest observe the recorded names and skip.

use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use super::pool::DbPool;

/// One migration: a unique sortable name and the statements it runs.
struct Migration {
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_create_users",
        statements: &[
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL COLLATE NOCASE,
                password_hash TEXT NOT NULL CHECK (length(password_hash) > 0),
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)",
        ],
    },
    Migration {
        name: "0002_create_sessions",
        statements: &[
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                ip_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions (user_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions (created_at)",
        ],
    },
];

/// Applies every pending migration. Safe to call on every startup.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    if let Err(err) = apply_pending(&mut tx).await {
        tx.rollback().await?;
        return Err(err);
    }

    tx.commit().await?;
    Ok(())
}

async fn apply_pending(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(&mut **tx)
    .await?;

    // MIGRATIONS is declared in order; assert that here rather than trusting
    // the declaration site.
    let mut ordered: Vec<&Migration> = MIGRATIONS.iter().collect();
    ordered.sort_by_key(|m| m.name);

    for migration in ordered {
        let applied: Option<(String,)> =
            sqlx::query_as("SELECT name FROM schema_migrations WHERE name = ?")
                .bind(migration.name)
                .fetch_optional(&mut **tx)
                .await?;
        if applied.is_some() {
            continue;
        }

        for statement in migration.statements {
            sqlx::query(statement).execute(&mut **tx).await?;
        }

        sqlx::query("INSERT INTO schema_migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration.name)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;

        tracing::info!(migration = migration.name, "Applied migration");
    }

    Ok(())
}

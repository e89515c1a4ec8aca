//! Data Access Layer (Repositories)
//!
//! Persistence port for the authentication engine. Repositories abstract
//! the SQL behind async functions over the shared pool and map rows to the
//! domain models. Callers pass emails already normalized (trimmed,
//! lowercased); the schema's NOCASE collation backstops comparisons.

pub mod sessions; // Server-side session persistence
pub mod users; // User identity and credential persistence

/// Whether a database error is the unique-index violation raised by a
/// duplicate email.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code == "2067" || code == "1555")
            .unwrap_or(false),
        _ => false,
    }
}

/// Whether an error is transient contention worth one retry. SQLITE_BUSY
/// class failures clear once the competing writer commits.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code == "5" || code == "6")
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx;
use std::time::Duration;

use crate::db::DbPool;
use crate::models::Session;

use super::is_transient;

/// Size of a session identifier in bytes before encoding.
const SESSION_ID_LEN: usize = 32;

/// Generates an unguessable session identifier from the OS CSPRNG.
fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Creates a session for a user, recording the client address and user
/// agent as seen at sign-in. Both are immutable afterwards.
pub async fn create(
    pool: &DbPool,
    user_id: i64,
    ip_address: &str,
    user_agent: &str,
) -> Result<Session, sqlx::Error> {
    let now = Utc::now();
    let id = generate_session_id();

    let mut attempts = 0;
    loop {
        let result = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, ip_address, user_agent, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&id)
        .bind(user_id)
        .bind(ip_address)
        .bind(user_agent)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await;

        match result {
            Err(err) if is_transient(&err) && attempts < 2 => {
                attempts += 1;
                tracing::warn!(error = %err, attempts, "Retrying session insert after transient failure");
            }
            other => return other,
        }
    }
}

/// Looks up a session by ID.
///
/// A row older than `lifetime` is reported as absent even though it still
/// exists; expiry has no writer and is enforced here on every read. The
/// sweeper removes such rows eventually.
pub async fn find(
    pool: &DbPool,
    id: &str,
    lifetime: Duration,
) -> Result<Option<Session>, sqlx::Error> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let cutoff = Utc::now() - lifetime;
    Ok(session.filter(|s| s.created_at > cutoff))
}

/// Deletes a session. Deleting an absent session is not an error.
pub async fn delete(pool: &DbPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes every session belonging to a user. Returns how many were
/// removed. Used by password change and admin termination.
pub async fn delete_for_user(pool: &DbPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT * FROM sessions WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Removes every session created before `older_than`. Returns how many
/// rows went away.
pub async fn sweep_expired(
    pool: &DbPool,
    older_than: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE created_at < ?")
        .bind(older_than)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

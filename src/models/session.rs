use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A server-side authentication session.
///
/// The `id` is an opaque 256-bit random value delivered to the browser as
/// the `session_id` cookie. A session whose `created_at` is older than the
/// configured lifetime is treated as absent on lookup even if the row still
/// exists; expiry has no writer.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    /// Client address recorded at creation, immutable.
    pub ip_address: String,
    /// Client user agent recorded at creation, immutable.
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

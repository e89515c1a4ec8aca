use chrono::Utc;
use sqlx;

use crate::db::DbPool;
use crate::models::{Role, User};

use super::is_transient;

/// Optional constraints for the admin user listing.
#[derive(Debug, Default, Clone)]
pub struct UserFilter {
    /// Substring match against the email.
    pub search: Option<String>,
    pub role: Option<Role>,
}

/// Inserts a new user. The caller normalizes the email; a duplicate
/// (case-insensitively) surfaces as a unique-index violation, see
/// [`super::is_unique_violation`].
pub async fn create(
    pool: &DbPool,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<User, sqlx::Error> {
    let now = Utc::now();
    let mut attempts = 0;
    loop {
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await;

        match result {
            Err(err) if is_transient(&err) && attempts < 2 => {
                attempts += 1;
                tracing::warn!(error = %err, attempts, "Retrying user insert after transient failure");
            }
            other => return other,
        }
    }
}

/// Looks up a user by email. Comparison is case-insensitive via the
/// column collation.
pub async fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn update_role(pool: &DbPool, id: i64, role: Role) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_password_hash(
    pool: &DbPool,
    id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes a user. The foreign key cascades to their sessions.
pub async fn delete(pool: &DbPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns one page of users plus the total count under the same filter.
/// `page` is 1-based.
pub async fn list(
    pool: &DbPool,
    page: u32,
    per_page: u32,
    filter: &UserFilter,
) -> Result<(Vec<User>, i64), sqlx::Error> {
    let per_page = per_page.clamp(1, 100);
    let offset = i64::from(page.max(1) - 1) * i64::from(per_page);

    let mut where_clause = String::from(" WHERE 1 = 1");
    if filter.search.is_some() {
        where_clause.push_str(" AND email LIKE ? ESCAPE '\\'");
    }
    if filter.role.is_some() {
        where_clause.push_str(" AND role = ?");
    }

    let pattern = filter
        .search
        .as_deref()
        .map(|needle| format!("%{}%", escape_like(needle)));

    let select = format!("SELECT * FROM users{where_clause} ORDER BY id LIMIT ? OFFSET ?");
    let mut rows = sqlx::query_as::<_, User>(&select);
    if let Some(pattern) = &pattern {
        rows = rows.bind(pattern);
    }
    if let Some(role) = filter.role {
        rows = rows.bind(role);
    }
    let users = rows
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) FROM users{where_clause}");
    let mut count = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(pattern) = &pattern {
        count = count.bind(pattern);
    }
    if let Some(role) = filter.role {
        count = count.bind(role);
    }
    let (total,) = count.fetch_one(pool).await?;

    Ok((users, total))
}

/// Escapes LIKE metacharacters so a search string matches literally.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use crate::repositories::is_unique_violation;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn test_pool() -> DbPool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_and_find_case_insensitively() {
        let pool = test_pool().await;
        let created = create(&pool, "alice@example.com", "digest", Role::User)
            .await
            .unwrap();

        let by_exact = find_by_email(&pool, "alice@example.com").await.unwrap();
        let by_upper = find_by_email(&pool, "ALICE@EXAMPLE.COM").await.unwrap();

        assert_eq!(by_exact.unwrap().id, created.id);
        assert_eq!(by_upper.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let pool = test_pool().await;
        create(&pool, "alice@example.com", "digest", Role::User)
            .await
            .unwrap();

        let err = create(&pool, "Alice@Example.com", "digest", Role::User)
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn list_filters_by_search_and_role() {
        let pool = test_pool().await;
        create(&pool, "alice@example.com", "digest", Role::Admin)
            .await
            .unwrap();
        create(&pool, "bob@example.com", "digest", Role::User)
            .await
            .unwrap();
        create(&pool, "carol@other.org", "digest", Role::User)
            .await
            .unwrap();

        let filter = UserFilter {
            search: Some("example.com".to_string()),
            role: None,
        };
        let (users, total) = list(&pool, 1, 25, &filter).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(users.len(), 2);

        let filter = UserFilter {
            search: None,
            role: Some(Role::Admin),
        };
        let (users, total) = list(&pool, 1, 25, &filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].email, "alice@example.com");
    }

    #[tokio::test]
    async fn list_paginates() {
        let pool = test_pool().await;
        for i in 0..5 {
            create(&pool, &format!("user{i}@example.com"), "digest", Role::User)
                .await
                .unwrap();
        }

        let (page_one, total) = list(&pool, 1, 2, &UserFilter::default()).await.unwrap();
        let (page_three, _) = list(&pool, 3, 2, &UserFilter::default()).await.unwrap();

        assert_eq!(total, 5);
        assert_eq!(page_one.len(), 2);
        assert_eq!(page_three.len(), 1);
    }

    #[tokio::test]
    async fn like_metacharacters_match_literally() {
        let pool = test_pool().await;
        create(&pool, "percent%x@example.com", "digest", Role::User)
            .await
            .unwrap();
        create(&pool, "other@example.com", "digest", Role::User)
            .await
            .unwrap();

        let filter = UserFilter {
            search: Some("percent%x".to_string()),
            role: None,
        };
        let (_, total) = list(&pool, 1, 25, &filter).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn update_role_and_password_hash() {
        let pool = test_pool().await;
        let user = create(&pool, "alice@example.com", "digest", Role::User)
            .await
            .unwrap();

        update_role(&pool, user.id, Role::Admin).await.unwrap();
        update_password_hash(&pool, user.id, "digest2").await.unwrap();

        let reloaded = find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.role, Role::Admin);
        assert_eq!(reloaded.password_hash, "digest2");
    }
}

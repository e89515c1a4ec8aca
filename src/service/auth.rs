//! Authentication Service
//!
//! Orchestrates credential verification, session lifecycle, and bearer-token
//! issuance over the user and session stores. All password hashing runs on
//! the blocking thread pool: the work factor is deliberately expensive and
//! must never stall the async executor or run under a store lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::task;

use crate::db::DbPool;
use crate::models::{Role, Session, User};
use crate::repositories::{is_unique_violation, sessions, users};
use crate::security::password;
use crate::security::token::{Claims, TokenCodec};
use crate::service::error::AuthError;

/// Longest email accepted, per RFC 5321's path limit.
const MAX_EMAIL_LEN: usize = 254;

/// Normalizes an email for storage and comparison: trimmed and lowercased.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Syntactic shape check on an already-normalized email. Deliverability is
/// not this service's problem; unambiguous garbage is.
pub fn email_shape_is_valid(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN {
        return false;
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// The authentication engine. Cheap to clone; handlers share one instance
/// through the application state.
#[derive(Clone)]
pub struct AuthService {
    pool: DbPool,
    codec: Arc<TokenCodec>,
    session_lifetime: Duration,
}

impl AuthService {
    pub fn new(pool: DbPool, codec: Arc<TokenCodec>, session_lifetime: Duration) -> Self {
        AuthService {
            pool,
            codec,
            session_lifetime,
        }
    }

    /// Registers a new account and signs it in: one session and one bearer
    /// token, exactly as [`AuthService::sign_in`] would produce.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(User, Session, String), AuthError> {
        let email = normalize_email(email);
        if !email_shape_is_valid(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let digest = Self::hash_password(password.to_string()).await?;

        let user = match users::create(&self.pool, &email, &digest, Role::User).await {
            Ok(user) => user,
            Err(err) if is_unique_violation(&err) => return Err(AuthError::EmailTaken),
            Err(err) => return Err(err.into()),
        };

        let session = sessions::create(&self.pool, user.id, ip_address, user_agent).await?;
        let token = self.codec.issue(&user).map_err(|err| {
            tracing::error!(error = %err, user_id = user.id, "Token issuance failed");
            AuthError::Token
        })?;

        tracing::info!(user_id = user.id, "New account registered");
        Ok((user, session, token))
    }

    /// Verifies credentials and opens a session.
    ///
    /// Unknown user and wrong password return the same opaque error, and the
    /// hash verification runs either way (against a fixed dummy digest when
    /// the user is absent) so response timing does not reveal which case
    /// occurred.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(User, Session, String), AuthError> {
        let email = normalize_email(email);

        let user = users::find_by_email(&self.pool, &email).await?;

        let digest = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| password::dummy_digest().to_string());
        let password = password.to_string();
        let verified = task::spawn_blocking(move || password::verify(&digest, &password))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "Password verification task failed");
                AuthError::Hashing
            })?;

        let user = match (user, verified) {
            (Some(user), true) => user,
            _ => {
                tracing::warn!(email = %email, "Failed sign-in attempt");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let session = sessions::create(&self.pool, user.id, ip_address, user_agent).await?;
        let token = self.codec.issue(&user).map_err(|err| {
            tracing::error!(error = %err, user_id = user.id, "Token issuance failed");
            AuthError::Token
        })?;

        tracing::info!(user_id = user.id, "User signed in");
        Ok((user, session, token))
    }

    /// Terminates a session. Idempotent: a missing session is not an error.
    pub async fn sign_out(&self, session_id: &str) -> Result<(), AuthError> {
        sessions::delete(&self.pool, session_id).await?;
        Ok(())
    }

    /// Verifies a bearer token and returns its user. The session store is
    /// not consulted: this is the path sibling services rely on.
    pub async fn verify_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.checked_claims(token)?;
        self.user_for_claims(&claims).await
    }

    /// Issues a fresh token for the holder of a valid one. The user must
    /// still exist; any associated session is untouched.
    pub async fn refresh(&self, token: &str) -> Result<(String, User), AuthError> {
        let claims = self.checked_claims(token)?;
        let user = self.user_for_claims(&claims).await?;

        let fresh = self.codec.refresh(&claims).map_err(|err| {
            tracing::error!(error = %err, user_id = user.id, "Token refresh failed");
            AuthError::Token
        })?;
        Ok((fresh, user))
    }

    /// Resolves a user from a bearer token. Returns `None` on any failure;
    /// used by the middleware, which must never error while identifying.
    pub async fn resolve_from_token(&self, token: &str) -> Option<User> {
        let claims = match self.codec.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "Bearer token rejected");
                return None;
            }
        };

        match users::find_by_id(&self.pool, claims.user_id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::error!(error = %err, "User lookup failed during token resolution");
                None
            }
        }
    }

    /// Resolves a user from a session ID. Returns `None` on any failure,
    /// including sessions past their lifetime.
    pub async fn resolve_from_session(&self, session_id: &str) -> Option<User> {
        let session = match sessions::find(&self.pool, session_id, self.session_lifetime).await {
            Ok(session) => session?,
            Err(err) => {
                tracing::error!(error = %err, "Session lookup failed");
                return None;
            }
        };

        match users::find_by_id(&self.pool, session.user_id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::error!(error = %err, "User lookup failed during session resolution");
                None
            }
        }
    }

    /// Changes a password after verifying the current one, then revokes
    /// every session the user holds. Previously issued bearer tokens stay
    /// valid until expiry; only secret rotation revokes those.
    pub async fn change_password(
        &self,
        user_id: i64,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let user = users::find_by_id(&self.pool, user_id)
            .await?
            .ok_or(AuthError::UserGone)?;

        let digest = user.password_hash.clone();
        let current = current.to_string();
        let verified = task::spawn_blocking(move || password::verify(&digest, &current))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "Password verification task failed");
                AuthError::Hashing
            })?;
        if !verified {
            return Err(AuthError::InvalidCredentials);
        }

        let new_digest = Self::hash_password(new.to_string()).await?;
        users::update_password_hash(&self.pool, user_id, &new_digest).await?;

        let revoked = sessions::delete_for_user(&self.pool, user_id).await?;
        tracing::info!(user_id, revoked, "Password changed; sessions revoked");
        Ok(())
    }

    /// Flips a user's role between `user` and `admin`. Admins cannot toggle
    /// themselves; demoting the account you are operating from is how
    /// deployments lose their last admin.
    pub async fn admin_toggle_role(
        &self,
        target_user_id: i64,
        actor_user_id: i64,
    ) -> Result<User, AuthError> {
        if target_user_id == actor_user_id {
            return Err(AuthError::CannotModifySelf);
        }

        let target = users::find_by_id(&self.pool, target_user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let role = target.role.toggled();
        users::update_role(&self.pool, target_user_id, role).await?;
        tracing::info!(
            target_user_id,
            actor_user_id,
            role = role.as_str(),
            "Role toggled"
        );

        Ok(User { role, ..target })
    }

    /// Deletes a user and, via cascade, their sessions. Same self-protection
    /// rule as the role toggle.
    pub async fn admin_delete_user(
        &self,
        target_user_id: i64,
        actor_user_id: i64,
    ) -> Result<(), AuthError> {
        if target_user_id == actor_user_id {
            return Err(AuthError::CannotModifySelf);
        }

        users::find_by_id(&self.pool, target_user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        users::delete(&self.pool, target_user_id).await?;
        tracing::info!(target_user_id, actor_user_id, "User deleted");
        Ok(())
    }

    /// Terminates every session a user holds. Admin operation.
    pub async fn admin_terminate_sessions(&self, target_user_id: i64) -> Result<u64, AuthError> {
        let revoked = sessions::delete_for_user(&self.pool, target_user_id).await?;
        tracing::info!(target_user_id, revoked, "Sessions terminated by admin");
        Ok(revoked)
    }

    fn checked_claims(&self, token: &str) -> Result<Claims, AuthError> {
        self.codec.verify(token).map_err(|err| {
            tracing::debug!(error = %err, "Bearer token rejected");
            AuthError::Unauthenticated
        })
    }

    async fn user_for_claims(&self, claims: &Claims) -> Result<User, AuthError> {
        users::find_by_id(&self.pool, claims.user_id)
            .await?
            .ok_or(AuthError::UserGone)
    }

    async fn hash_password(password: String) -> Result<String, AuthError> {
        task::spawn_blocking(move || password::hash(&password))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "Password hashing task failed");
                AuthError::Hashing
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    const IP: &str = "203.0.113.9";
    const AGENT: &str = "test-agent";

    async fn test_service() -> AuthService {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let codec = Arc::new(TokenCodec::new(
            "an-adequately-long-test-signing-secret-0123456789",
            "passport.example.com",
        ));
        AuthService::new(pool, codec, Duration::from_secs(7 * 24 * 60 * 60))
    }

    #[test]
    fn email_normalization_and_shape() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert!(email_shape_is_valid("alice@example.com"));
        assert!(!email_shape_is_valid("alice"));
        assert!(!email_shape_is_valid("@example.com"));
        assert!(!email_shape_is_valid("alice@"));
        assert!(!email_shape_is_valid("alice@example"));
        assert!(!email_shape_is_valid("alice@.com"));
        assert!(!email_shape_is_valid("a lice@example.com"));
        assert!(!email_shape_is_valid("alice@@example.com"));
    }

    #[tokio::test]
    async fn sign_up_normalizes_and_signs_in() {
        let service = test_service().await;

        let (user, session, token) = service
            .sign_up("  Alice@Example.COM ", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::User);
        assert_eq!(session.user_id, user.id);

        let resolved = service.resolve_from_token(&token).await.unwrap();
        assert_eq!(resolved.id, user.id);
        let resolved = service.resolve_from_session(&session.id).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn sign_up_rejects_bad_input() {
        let service = test_service().await;

        assert!(matches!(
            service.sign_up("not-an-email", "correcthorse", IP, AGENT).await,
            Err(AuthError::InvalidEmail)
        ));
        assert!(matches!(
            service.sign_up("alice@example.com", "seven77", IP, AGENT).await,
            Err(AuthError::WeakPassword)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_is_reported_taken() {
        let service = test_service().await;
        service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        let err = service
            .sign_up("ALICE@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn sign_in_failures_are_indistinguishable() {
        let service = test_service().await;
        service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        let unknown_user = service
            .sign_in("nobody@example.com", "whatever1", IP, AGENT)
            .await
            .unwrap_err();
        let wrong_password = service
            .sign_in("alice@example.com", "wrongpass", IP, AGENT)
            .await
            .unwrap_err();

        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn sign_in_accepts_differently_cased_email() {
        let service = test_service().await;
        service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        let (user, _, _) = service
            .sign_in(" ALICE@EXAMPLE.COM ", "correcthorse", IP, AGENT)
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");
    }

    #[tokio::test]
    async fn sign_out_is_idempotent() {
        let service = test_service().await;
        let (_, session, _) = service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        service.sign_out(&session.id).await.unwrap();
        service.sign_out(&session.id).await.unwrap();

        assert!(service.resolve_from_session(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn refresh_requires_a_live_user() {
        let service = test_service().await;
        let (user, _, token) = service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        let (refreshed, refreshed_user) = service.refresh(&token).await.unwrap();
        assert_eq!(refreshed_user.id, user.id);

        // Refresh of a refresh is still self-consistent.
        let (again, _) = service.refresh(&refreshed).await.unwrap();
        assert_eq!(service.verify_token(&again).await.unwrap().id, user.id);

        crate::repositories::users::delete(&service.pool, user.id)
            .await
            .unwrap();
        assert!(matches!(
            service.refresh(&again).await,
            Err(AuthError::UserGone)
        ));
    }

    #[tokio::test]
    async fn change_password_revokes_every_session() {
        let service = test_service().await;
        let (user, s1, _) = service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();
        let (_, s2, _) = service
            .sign_in("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        let wrong = service
            .change_password(user.id, "not-the-password", "newpassword1")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));

        service
            .change_password(user.id, "correcthorse", "newpassword1")
            .await
            .unwrap();

        assert!(service.resolve_from_session(&s1.id).await.is_none());
        assert!(service.resolve_from_session(&s2.id).await.is_none());

        // Old password no longer signs in; the new one does.
        assert!(service
            .sign_in("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .is_err());
        assert!(service
            .sign_in("alice@example.com", "newpassword1", IP, AGENT)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn admins_cannot_modify_themselves() {
        let service = test_service().await;
        let (alice, _, _) = service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();
        crate::repositories::users::update_role(&service.pool, alice.id, Role::Admin)
            .await
            .unwrap();

        assert!(matches!(
            service.admin_toggle_role(alice.id, alice.id).await,
            Err(AuthError::CannotModifySelf)
        ));
        assert!(matches!(
            service.admin_delete_user(alice.id, alice.id).await,
            Err(AuthError::CannotModifySelf)
        ));

        // Store unchanged: still admin, still present.
        let reloaded = crate::repositories::users::find_by_id(&service.pool, alice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.role, Role::Admin);
    }

    #[tokio::test]
    async fn admin_toggles_and_deletes_other_users() {
        let service = test_service().await;
        let (alice, _, _) = service
            .sign_up("alice@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();
        let (bob, bob_session, _) = service
            .sign_up("bob@example.com", "correcthorse", IP, AGENT)
            .await
            .unwrap();

        let toggled = service.admin_toggle_role(bob.id, alice.id).await.unwrap();
        assert_eq!(toggled.role, Role::Admin);
        let toggled = service.admin_toggle_role(bob.id, alice.id).await.unwrap();
        assert_eq!(toggled.role, Role::User);

        service.admin_delete_user(bob.id, alice.id).await.unwrap();
        assert!(service.resolve_from_session(&bob_session.id).await.is_none());
        assert!(matches!(
            service.admin_delete_user(bob.id, alice.id).await,
            Err(AuthError::NotFound)
        ));
    }
}

//! Error Taxonomy
//!
//! Every fallible operation in the core returns an [`AuthError`] kind.
//! The JSON mapping lives in the `IntoResponse` impl; the browser surface
//! renders the same kinds through its own views. Credential and token
//! failures are deliberately opaque: callers see one `InvalidCredentials`
//! or `Unauthenticated`, while logs keep the distinguishing detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiErrorBody;
use crate::security::password::MIN_PASSWORD_LEN;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("Password is too long")]
    PasswordTooLong,

    #[error("Email is already registered")]
    EmailTaken,

    /// Unknown user and wrong password collapse to this one kind so the
    /// response never reveals which occurred.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Admin privileges required")]
    Forbidden,

    /// Admins may not change or delete their own account; see
    /// [`crate::service::auth::AuthService::admin_toggle_role`].
    #[error("Cannot modify your own account")]
    CannotModifySelf,

    /// The user behind a still-valid token no longer exists.
    #[error("Account no longer exists")]
    UserGone,

    #[error("Not found")]
    NotFound,

    #[error("Too many attempts; try again later")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request could not be verified")]
    CsrfRejected,

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing failed")]
    Hashing,

    #[error("Token issuance failed")]
    Token,
}

impl AuthError {
    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "InvalidEmail",
            AuthError::WeakPassword => "WeakPassword",
            AuthError::PasswordTooLong => "PasswordTooLong",
            AuthError::EmailTaken => "EmailTaken",
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::Unauthenticated => "Unauthenticated",
            AuthError::Forbidden => "Forbidden",
            AuthError::CannotModifySelf => "CannotModifySelf",
            AuthError::UserGone => "UserGone",
            AuthError::NotFound => "NotFound",
            AuthError::RateLimited { .. } => "RateLimited",
            AuthError::CsrfRejected => "CsrfRejected",
            AuthError::Database(_) | AuthError::Hashing | AuthError::Token => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidEmail | AuthError::WeakPassword | AuthError::PasswordTooLong => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::UserGone => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden | AuthError::CannotModifySelf | AuthError::CsrfRejected => {
                StatusCode::FORBIDDEN
            }
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Database(err) if is_unavailable(err) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Database(_) | AuthError::Hashing | AuthError::Token => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show callers. Internal failures collapse to a
    /// generic line; the detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::Hashing | AuthError::Token => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Whether a storage failure means the database is unreachable rather than
/// a bug, mapping to 503 instead of 500.
fn is_unavailable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, detail = ?self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = ApiErrorBody {
            success: false,
            error: self.code().to_string(),
            message: self.public_message(),
        };

        let mut response = (status, Json(body)).into_response();
        if let AuthError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

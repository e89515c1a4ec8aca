use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Authorization role of a user. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// The other role; used by the admin role toggle.
    pub fn toggled(self) -> Role {
        match self {
            Role::User => Role::Admin,
            Role::Admin => Role::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// A registered account.
///
/// Maps directly to the `users` table. The email is stored normalized
/// (trimmed, lowercased) and is unique case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Stable opaque identifier, assigned at creation and never reused.
    pub id: i64,
    pub email: String,
    /// Adaptive hash of the password with embedded salt.
    ///
    /// Marked with `#[serde(skip_serializing)]` to prevent accidental
    /// exposure in API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Credentials submitted to the JSON sign-in endpoint.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Body accepted by the token verify/refresh endpoints. The token may come
/// from this body or from the Authorization header.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub token: Option<String>,
}

/// Credentials submitted by the browser sign-in form.
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Fields submitted by the browser sign-up form.
#[derive(Debug, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
}

/// Fields submitted by the browser password-change form.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    pub current_password: String,
    pub new_password: String,
}

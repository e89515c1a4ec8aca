//! Data Models
//!
//! Domain entities and the request/response payloads exchanged with both
//! HTTP surfaces. Request payloads are explicit DTOs validated by hand;
//! nothing is bound into domain entities reflectively.

pub mod session;
pub mod user;

pub use session::Session;
pub use user::{
    ChangePasswordForm, Role, SignInForm, SignInRequest, SignUpForm, TokenRequest, User,
};

use serde::Serialize;

/// Error body returned by the JSON API surface.
///
/// `error` is a short machine-readable code (e.g. `InvalidCredentials`);
/// `message` is the human-readable explanation.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Public view of a user, as embedded in API responses.
/// `userId` is always emitted as an integer; that is the canonical wire form.
#[derive(Debug, Serialize)]
pub struct UserPayload {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserPayload {
    fn from(user: &User) -> Self {
        UserPayload {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

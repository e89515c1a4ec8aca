//! Authentication Engine
//!
//! The service layer orchestrates the password hasher, token codec, and the
//! user/session stores behind the operations both HTTP surfaces call. The
//! error taxonomy lives here too; handlers map kinds to responses in one
//! place and never match on transport errors.

pub mod auth; // Sign-up/sign-in/sign-out, tokens, admin operations
pub mod error; // Error taxonomy and HTTP mapping

pub use auth::AuthService;
pub use error::AuthError;

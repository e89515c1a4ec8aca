//! Password Hashing
//!
//! One-way hashing and constant-time verification of user passwords using
//! bcrypt. The work factor is deliberately slow and each digest embeds its
//! own random 128-bit salt. Callers must run these on a blocking thread;
//! see [`crate::service::auth`].

use std::sync::OnceLock;

use crate::service::error::AuthError;

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum accepted password length. bcrypt only reads the first 72 bytes;
/// rejecting beyond this keeps "accepted" and "verified" aligned.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hashes a plaintext password.
///
/// Rejects passwords shorter than [`MIN_PASSWORD_LEN`] characters with
/// [`AuthError::WeakPassword`] and longer than [`MAX_PASSWORD_BYTES`] bytes
/// with [`AuthError::PasswordTooLong`].
pub fn hash(plaintext: &str) -> Result<String, AuthError> {
    if plaintext.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    if plaintext.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::PasswordTooLong);
    }

    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST).map_err(|err| {
        tracing::error!(error = %err, "Password hashing failed");
        AuthError::Hashing
    })
}

/// Verifies a plaintext password against a stored digest.
///
/// Empty or malformed digests verify to false; the caller cannot tell a
/// malformed digest apart from a plain mismatch. Never panics.
pub fn verify(digest: &str, plaintext: &str) -> bool {
    bcrypt::verify(plaintext, digest).unwrap_or(false)
}

/// A fixed digest verified against when the user does not exist, so the
/// sign-in path performs the same hash work either way. See
/// [`crate::service::auth::AuthService::sign_in`].
pub fn dummy_digest() -> &'static str {
    static DUMMY_DIGEST: OnceLock<String> = OnceLock::new();

    DUMMY_DIGEST.get_or_init(|| {
        match bcrypt::hash("plausible-but-wrong", bcrypt::DEFAULT_COST) {
            Ok(digest) => digest,
            Err(err) => {
                tracing::error!(error = %err, "Failed to generate dummy digest");
                "$2b$12$eImiTXuWVxfM37uY4JANjQPzMzXZjQDzqzQpMv0xoGrTplPPNaE3W".to_string()
            }
        }
    })
}

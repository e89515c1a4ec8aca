//! Bearer Token Codec
//!
//! Issues and validates the compact HMAC-signed tokens that sibling services
//! under the parent domain verify independently with the shared signing
//! secret. Tokens are three base64url segments (`header.payload.signature`)
//! signed with HMAC-SHA-256; the header is always `{alg:"HS256",typ:"JWT"}`.
//!
//! Wire claim names are load-bearing: sibling services read them. Writers
//! always emit `userId` as an integer; the read side additionally accepts a
//! string value and the legacy key `user_id`.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::User;

/// Bearer token lifetime in seconds (7 days).
pub const TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Why a token failed verification. The middleware treats every variant as
/// "unauthenticated"; the distinction exists for internal logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token is expired")]
    Expired,
    #[error("token issuer is not trusted")]
    WrongIssuer,
}

/// Claims carried in a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Canonical wire form is an integer; strings are accepted on read for
    /// legacy tokens, as is the old `user_id` key.
    #[serde(
        rename = "userId",
        alias = "user_id",
        deserialize_with = "integer_or_string"
    )]
    pub user_id: i64,
    pub email: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch. A token is invalid at `exp`
    /// exactly, not one second later.
    pub exp: i64,
    /// Issuer; must equal the configured issuer string.
    pub iss: String,
}

/// Produces and validates bearer tokens with a fixed secret and issuer.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: &str) -> Self {
        TokenCodec {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
        }
    }

    /// Issues a fresh token for a user, valid for [`TOKEN_TTL_SECONDS`].
    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_claims(user.id, &user.email)
    }

    /// Issues a new token preserving the identity of existing claims, with
    /// fresh `iat`/`exp`. The associated session, if any, is untouched.
    pub fn refresh(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_claims(claims.user_id, &claims.email)
    }

    fn issue_claims(&self, user_id: i64, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            email: email.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECONDS,
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Verifies a token and returns its claims.
    ///
    /// Rejects tokens that are not three segments, whose header `alg` is not
    /// HS256, whose signature does not match (compared in constant time by
    /// the underlying crypto), that are expired (`exp <= now`), or whose
    /// issuer differs from the configured one.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
                ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => TokenError::WrongIssuer,
                _ => TokenError::Malformed,
            }
        })?;

        // The library's expiry boundary is exclusive; the contract here is
        // that a token with exp == now is already invalid.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}

/// Accepts the user ID as a JSON integer or a numeric string.
fn integer_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl serde::de::Visitor<'_> for IdVisitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an integer or a string containing an integer")
        }

        fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<i64, E> {
            Ok(value)
        }

        fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<i64, E> {
            i64::try_from(value).map_err(|_| E::custom("user id out of range"))
        }

        fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<i64, E> {
            value
                .trim()
                .parse()
                .map_err(|_| E::custom("user id is not numeric"))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            "an-adequately-long-test-signing-secret-0123456789",
            "passport.example.com",
        )
    }

    fn test_user() -> User {
        User {
            id: 42,
            email: "alice@example.com".to_string(),
            password_hash: "digest".to_string(),
            role: crate::models::Role::User,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Signs an arbitrary payload with the codec's algorithm and secret.
    fn sign_raw(payload: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(b"an-adequately-long-test-signing-secret-0123456789"),
        )
        .unwrap()
    }

    #[test]
    fn issue_then_verify_round_trip() {
        let codec = codec();
        let user = test_user();

        let token = codec.issue(&user).unwrap();
        let claims = codec.verify(&token).unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.iss, "passport.example.com");
        assert_eq!(claims.exp, claims.iat + TOKEN_TTL_SECONDS);
    }

    #[test]
    fn refresh_preserves_identity() {
        let codec = codec();
        let token = codec.issue(&test_user()).unwrap();
        let claims = codec.verify(&token).unwrap();

        let refreshed = codec.refresh(&claims).unwrap();
        let again = codec.verify(&refreshed).unwrap();
        let twice = codec.verify(&codec.refresh(&again).unwrap()).unwrap();

        assert_eq!(twice.user_id, claims.user_id);
        assert_eq!(twice.email, claims.email);
    }

    #[test]
    fn two_segments_is_malformed() {
        let codec = codec();
        let token = codec.issue(&test_user()).unwrap();
        let truncated = token.rsplit_once('.').unwrap().0;

        assert_eq!(codec.verify(truncated), Err(TokenError::Malformed));
        assert_eq!(codec.verify("definitely-not-a-token"), Err(TokenError::Malformed));
    }

    #[test]
    fn tampered_signature_rejected() {
        let codec = codec();
        let token = codec.issue(&test_user()).unwrap();
        let (body, sig) = token.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{body}.{flipped}{}", &sig[1..]);

        assert_eq!(codec.verify(&tampered), Err(TokenError::BadSignature));
    }

    #[test]
    fn foreign_secret_rejected() {
        let other = TokenCodec::new(
            "a-completely-different-signing-secret-abcdefgh",
            "passport.example.com",
        );
        let token = other.issue(&test_user()).unwrap();

        assert_eq!(codec().verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn expiry_boundary() {
        let codec = codec();
        let now = Utc::now().timestamp();

        let at_now = sign_raw(json!({
            "userId": 42, "email": "alice@example.com",
            "iat": now - 60, "exp": now, "iss": "passport.example.com",
        }));
        assert_eq!(codec.verify(&at_now), Err(TokenError::Expired));

        let just_ahead = sign_raw(json!({
            "userId": 42, "email": "alice@example.com",
            "iat": now - 60, "exp": now + 5, "iss": "passport.example.com",
        }));
        assert!(codec.verify(&just_ahead).is_ok());
    }

    #[test]
    fn wrong_issuer_rejected() {
        let codec = codec();
        let now = Utc::now().timestamp();

        let foreign = sign_raw(json!({
            "userId": 42, "email": "alice@example.com",
            "iat": now, "exp": now + 600, "iss": "other.example.org",
        }));
        assert_eq!(codec.verify(&foreign), Err(TokenError::WrongIssuer));

        let missing = sign_raw(json!({
            "userId": 42, "email": "alice@example.com",
            "iat": now, "exp": now + 600,
        }));
        assert_eq!(codec.verify(&missing), Err(TokenError::WrongIssuer));
    }

    #[test]
    fn legacy_claim_forms_accepted() {
        let codec = codec();
        let now = Utc::now().timestamp();

        // Old writers emitted the user id as a string.
        let stringly = sign_raw(json!({
            "userId": "42", "email": "alice@example.com",
            "iat": now, "exp": now + 600, "iss": "passport.example.com",
        }));
        assert_eq!(codec.verify(&stringly).unwrap().user_id, 42);

        // Older writers still used the snake_case key.
        let snake = sign_raw(json!({
            "user_id": 42, "email": "alice@example.com",
            "iat": now, "exp": now + 600, "iss": "passport.example.com",
        }));
        assert_eq!(codec.verify(&snake).unwrap().user_id, 42);
    }

    #[test]
    fn writers_emit_canonical_integer_user_id() {
        let codec = codec();
        let token = codec.issue(&test_user()).unwrap();
        let payload_b64 = token.split('.').nth(1).unwrap();

        use base64ct::{Base64UrlUnpadded, Encoding};
        let payload = Base64UrlUnpadded::decode_vec(payload_b64).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert!(value.get("userId").unwrap().is_i64());
        assert!(value.get("user_id").is_none());
    }
}

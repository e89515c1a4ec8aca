//! Cross-Site Request Forgery Protection
//!
//! Synchronizer-token pattern for the browser surface. A token is 32 random
//! bytes plus an HMAC-SHA-256 signature over those bytes, both base64url
//! encoded and joined with a dot. The token is bound to the caller via the
//! `csrf_token` cookie; mutating form requests must echo it back in the
//! `x-csrf-token` header or the `csrf_token` form field. Cookie and echo are
//! compared in constant time and the cookie's signature must verify.
//!
//! Tokens are deliberately not bound to a user: the sign-in and sign-up
//! forms need protection before any identity exists.
//!
//! The JSON API surface is exempt; it authenticates with bearer tokens and
//! is not cookie-driven from the browser.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// HMAC-SHA256 type alias for token signing
type HmacSha256 = Hmac<Sha256>;

/// Name of the CSRF cookie.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// Name of the CSRF HTTP header.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Name of the CSRF form field.
pub const CSRF_FORM_FIELD: &str = "csrf_token";

/// CSRF cookie time-to-live in seconds (24 hours).
pub const CSRF_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Size of the random token body in bytes.
const NONCE_LEN: usize = 32;

/// Issues and validates CSRF tokens with a fixed secret.
pub struct CsrfProtect {
    secret: Vec<u8>,
}

impl CsrfProtect {
    pub fn new(secret: &str) -> Self {
        CsrfProtect {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Mints a new token: `base64url(nonce) "." base64url(hmac(nonce))`.
    pub fn mint(&self) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let signature = self.sign(&nonce);
        format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(&nonce),
            Base64UrlUnpadded::encode_string(&signature)
        )
    }

    /// Validates a token's structure and signature. Expiry is enforced by
    /// the cookie's Max-Age, not by the token itself.
    pub fn validate(&self, token: &str) -> bool {
        let Some((nonce_b64, signature_b64)) = token.split_once('.') else {
            return false;
        };
        let Ok(nonce) = Base64UrlUnpadded::decode_vec(nonce_b64) else {
            return false;
        };
        let Ok(signature) = Base64UrlUnpadded::decode_vec(signature_b64) else {
            return false;
        };
        if nonce.len() != NONCE_LEN {
            return false;
        }

        let expected = self.sign(&nonce);
        expected.len() == signature.len() && bool::from(expected.ct_eq(&signature))
    }

    fn sign(&self, nonce: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(nonce);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time equality of the cookie value and the echoed token.
pub fn tokens_match(cookie_value: &str, echoed: &str) -> bool {
    let a = cookie_value.as_bytes();
    let b = echoed.as_bytes();
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protect() -> CsrfProtect {
        CsrfProtect::new("a-long-enough-csrf-test-secret-0123456789")
    }

    #[test]
    fn minted_token_validates() {
        let csrf = protect();
        let token = csrf.mint();
        assert!(csrf.validate(&token));
    }

    #[test]
    fn each_mint_is_unique() {
        let csrf = protect();
        assert_ne!(csrf.mint(), csrf.mint());
    }

    #[test]
    fn tampered_token_rejected() {
        let csrf = protect();
        let token = csrf.mint();
        let (nonce, sig) = token.split_once('.').unwrap();

        let flipped = if nonce.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{flipped}{}.{sig}", &nonce[1..]);
        assert!(!csrf.validate(&tampered));
    }

    #[test]
    fn garbage_rejected() {
        let csrf = protect();
        assert!(!csrf.validate(""));
        assert!(!csrf.validate("no-dot-here"));
        assert!(!csrf.validate("!!!.###"));
        assert!(!csrf.validate("c2hvcnQ.c2ln")); // nonce too short
    }

    #[test]
    fn foreign_secret_rejected() {
        let token = CsrfProtect::new("some-other-secret-value-0123456789abc").mint();
        assert!(!protect().validate(&token));
    }

    #[test]
    fn token_comparison_requires_equality() {
        assert!(tokens_match("abc.def", "abc.def"));
        assert!(!tokens_match("abc.def", "abc.deg"));
        assert!(!tokens_match("abc.def", "abc.de"));
    }
}

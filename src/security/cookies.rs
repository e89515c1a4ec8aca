//! Cookie Contract
//!
//! Central builders for every cookie this service sets. Sibling subdomains
//! share the bearer-token and session cookies via the parent `Domain`
//! attribute; the CSRF cookie stays host-only. All cookies are `HttpOnly`
//! and `SameSite=Lax`, with `Secure` added in production.
//!
//! The legacy bearer-token cookie is accepted on read by the middleware but
//! is never written; there is intentionally no builder for it here.

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::config::AppConfig;
use crate::security::csrf::{CSRF_COOKIE_NAME, CSRF_TOKEN_TTL_SECONDS};
use crate::security::token::TOKEN_TTL_SECONDS;

/// Name of the session-ID cookie.
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Builds the primary bearer-token cookie, shared across the parent domain.
pub fn token_cookie(config: &AppConfig, token: &str) -> Cookie<'static> {
    let mut cookie = base_cookie(config, config.cookie_name.clone(), token.to_owned());
    cookie.set_domain(config.parent_domain().to_string());
    cookie.set_max_age(TimeDuration::seconds(TOKEN_TTL_SECONDS));
    cookie
}

/// Builds the session-ID cookie, shared across the parent domain.
pub fn session_cookie(config: &AppConfig, session_id: &str) -> Cookie<'static> {
    let mut cookie = base_cookie(config, SESSION_COOKIE_NAME, session_id.to_owned());
    cookie.set_domain(config.parent_domain().to_string());
    cookie.set_max_age(TimeDuration::seconds(config.session_lifetime.as_secs() as i64));
    cookie
}

/// Builds the CSRF cookie. Host-only: cross-subdomain form posts are not
/// part of the sibling protocol.
pub fn csrf_cookie(config: &AppConfig, token: &str) -> Cookie<'static> {
    let mut cookie = base_cookie(config, CSRF_COOKIE_NAME, token.to_owned());
    cookie.set_max_age(TimeDuration::seconds(CSRF_TOKEN_TTL_SECONDS));
    cookie
}

/// Builds a removal cookie for the primary bearer-token cookie.
pub fn token_cookie_removal(config: &AppConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(config, config.cookie_name.clone(), String::new());
    cookie.set_domain(config.parent_domain().to_string());
    expire(&mut cookie);
    cookie
}

/// Builds a removal cookie for the session-ID cookie.
pub fn session_cookie_removal(config: &AppConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(config, SESSION_COOKIE_NAME, String::new());
    cookie.set_domain(config.parent_domain().to_string());
    expire(&mut cookie);
    cookie
}

fn expire(cookie: &mut Cookie<'static>) {
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie.set_max_age(TimeDuration::seconds(0));
}

fn base_cookie(config: &AppConfig, name: impl Into<String>, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.into(), value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);

    if config.cookies_secure() {
        cookie.set_secure(true);
    }

    cookie
}

/// Appends a cookie to the response headers.
pub fn append(headers: &mut HeaderMap, cookie: Cookie<'static>) {
    if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
        headers.append(SET_COOKIE, value);
    } else {
        // Unreachable with the values built above.
        tracing::error!(cookie = %cookie.name(), "Failed to serialize cookie for Set-Cookie header");
    }
}

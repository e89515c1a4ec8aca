//! CSRF Enforcement Middleware
//!
//! Applies the synchronizer-token pattern from [`crate::security::csrf`] to
//! the browser surface. Safe-method requests that arrive without a valid
//! CSRF cookie get one minted; unsafe requests must echo the cookie's value
//! in the `x-csrf-token` header or the `csrf_token` form field. The JSON
//! API under `/api/` is exempt: it authenticates with bearer tokens and is
//! not cookie-driven from the browser.
//!
//! The minted (or validated) token is inserted into request extensions so
//! form-rendering handlers can embed it.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::config::AppState;
use crate::security::cookies;
use crate::security::csrf::{tokens_match, CSRF_COOKIE_NAME, CSRF_FORM_FIELD, CSRF_HEADER_NAME};
use crate::views;

/// Largest form body the guard will buffer while looking for the token.
/// Matches the credential-endpoint body limit.
const FORM_BODY_LIMIT: usize = 64 * 1024;

/// The caller's CSRF token, minted or validated, for embedding in forms.
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

pub async fn csrf_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // Bearer-authenticated surface; the synchronizer token does not apply.
    if request.uri().path().starts_with("/api/") {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    let cookie_token = jar
        .get(CSRF_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| state.csrf.validate(token));

    if is_safe_method(request.method()) {
        let (token, minted) = match cookie_token {
            Some(token) => (token, false),
            None => (state.csrf.mint(), true),
        };

        let mut request = request;
        request.extensions_mut().insert(CsrfToken(token.clone()));
        let mut response = next.run(request).await;

        if minted {
            cookies::append(
                response.headers_mut(),
                cookies::csrf_cookie(&state.config, &token),
            );
        }
        return response;
    }

    // Unsafe method: the cookie must exist, its signature must hold, and
    // the client must echo it back.
    let Some(cookie_token) = cookie_token else {
        return reject("Missing or invalid CSRF cookie");
    };

    let header_echo = request
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (echoed, request) = match header_echo {
        Some(token) => (Some(token), request),
        None => match form_field_echo(request).await {
            Ok(pair) => pair,
            Err(response) => return response,
        },
    };

    let Some(echoed) = echoed else {
        return reject("Missing CSRF token");
    };
    if !tokens_match(&cookie_token, &echoed) {
        return reject("CSRF token mismatch");
    }

    let mut request = request;
    request.extensions_mut().insert(CsrfToken(cookie_token));
    next.run(request).await
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Pulls the echoed token out of an urlencoded form body, then rebuilds the
/// request so the handler can still read it.
async fn form_field_echo(request: Request) -> Result<(Option<String>, Request), Response> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if !is_form {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, FORM_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to buffer form body for CSRF check");
            return Err(reject("Request could not be verified"));
        }
    };

    let echoed = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == CSRF_FORM_FIELD)
        .map(|(_, value)| value.into_owned());

    Ok((echoed, Request::from_parts(parts, Body::from(bytes))))
}

fn reject(reason: &'static str) -> Response {
    tracing::warn!(reason, "CSRF rejection");
    (
        StatusCode::FORBIDDEN,
        Html(views::forbidden_page("Request could not be verified")),
    )
        .into_response()
}

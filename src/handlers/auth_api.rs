//! JSON API Surface
//!
//! Programmatic authentication under `/api/auth`, used by sibling services
//! and single-page frontends. Authenticates with bearer tokens (header or
//! shared cookie); exempt from CSRF. Every failure returns the structured
//! `{success:false, error, message}` body via [`AuthError`].

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::config::AppState;
use crate::middleware::auth::{bearer_token, CurrentUser};
use crate::models::{SignInRequest, TokenRequest, UserPayload};
use crate::security::cookies::{self, SESSION_COOKIE_NAME};
use crate::service::AuthError;

#[derive(Debug, Serialize)]
struct SignInResponse {
    success: bool,
    token: String,
    user: UserPayload,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyResponse {
    valid: bool,
    user: UserPayload,
}

#[derive(Debug, Serialize)]
struct SignOutResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    user: UserPayload,
}

/// POST /api/auth/signin - verify credentials, open a session, return the
/// bearer token. The shared cookies are set as well so a browser-based
/// sibling frontend is signed in across the parent domain.
pub async fn signin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignInRequest>,
) -> Result<Response, AuthError> {
    let ip = forwarded_ip_string(&headers);
    let agent = agent_string(&headers);

    let (user, session, token) = state
        .auth
        .sign_in(&payload.email, &payload.password, &ip, &agent)
        .await?;

    let mut response_headers = HeaderMap::new();
    cookies::append(
        &mut response_headers,
        cookies::token_cookie(&state.config, &token),
    );
    cookies::append(
        &mut response_headers,
        cookies::session_cookie(&state.config, &session.id),
    );

    let body = SignInResponse {
        success: true,
        token,
        user: UserPayload::from(&user),
    };
    Ok((response_headers, Json(body)).into_response())
}

/// DELETE /api/auth/signout - terminate the session named by the cookie,
/// if any, and clear the shared cookies. Idempotent.
pub async fn signout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AuthError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        state.auth.sign_out(cookie.value()).await?;
    }

    let mut headers = HeaderMap::new();
    cookies::append(&mut headers, cookies::token_cookie_removal(&state.config));
    cookies::append(&mut headers, cookies::session_cookie_removal(&state.config));

    Ok((headers, Json(SignOutResponse { success: true })).into_response())
}

/// POST /api/auth/verify - validate a token presented in the body or the
/// Authorization header. This is the sibling-service path: it succeeds on
/// any valid token for a live user, session store or not.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyResponse>, AuthError> {
    let token = token_from_request(&headers, &body)?;
    let user = state.auth.verify_token(&token).await?;

    Ok(Json(VerifyResponse {
        valid: true,
        user: UserPayload::from(&user),
    }))
}

/// POST /api/auth/refresh - exchange a valid token for a fresh one. The
/// primary cookie is updated alongside the body.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AuthError> {
    let token = token_from_request(&headers, &body)?;
    let (fresh, user) = state.auth.refresh(&token).await?;

    let mut response_headers = HeaderMap::new();
    cookies::append(
        &mut response_headers,
        cookies::token_cookie(&state.config, &fresh),
    );

    let body = SignInResponse {
        success: true,
        token: fresh,
        user: UserPayload::from(&user),
    };
    Ok((response_headers, Json(body)).into_response())
}

/// GET /api/auth/user - identity of the resolved caller. The guard has
/// already rejected anonymous requests.
pub async fn user(CurrentUser(user): CurrentUser) -> (StatusCode, Json<UserResponse>) {
    (
        StatusCode::OK,
        Json(UserResponse {
            user: UserPayload::from(&user),
        }),
    )
}

/// Token from the Authorization header, else from an optional JSON body
/// `{token}`. An empty body is fine; a present-but-unreadable one is not.
fn token_from_request(headers: &HeaderMap, body: &Bytes) -> Result<String, AuthError> {
    if let Some(token) = bearer_token(headers) {
        return Ok(token);
    }

    if !body.is_empty() {
        let request: TokenRequest =
            serde_json::from_slice(body).map_err(|_| AuthError::Unauthenticated)?;
        if let Some(token) = request.token.filter(|t| !t.trim().is_empty()) {
            return Ok(token);
        }
    }

    Err(AuthError::Unauthenticated)
}

fn forwarded_ip_string(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

fn agent_string(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

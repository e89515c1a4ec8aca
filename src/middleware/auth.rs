//! Authentication Middleware
//!
//! Runs before every routed handler and resolves the caller's identity,
//! trying each credential source in a fixed precedence order and stopping
//! at the first that works:
//!
//! 1. `Authorization: Bearer <token>` header
//! 2. the primary bearer-token cookie
//! 3. the legacy bearer-token cookie (migration reads; never written)
//! 4. the `session_id` cookie
//!
//! On success the resolved user lands in the request extensions; on failure
//! nothing is attached and the request proceeds anonymously. The guard
//! middlewares below enforce "authenticated" / "admin" on top, with
//! JSON outcomes on the API surface and redirects on the browser surface.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::config::AppState;
use crate::models::User;
use crate::security::cookies::SESSION_COOKIE_NAME;
use crate::service::AuthError;
use crate::views;

/// The resolved caller, carried through request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Extractor for handlers that tolerate anonymous callers.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<CurrentUser>().map(|c| c.0.clone()),
        ))
    }
}

/// Identity-resolution middleware. Never rejects; anonymous requests pass
/// through untouched.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(user) = identify(&state, request.headers()).await {
        request.extensions_mut().insert(CurrentUser(user));
    }
    next.run(request).await
}

async fn identify(state: &AppState, headers: &HeaderMap) -> Option<User> {
    if let Some(token) = bearer_token(headers) {
        if let Some(user) = state.auth.resolve_from_token(&token).await {
            return Some(user);
        }
    }

    let jar = CookieJar::from_headers(headers);

    if let Some(cookie) = jar.get(&state.config.cookie_name) {
        if let Some(user) = state.auth.resolve_from_token(cookie.value()).await {
            return Some(user);
        }
    }

    if let Some(cookie) = jar.get(&state.config.legacy_cookie_name) {
        if let Some(user) = state.auth.resolve_from_token(cookie.value()).await {
            return Some(user);
        }
    }

    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        if let Some(user) = state.auth.resolve_from_session(cookie.value()).await {
            return Some(user);
        }
    }

    None
}

/// Extracts a Bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if scheme.eq_ignore_ascii_case("Bearer") && !token.trim().is_empty() {
        return Some(token.trim().to_string());
    }
    None
}

/// API guard: anonymous callers receive a JSON 401.
pub async fn require_authenticated_api(
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if request.extensions().get::<CurrentUser>().is_none() {
        return Err(AuthError::Unauthenticated);
    }
    Ok(next.run(request).await)
}

/// API guard: authenticated non-admins receive a JSON 403.
pub async fn require_admin_api(request: Request, next: Next) -> Result<Response, AuthError> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .map(|current| current.0.is_admin());

    match is_admin {
        None => Err(AuthError::Unauthenticated),
        Some(false) => Err(AuthError::Forbidden),
        Some(true) => Ok(next.run(request).await),
    }
}

/// Browser guard: anonymous callers are redirected to the sign-in form,
/// carrying the requested path so it can be resumed after sign-in.
pub async fn require_authenticated_browser(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_none() {
        return redirect_to_sign_in(&request);
    }
    next.run(request).await
}

/// Browser guard: anonymous callers are redirected to sign-in; signed-in
/// non-admins get a 403 page.
pub async fn require_admin_browser(request: Request, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .map(|current| current.0.is_admin());

    match is_admin {
        None => redirect_to_sign_in(&request),
        Some(false) => (
            StatusCode::FORBIDDEN,
            Html(views::forbidden_page("Admin privileges required")),
        )
            .into_response(),
        Some(true) => next.run(request).await,
    }
}

fn redirect_to_sign_in(request: &Request) -> Response {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("returnTo", target)
        .finish();
    Redirect::to(&format!("/sign_in?{query}")).into_response()
}

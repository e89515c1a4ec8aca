//! Browser Surface Handlers
//!
//! Form-driven sign-in, sign-up, sign-out, password change, the dashboard,
//! and the liveness endpoint. Successful mutations redirect; failures
//! re-render the form with a short generic message and never echo the
//! submitted password.

use axum::{
    extract::{Query, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::config::{AppConfig, AppState};
use crate::middleware::auth::{CurrentUser, MaybeUser};
use crate::middleware::csrf::CsrfToken;
use crate::models::{ChangePasswordForm, SignInForm, SignUpForm};
use crate::security::cookies::{self, SESSION_COOKIE_NAME};
use crate::service::AuthError;
use crate::views;

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(rename = "returnTo")]
    return_to: Option<String>,
}

/// GET /up - liveness. 200 whenever the process can serve requests.
pub async fn up() -> StatusCode {
    StatusCode::OK
}

/// GET / - dashboard for the signed-in, landing page for everyone else.
pub async fn home(
    MaybeUser(user): MaybeUser,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
) -> Html<String> {
    match user {
        Some(user) => Html(views::dashboard_page(&user, &csrf_token)),
        None => Html(views::landing_page()),
    }
}

/// GET /sign_in - render the sign-in form.
pub async fn sign_in_form(
    Query(query): Query<SignInQuery>,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
) -> Html<String> {
    Html(views::sign_in_page(
        &csrf_token,
        query.return_to.as_deref(),
        None,
    ))
}

/// POST /sign_in - verify credentials, set the shared cookies, redirect.
pub async fn sign_in_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
    Form(form): Form<SignInForm>,
) -> Response {
    let ip = client_ip_string(&headers);
    let agent = user_agent(&headers);

    match state
        .auth
        .sign_in(&form.email, &form.password, &ip, &agent)
        .await
    {
        Ok((_user, session, token)) => {
            let target = sanitize_return_to(&state.config, form.return_to.as_deref());
            signed_in_response(&state.config, &session.id, &token, &target)
        }
        Err(AuthError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            Html(views::sign_in_page(
                &csrf_token,
                form.return_to.as_deref(),
                Some("Invalid email or password"),
            )),
        )
            .into_response(),
        Err(err) => (
            err.status(),
            Html(views::sign_in_page(
                &csrf_token,
                form.return_to.as_deref(),
                Some(err.public_message().as_str()),
            )),
        )
            .into_response(),
    }
}

/// GET /sign_up - render the sign-up form.
pub async fn sign_up_form(
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
) -> Html<String> {
    Html(views::sign_up_page(&csrf_token, None))
}

/// POST /sign_up - create the account and sign it in.
pub async fn sign_up_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
    Form(form): Form<SignUpForm>,
) -> Response {
    let ip = client_ip_string(&headers);
    let agent = user_agent(&headers);

    match state
        .auth
        .sign_up(&form.email, &form.password, &ip, &agent)
        .await
    {
        Ok((_user, session, token)) => signed_in_response(&state.config, &session.id, &token, "/"),
        Err(err) => (
            err.status(),
            Html(views::sign_up_page(
                &csrf_token,
                Some(err.public_message().as_str()),
            )),
        )
            .into_response(),
    }
}

/// POST or DELETE /sign_out - terminate the session, clear cookies.
/// Idempotent: signing out twice lands in the same place.
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        if let Err(err) = state.auth.sign_out(cookie.value()).await {
            tracing::error!(error = %err, "Session delete failed during sign-out");
        }
    }

    let mut headers = HeaderMap::new();
    clear_auth_cookies(&state.config, &mut headers);
    (headers, Redirect::to("/")).into_response()
}

/// GET /password - render the password-change form.
pub async fn password_form(
    _user: CurrentUser,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
) -> Html<String> {
    Html(views::password_page(&csrf_token, None))
}

/// POST /password - change the password. Every session is revoked, this
/// one included, so the browser is sent back to the sign-in form.
pub async fn password_submit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    match state
        .auth
        .change_password(user.id, &form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {
            let mut headers = HeaderMap::new();
            clear_auth_cookies(&state.config, &mut headers);
            (headers, Redirect::to("/sign_in")).into_response()
        }
        Err(err) => (
            err.status(),
            Html(views::password_page(
                &csrf_token,
                Some(err.public_message().as_str()),
            )),
        )
            .into_response(),
    }
}

/// Sets the shared auth cookies and redirects to the post-login target.
fn signed_in_response(
    config: &AppConfig,
    session_id: &str,
    token: &str,
    target: &str,
) -> Response {
    let mut headers = HeaderMap::new();
    cookies::append(&mut headers, cookies::token_cookie(config, token));
    cookies::append(&mut headers, cookies::session_cookie(config, session_id));
    (headers, Redirect::to(target)).into_response()
}

fn clear_auth_cookies(config: &AppConfig, headers: &mut HeaderMap) {
    cookies::append(headers, cookies::token_cookie_removal(config));
    cookies::append(headers, cookies::session_cookie_removal(config));
}

/// Validates a `returnTo` value against the open-redirect policy: relative
/// paths pass through, absolute URLs must point at the parent domain, a
/// direct subdomain, or an allowlisted host. Anything else falls back to
/// the default destination.
pub fn sanitize_return_to(config: &AppConfig, raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return "/".to_string();
    };

    // Relative path on this host. "//host" is scheme-relative, not local.
    if raw.starts_with('/') && !raw.starts_with("//") {
        return raw.to_string();
    }

    if let Ok(parsed) = url::Url::parse(raw) {
        let scheme_ok = parsed.scheme() == "http" || parsed.scheme() == "https";
        let host_ok = parsed
            .host_str()
            .map(|host| config.host_is_trusted(host))
            .unwrap_or(false);
        if scheme_ok && host_ok {
            return raw.to_string();
        }
    }

    tracing::debug!(return_to = raw, "Rejected returnTo target");
    "/".to_string()
}

/// Client address as recorded on sessions: first `X-Forwarded-For` entry,
/// then `X-Real-IP`, then unknown. Behind the trusted proxy this is the
/// real client; everywhere else it is advisory metadata.
fn client_ip_string(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    "unknown".to_string()
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use std::time::Duration;

    fn config() -> AppConfig {
        AppConfig {
            listen_port: 3000,
            database_url: "sqlite::memory:".to_string(),
            signing_secret: "0123456789abcdefghijklmnopqrstuvwxyz".to_string(),
            csrf_secret: "0123456789abcdefghijklmnopqrstuvwxyz".to_string(),
            token_issuer: "passport.example.com".to_string(),
            cookie_parent_domain: ".example.com".to_string(),
            environment: Environment::Production,
            cookie_name: "oh_session".to_string(),
            legacy_cookie_name: "session_token".to_string(),
            rate_limit_signin_limit: 10,
            rate_limit_signin_window: Duration::from_secs(180),
            session_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
            return_to_allowed_hosts: vec!["partner.example.org".to_string()],
        }
    }

    #[test]
    fn relative_paths_pass_through() {
        let config = config();
        assert_eq!(sanitize_return_to(&config, Some("/dashboard")), "/dashboard");
        assert_eq!(sanitize_return_to(&config, Some("/a?b=c")), "/a?b=c");
    }

    #[test]
    fn missing_or_empty_falls_back_to_root() {
        let config = config();
        assert_eq!(sanitize_return_to(&config, None), "/");
        assert_eq!(sanitize_return_to(&config, Some("  ")), "/");
    }

    #[test]
    fn sibling_urls_accepted() {
        let config = config();
        assert_eq!(
            sanitize_return_to(&config, Some("https://app.example.com/inbox")),
            "https://app.example.com/inbox"
        );
        assert_eq!(
            sanitize_return_to(&config, Some("https://partner.example.org/x")),
            "https://partner.example.org/x"
        );
    }

    #[test]
    fn open_redirect_attempts_rejected() {
        let config = config();
        assert_eq!(sanitize_return_to(&config, Some("https://evil.com/")), "/");
        assert_eq!(
            sanitize_return_to(&config, Some("https://example.com.evil.com/")),
            "/"
        );
        assert_eq!(sanitize_return_to(&config, Some("//evil.com/path")), "/");
        assert_eq!(
            sanitize_return_to(&config, Some("javascript:alert(1)")),
            "/"
        );
        assert_eq!(
            sanitize_return_to(&config, Some("https://a.b.example.com/")),
            "/"
        );
    }
}

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower::ServiceExt; // for `oneshot`

use passport_backend::config::{AppConfig, AppState, Environment};
use passport_backend::{db, routes};

fn test_config(environment: Environment) -> AppConfig {
    AppConfig {
        listen_port: 3000,
        database_url: "sqlite::memory:".to_string(),
        signing_secret: "an-adequately-long-test-signing-secret-0123456789".to_string(),
        csrf_secret: "an-adequately-long-test-signing-secret-0123456789".to_string(),
        token_issuer: "passport.example.com".to_string(),
        cookie_parent_domain: ".example.com".to_string(),
        environment,
        cookie_name: "oh_session".to_string(),
        legacy_cookie_name: "session_token".to_string(),
        rate_limit_signin_limit: 10,
        rate_limit_signin_window: Duration::from_secs(180),
        session_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
        return_to_allowed_hosts: Vec::new(),
    }
}

async fn test_app_in(environment: Environment) -> (Router, AppState) {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();

    let state = AppState::new(pool, Arc::new(test_config(environment)));
    (routes::create_router(state.clone()), state)
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

async fn seed_alice(state: &AppState) -> (i64, String, String) {
    let (user, session, token) = state
        .auth
        .sign_up("alice@example.com", "correcthorse", "test", "test")
        .await
        .unwrap();
    (user.id, session.id, token)
}

async fn browser_sign_in(app: &Router, state: &AppState) -> axum::response::Response {
    let csrf = state.csrf.mint();
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sign_in")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::COOKIE, format!("csrf_token={csrf}"))
                .body(Body::from(format!(
                    "email=alice%40example.com&password=correcthorse&csrf_token={csrf}"
                )))
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn sign_in_sets_shared_domain_cookies() {
    let (app, state) = test_app_in(Environment::Test).await;
    seed_alice(&state).await;
    let response = browser_sign_in(&app, &state).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let cookies = set_cookies(&response);
    let token_cookie = cookies
        .iter()
        .find(|c| c.starts_with("oh_session="))
        .expect("primary cookie");
    let session_cookie = cookies
        .iter()
        .find(|c| c.starts_with("session_id="))
        .expect("session cookie");

    for cookie in [token_cookie, session_cookie] {
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Domain=example.com"));
        assert!(cookie.contains("Path=/"));
        // Not production: cookies stay usable over plain HTTP.
        assert!(!cookie.contains("Secure"));
    }
    assert!(token_cookie.contains("Max-Age=604800"));
}

#[tokio::test]
async fn production_cookies_are_secure() {
    let (app, state) = test_app_in(Environment::Production).await;
    seed_alice(&state).await;
    let response = browser_sign_in(&app, &state).await;

    for cookie in set_cookies(&response) {
        if cookie.starts_with("oh_session=") || cookie.starts_with("session_id=") {
            assert!(cookie.contains("Secure"), "missing Secure on: {cookie}");
        }
    }
}

#[tokio::test]
async fn legacy_cookie_name_is_accepted_on_read() {
    let (app, state) = test_app_in(Environment::Test).await;
    let (_, _, token) = seed_alice(&state).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/user")
                .header(header::COOKIE, format!("session_token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // But the service never writes it back.
    let sign_in = browser_sign_in(&app, &state).await;
    assert!(set_cookies(&sign_in)
        .iter()
        .all(|c| !c.starts_with("session_token=")));
}

#[tokio::test]
async fn bearer_header_wins_over_cookies() {
    let (app, state) = test_app_in(Environment::Test).await;
    let (_, _, alice_token) = state
        .auth
        .sign_up("alice@example.com", "correcthorse", "test", "test")
        .await
        .unwrap();
    let (_, bob_session, _) = state
        .auth
        .sign_up("bob@example.com", "correcthorse", "test", "test")
        .await
        .unwrap();

    // Both a header and a (different user's) session cookie are presented;
    // the header is first in precedence.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/user")
                .header(header::AUTHORIZATION, format!("Bearer {alice_token}"))
                .header(header::COOKIE, format!("session_id={}", bob_session.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn invalid_bearer_falls_back_to_the_session_cookie() {
    let (app, state) = test_app_in(Environment::Test).await;
    let (_, session, _) = state
        .auth
        .sign_up("alice@example.com", "correcthorse", "test", "test")
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/user")
                .header(header::AUTHORIZATION, "Bearer not.a.token")
                .header(header::COOKIE, format!("session_id={}", session.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn safe_browser_requests_receive_a_csrf_cookie() {
    let (app, _state) = test_app_in(Environment::Test).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/sign_in")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let cookies = set_cookies(&response);
    let csrf_cookie = cookies
        .iter()
        .find(|c| c.starts_with("csrf_token="))
        .expect("csrf cookie issued");
    assert!(csrf_cookie.contains("Max-Age=86400"));
    // Host-only: no Domain attribute.
    assert!(!csrf_cookie.contains("Domain="));

    // The form embeds the same token that the cookie carries.
    let token = csrf_cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("csrf_token=")
        .to_string();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains(&token));
}

#[tokio::test]
async fn existing_valid_csrf_cookie_is_not_reissued() {
    let (app, state) = test_app_in(Environment::Test).await;
    let csrf = state.csrf.mint();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/sign_in")
                .header(header::COOKIE, format!("csrf_token={csrf}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(set_cookies(&response)
        .iter()
        .all(|c| !c.starts_with("csrf_token=")));
}

#[tokio::test]
async fn api_surface_is_csrf_exempt() {
    let (app, state) = test_app_in(Environment::Test).await;
    state
        .auth
        .sign_up("alice@example.com", "correcthorse", "test", "test")
        .await
        .unwrap();

    // A mutating API request with no CSRF material at all still works.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/signin")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "email": "alice@example.com",
                        "password": "correcthorse",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

//! Router Assembly
//!
//! Every route and the whole middleware pipeline are declared here, in one
//! place. Per-surface guards attach as route layers; the cross-cutting
//! pipeline wraps the merged router. Execution order for a request, outer
//! to inner:
//!
//! 1. CORS (sibling origins, credentials allowed)
//! 2. request body limit
//! 3. security response headers
//! 4. credential rate limiting
//! 5. CSRF enforcement for browser mutations
//! 6. identity resolution
//! 7. per-route authenticated/admin guards
//! 8. the handler

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::AppState;
use crate::handlers::{admin, auth_api, pages};
use crate::middleware as mw;

/// Request bodies are tiny on every surface: credentials and small forms.
const BODY_LIMIT: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route(
            "/admin/users/{id}",
            get(admin::show_user)
                .post(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/admin/users/{id}/toggle_role", post(admin::toggle_role))
        .route(
            "/admin/users/{id}/terminate_sessions",
            post(admin::terminate_sessions),
        )
        .route_layer(from_fn(mw::auth::require_admin_browser));

    let account_routes = Router::new()
        .route(
            "/password",
            get(pages::password_form).post(pages::password_submit),
        )
        .route_layer(from_fn(mw::auth::require_authenticated_browser));

    let browser = Router::new()
        .route("/", get(pages::home))
        .route("/up", get(pages::up))
        .route(
            "/sign_in",
            get(pages::sign_in_form).post(pages::sign_in_submit),
        )
        .route(
            "/sign_up",
            get(pages::sign_up_form).post(pages::sign_up_submit),
        )
        .route("/sign_out", post(pages::sign_out).delete(pages::sign_out))
        .merge(account_routes)
        .merge(admin_routes);

    let api_identity = Router::new()
        .route("/api/auth/user", get(auth_api::user))
        .route_layer(from_fn(mw::auth::require_authenticated_api));

    let api = Router::new()
        .route("/api/auth/signin", post(auth_api::signin))
        .route("/api/auth/signout", delete(auth_api::signout))
        .route("/api/auth/verify", post(auth_api::verify))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .merge(api_identity);

    Router::new()
        .merge(browser)
        .merge(api)
        .layer(from_fn_with_state(state.clone(), mw::auth::resolve_identity))
        .layer(from_fn_with_state(state.clone(), mw::csrf::csrf_guard))
        .layer(from_fn_with_state(
            state.clone(),
            mw::rate_limit::limit_credentials,
        ))
        .layer(from_fn(mw::security::security_headers))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(mw::cors::cors_layer(state.config.clone()))
        .with_state(state)
}

//! Admin User Management (Browser)
//!
//! Listing, inspection, role toggling, deletion, and session termination,
//! all under the admin guard. Mutations come in as forms; the delete uses a
//! `_method=delete` override because HTML forms only speak GET and POST.
//!
//! The self-protection rule is enforced by the service layer; the handlers
//! only translate [`AuthError::CannotModifySelf`] into the operation's
//! specific 403 message.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;

use crate::config::AppState;
use crate::middleware::auth::CurrentUser;
use crate::middleware::csrf::CsrfToken;
use crate::models::Role;
use crate::repositories::{sessions, users};
use crate::service::AuthError;
use crate::views;

const DEFAULT_PER_PAGE: u32 = 25;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MethodOverride {
    #[serde(rename = "_method")]
    method: Option<String>,
}

/// GET /admin/users - paginated listing, searchable by email substring and
/// filterable by role.
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
) -> Result<Html<String>, AuthError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);

    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let role = parse_role(query.role.as_deref());

    let filter = users::UserFilter {
        search: search.clone(),
        role,
    };
    let (page_users, total) = users::list(&state.pool, page, per_page, &filter).await?;

    Ok(Html(views::admin_users_page(
        &page_users,
        total,
        page,
        per_page,
        search.as_deref(),
        role.map(Role::as_str),
        &csrf_token,
    )))
}

/// GET /admin/users/{id} - detail with the user's sessions.
pub async fn show_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(CsrfToken(csrf_token)): Extension<CsrfToken>,
) -> Response {
    let user = match users::find_by_id(&state.pool, id).await {
        Ok(Some(user)) => user,
        Ok(None) => return not_found(),
        Err(err) => return AuthError::from(err).into_response(),
    };
    let user_sessions = match sessions::list_for_user(&state.pool, id).await {
        Ok(list) => list,
        Err(err) => return AuthError::from(err).into_response(),
    };

    Html(views::admin_user_detail_page(&user, &user_sessions, &csrf_token)).into_response()
}

/// POST /admin/users/{id}/toggle_role - flip the target between user and
/// admin. Toggling yourself is refused.
pub async fn toggle_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Response {
    match state.auth.admin_toggle_role(id, actor.id).await {
        Ok(_) => Redirect::to("/admin/users").into_response(),
        Err(AuthError::CannotModifySelf) => (
            StatusCode::FORBIDDEN,
            Html(views::forbidden_page("Cannot modify your own role")),
        )
            .into_response(),
        Err(AuthError::NotFound) => not_found(),
        Err(err) => err.into_response(),
    }
}

/// POST /admin/users/{id} - method-override entry point. Only
/// `_method=delete` is meaningful.
pub async fn update_user(
    state: State<AppState>,
    actor: CurrentUser,
    id: Path<i64>,
    Form(form): Form<MethodOverride>,
) -> Response {
    match form.method.as_deref() {
        Some("delete") => delete_user(state, actor, id).await,
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// DELETE /admin/users/{id} - delete the target and, by cascade, their
/// sessions. Deleting yourself is refused.
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Response {
    match state.auth.admin_delete_user(id, actor.id).await {
        Ok(()) => Redirect::to("/admin/users").into_response(),
        Err(AuthError::CannotModifySelf) => (
            StatusCode::FORBIDDEN,
            Html(views::forbidden_page("Cannot delete your own account")),
        )
            .into_response(),
        Err(AuthError::NotFound) => not_found(),
        Err(err) => err.into_response(),
    }
}

/// POST /admin/users/{id}/terminate_sessions - revoke every session the
/// target holds. Their bearer tokens ride out their expiry.
pub async fn terminate_sessions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.auth.admin_terminate_sessions(id).await {
        Ok(_) => Redirect::to(&format!("/admin/users/{id}")).into_response(),
        Err(err) => err.into_response(),
    }
}

fn parse_role(raw: Option<&str>) -> Option<Role> {
    match raw.map(str::trim) {
        Some("user") => Some(Role::User),
        Some("admin") => Some(Role::Admin),
        _ => None,
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(views::not_found_page("No such user")),
    )
        .into_response()
}

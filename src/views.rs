//! Browser Surface Views
//!
//! Minimal HTML formatting for the structured outcomes the core produces.
//! This is deliberately not a template layer; sibling deployments front the
//! service with their own rendering. Every interpolated value is escaped.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::models::{Session, User};
use crate::security::csrf::CSRF_FORM_FIELD;

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} - Passport</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        text(title),
        body
    )
}

fn csrf_field(csrf_token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{CSRF_FORM_FIELD}\" value=\"{}\">",
        attr(csrf_token)
    )
}

fn error_line(error: Option<&str>) -> String {
    match error {
        Some(message) => format!("<p class=\"error\">{}</p>", text(message)),
        None => String::new(),
    }
}

pub fn landing_page() -> String {
    layout(
        "Welcome",
        "<h1>Passport</h1>\
         <p>Single sign-on for this family of applications.</p>\
         <p><a href=\"/sign_in\">Sign in</a> or <a href=\"/sign_up\">create an account</a>.</p>",
    )
}

pub fn dashboard_page(user: &User, csrf_token: &str) -> String {
    let admin_link = if user.is_admin() {
        "<li><a href=\"/admin/users\">Manage users</a></li>"
    } else {
        ""
    };

    let body = format!(
        "<h1>Signed in as {}</h1>\
         <ul>{admin_link}<li><a href=\"/password\">Change password</a></li></ul>\
         <form method=\"post\" action=\"/sign_out\">{}\
         <button type=\"submit\">Sign out</button></form>",
        text(&user.email),
        csrf_field(csrf_token)
    );
    layout("Dashboard", &body)
}

pub fn sign_in_page(csrf_token: &str, return_to: Option<&str>, error: Option<&str>) -> String {
    let return_to_field = match return_to {
        Some(target) => format!(
            "<input type=\"hidden\" name=\"returnTo\" value=\"{}\">",
            attr(target)
        ),
        None => String::new(),
    };

    let body = format!(
        "<h1>Sign in</h1>{}\
         <form method=\"post\" action=\"/sign_in\">{}{return_to_field}\
         <label>Email <input type=\"email\" name=\"email\" required></label>\
         <label>Password <input type=\"password\" name=\"password\" required></label>\
         <button type=\"submit\">Sign in</button></form>\
         <p>No account? <a href=\"/sign_up\">Sign up</a>.</p>",
        error_line(error),
        csrf_field(csrf_token)
    );
    layout("Sign in", &body)
}

pub fn sign_up_page(csrf_token: &str, error: Option<&str>) -> String {
    let body = format!(
        "<h1>Create account</h1>{}\
         <form method=\"post\" action=\"/sign_up\">{}\
         <label>Email <input type=\"email\" name=\"email\" required></label>\
         <label>Password <input type=\"password\" name=\"password\" required minlength=\"8\"></label>\
         <button type=\"submit\">Sign up</button></form>\
         <p>Already registered? <a href=\"/sign_in\">Sign in</a>.</p>",
        error_line(error),
        csrf_field(csrf_token)
    );
    layout("Sign up", &body)
}

pub fn password_page(csrf_token: &str, error: Option<&str>) -> String {
    let body = format!(
        "<h1>Change password</h1>{}\
         <form method=\"post\" action=\"/password\">{}\
         <label>Current password <input type=\"password\" name=\"current_password\" required></label>\
         <label>New password <input type=\"password\" name=\"new_password\" required minlength=\"8\"></label>\
         <button type=\"submit\">Change password</button></form>\
         <p>Changing your password signs you out everywhere.</p>",
        error_line(error),
        csrf_field(csrf_token)
    );
    layout("Change password", &body)
}

pub fn forbidden_page(message: &str) -> String {
    layout(
        "Forbidden",
        &format!("<h1>Forbidden</h1><p>{}</p>", text(message)),
    )
}

pub fn not_found_page(message: &str) -> String {
    layout(
        "Not found",
        &format!("<h1>Not found</h1><p>{}</p>", text(message)),
    )
}

pub fn too_many_requests_page() -> String {
    layout(
        "Too many attempts",
        "<h1>Too many attempts</h1><p>Please wait a moment and try again.</p>",
    )
}

/// Admin listing: paginated table with per-row role-toggle and delete forms.
#[allow(clippy::too_many_arguments)]
pub fn admin_users_page(
    users: &[User],
    total: i64,
    page: u32,
    per_page: u32,
    search: Option<&str>,
    role: Option<&str>,
    csrf_token: &str,
) -> String {
    let mut rows = String::new();
    for user in users {
        rows.push_str(&format!(
            "<tr><td>{id}</td>\
             <td><a href=\"/admin/users/{id}\">{email}</a></td>\
             <td>{role}</td>\
             <td><form method=\"post\" action=\"/admin/users/{id}/toggle_role\">{csrf}\
             <button type=\"submit\">Toggle role</button></form>\
             <form method=\"post\" action=\"/admin/users/{id}\">{csrf}\
             <input type=\"hidden\" name=\"_method\" value=\"delete\">\
             <button type=\"submit\">Delete</button></form></td></tr>",
            id = user.id,
            email = text(&user.email),
            role = user.role.as_str(),
            csrf = csrf_field(csrf_token),
        ));
    }

    let mut pager = String::new();
    let shown_before = u64::from(page.saturating_sub(1)) * u64::from(per_page);
    if page > 1 {
        pager.push_str(&format!(
            "<a href=\"{}\">Previous</a> ",
            attr(&list_href(page - 1, search, role))
        ));
    }
    if shown_before + (users.len() as u64) < (total as u64) {
        pager.push_str(&format!(
            "<a href=\"{}\">Next</a>",
            attr(&list_href(page + 1, search, role))
        ));
    }

    let body = format!(
        "<h1>Users ({total})</h1>\
         <form method=\"get\" action=\"/admin/users\">\
         <input type=\"search\" name=\"search\" placeholder=\"Email contains\" value=\"{search}\">\
         <select name=\"role\">\
         <option value=\"\">Any role</option>\
         <option value=\"user\"{sel_user}>user</option>\
         <option value=\"admin\"{sel_admin}>admin</option>\
         </select>\
         <button type=\"submit\">Filter</button></form>\
         <table><tr><th>ID</th><th>Email</th><th>Role</th><th></th></tr>{rows}</table>\
         <p>{pager}</p>\
         <p><a href=\"/\">Back</a></p>",
        search = attr(search.unwrap_or("")),
        sel_user = if role == Some("user") { " selected" } else { "" },
        sel_admin = if role == Some("admin") { " selected" } else { "" },
    );
    layout("Users", &body)
}

fn list_href(page: u32, search: Option<&str>, role: Option<&str>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("page", &page.to_string());
    if let Some(search) = search {
        serializer.append_pair("search", search);
    }
    if let Some(role) = role {
        serializer.append_pair("role", role);
    }
    format!("/admin/users?{}", serializer.finish())
}

pub fn admin_user_detail_page(user: &User, sessions: &[Session], csrf_token: &str) -> String {
    let mut session_rows = String::new();
    for session in sessions {
        session_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            text(&session.ip_address),
            text(&session.user_agent),
            session.created_at.to_rfc3339(),
        ));
    }

    let body = format!(
        "<h1>{email}</h1>\
         <p>ID {id} - role {role} - registered {created}</p>\
         <h2>Sessions ({count})</h2>\
         <table><tr><th>IP</th><th>User agent</th><th>Created</th></tr>{session_rows}</table>\
         <form method=\"post\" action=\"/admin/users/{id}/terminate_sessions\">{csrf}\
         <button type=\"submit\">Terminate all sessions</button></form>\
         <form method=\"post\" action=\"/admin/users/{id}/toggle_role\">{csrf}\
         <button type=\"submit\">Toggle role</button></form>\
         <form method=\"post\" action=\"/admin/users/{id}\">{csrf}\
         <input type=\"hidden\" name=\"_method\" value=\"delete\">\
         <button type=\"submit\">Delete user</button></form>\
         <p><a href=\"/admin/users\">Back to users</a></p>",
        email = text(&user.email),
        id = user.id,
        role = user.role.as_str(),
        created = user.created_at.to_rfc3339(),
        count = sessions.len(),
        csrf = csrf_field(csrf_token),
    );
    layout("User detail", &body)
}

//! HTTP Handlers
//!
//! Two surfaces share the authentication engine:
//!
//! - [`pages`] and [`admin`]: the browser surface. HTML forms, redirects,
//!   CSRF-protected mutations.
//! - [`auth_api`]: the JSON API surface under `/api/auth`, authenticated
//!   with bearer tokens and exempt from CSRF.

pub mod admin; // Admin user management (browser)
pub mod auth_api; // JSON API surface
pub mod pages; // Sign-in/sign-up/dashboard (browser)

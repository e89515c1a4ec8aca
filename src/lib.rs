//! Passport - Cross-domain Single Sign-On Service
//!
//! Central authentication authority for a family of sibling web applications
//! sharing a parent DNS domain. Passport verifies credentials, keeps
//! server-side sessions, and mints HMAC-signed bearer tokens that any sibling
//! service holding the shared signing secret can verify on its own, without
//! calling back here.
//!
//! # Modules
//!
//! - [`config`]: environment-driven configuration and shared application state
//! - [`db`]: SQLite connection pooling and schema migrations
//! - [`models`]: domain entities (users, sessions) and API payloads
//! - [`security`]: password hashing, the bearer-token codec, CSRF tokens,
//!   and the cookie contract shared across the parent domain
//! - [`repositories`]: persistence for users and sessions
//! - [`service`]: the authentication engine orchestrating the above
//! - [`middleware`]: identity resolution, authorization guards, rate
//!   limiting, CORS, and security headers
//! - [`handlers`]: the browser (form) and JSON API surfaces
//! - [`routes`]: router assembly; the middleware pipeline is declared there
//!   in one place

pub mod config; // Environment configuration and shared state
pub mod db; // Database operations and migrations
pub mod handlers; // HTTP request handlers
pub mod middleware; // HTTP middleware
pub mod models; // Data structures and API models
pub mod repositories; // Database repositories
pub mod routes; // Route definitions
pub mod security; // Password hashing, tokens, CSRF, cookies
pub mod service; // Authentication engine and error taxonomy
pub mod views; // Minimal HTML formatting for the browser surface

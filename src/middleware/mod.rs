//! HTTP Middleware
//!
//! The pipeline members composed in [`crate::routes`]: identity resolution
//! and authorization guards, the credential-endpoint rate limiter, CSRF
//! enforcement for the browser surface, CORS for the API surface, and
//! defense-in-depth response headers.

pub mod auth; // Identity resolution and authenticated/admin guards
pub mod cors; // Cross-origin policy for sibling domains
pub mod csrf; // CSRF enforcement for browser mutations
pub mod rate_limit; // Per-IP token-bucket limiting on credential endpoints
pub mod security; // Security response headers

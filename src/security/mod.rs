//! Security Primitives
//!
//! Password hashing, the bearer-token codec shared with sibling services,
//! CSRF token issuance/validation, and the cookie contract.

pub mod cookies; // Cookie contract for the parent domain
pub mod csrf; // Synchronizer-token CSRF protection
pub mod password; // Adaptive password hashing
pub mod token; // HMAC-signed bearer tokens

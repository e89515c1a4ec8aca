//! Database Layer
//!
//! Connection pooling and schema migrations for the SQLite store backing
//! the user and session repositories.

pub mod migrations; // Ordered, idempotent schema migrations
pub mod pool; // Connection lifecycle management

pub use migrations::run_migrations;
pub use pool::{create_pool, DbPool};

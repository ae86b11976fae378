//! Database repositories
//!
//! Repository pattern implementations for database access.

pub mod session;

pub use session::{SessionRepository, SqlxSessionRepository};

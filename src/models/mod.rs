//! Data models
//!
//! Entities persisted by the application itself. Content entities (posts,
//! users, comments) belong to the route groups.

mod session;

pub use session::SessionRecord;

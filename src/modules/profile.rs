//! User profile pages

use super::{descriptor_router, Blueprint};

pub fn blueprint() -> Blueprint {
    Blueprint::new("profile", "/user", descriptor_router("profile", "/user"))
}

//! Authentication (login, registration, logout)

use super::{descriptor_router, Blueprint};

pub fn blueprint() -> Blueprint {
    Blueprint::new("passport", "/passport", descriptor_router("passport", "/passport"))
}

//! Administration

use super::{descriptor_router, Blueprint};

pub fn blueprint() -> Blueprint {
    Blueprint::new("admin", "/admin", descriptor_router("admin", "/admin"))
}

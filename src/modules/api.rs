//! JSON API

use super::{descriptor_router, Blueprint};

pub fn blueprint() -> Blueprint {
    Blueprint::new("api", "/api", descriptor_router("api", "/api"))
}

//! Services layer
//!
//! Request-independent security primitives shared by the middleware:
//! keyed signing and anti-forgery tokens.

pub mod csrf;
pub mod signing;

pub use csrf::{CsrfError, CsrfProtect};
pub use signing::Signer;

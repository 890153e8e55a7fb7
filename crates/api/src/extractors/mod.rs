//! Custom Axum extractors.

pub mod admin_auth;
pub mod caller;

pub use admin_auth::OptionalAdminAuth;
pub use caller::Caller;

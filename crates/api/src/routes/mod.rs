//! HTTP route handlers.

pub mod admin;
pub mod auth;
pub mod codes;
pub mod health;

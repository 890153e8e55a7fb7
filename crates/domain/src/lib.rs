//! Domain layer for the invite pool backend.
//!
//! This crate contains:
//! - Domain models (InviteCode, CodeUsage, Admin, statistics)
//! - The store traits that persistence backends implement
//! - Allocation, contribution and inventory services
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::InviteError;

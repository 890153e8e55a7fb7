//! Persistence layer for the invite pool backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - `PgInviteStore`, the PostgreSQL implementation of the domain store traits

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use store::PgInviteStore;

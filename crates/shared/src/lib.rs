//! Shared utilities for the invite pool backend.
//!
//! This crate provides functionality used across all other crates:
//! - Keyed hashing of caller IP addresses
//! - Password hashing with Argon2id
//! - Admin session tokens
//! - Invite code value validation

pub mod crypto;
pub mod jwt;
pub mod password;
pub mod validation;

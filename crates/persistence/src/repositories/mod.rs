//! Repository implementations for database operations.

pub mod admin_account;
pub mod allocation;
pub mod code_usage;
pub mod invite_code;

pub use admin_account::AdminAccountRepository;
pub use allocation::{AllocationRepository, ContributionRows};
pub use code_usage::CodeUsageRepository;
pub use invite_code::{CreateManyOutcome, InviteCodeRepository};

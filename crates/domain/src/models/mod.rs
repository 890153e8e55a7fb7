//! Domain models for the invite pool.

pub mod admin;
pub mod caller;
pub mod code_usage;
pub mod invite_code;
pub mod stats;

pub use admin::Admin;
pub use caller::{AdminGate, CallerIdentity};
pub use code_usage::{Claim, CodeUsage, Contribution, Feedback, FeedbackRecord, UsageStatus};
pub use invite_code::{
    AdminCodeView, CodePolicy, CodeStatus, InviteCode, NewInviteCode, DEFAULT_MAX_USES,
    DEFAULT_REVIEW_THRESHOLD,
};
pub use stats::CodeStatistics;

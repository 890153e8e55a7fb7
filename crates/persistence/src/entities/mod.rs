//! Database entity definitions.

pub mod admin;
pub mod code_usage;
pub mod invite_code;

pub use admin::AdminEntity;
pub use code_usage::{CodeUsageEntity, FeedbackDb, UsageStatusDb};
pub use invite_code::{CodeStatisticsEntity, CodeStatusDb, InviteCodeEntity};

//! Code usage entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{CodeUsage, Feedback, UsageStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for usage_status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "usage_status", rename_all = "lowercase")]
pub enum UsageStatusDb {
    Claimed,
    Used,
    Confirmed,
}

impl From<UsageStatusDb> for UsageStatus {
    fn from(db_status: UsageStatusDb) -> Self {
        match db_status {
            UsageStatusDb::Claimed => UsageStatus::Claimed,
            UsageStatusDb::Used => UsageStatus::Used,
            UsageStatusDb::Confirmed => UsageStatus::Confirmed,
        }
    }
}

impl From<UsageStatus> for UsageStatusDb {
    fn from(status: UsageStatus) -> Self {
        match status {
            UsageStatus::Claimed => UsageStatusDb::Claimed,
            UsageStatus::Used => UsageStatusDb::Used,
            UsageStatus::Confirmed => UsageStatusDb::Confirmed,
        }
    }
}

/// Database enum for usage_feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "usage_feedback", rename_all = "snake_case")]
pub enum FeedbackDb {
    Working,
    NotWorking,
}

impl From<FeedbackDb> for Feedback {
    fn from(db_feedback: FeedbackDb) -> Self {
        match db_feedback {
            FeedbackDb::Working => Feedback::Working,
            FeedbackDb::NotWorking => Feedback::NotWorking,
        }
    }
}

impl From<Feedback> for FeedbackDb {
    fn from(feedback: Feedback) -> Self {
        match feedback {
            Feedback::Working => FeedbackDb::Working,
            Feedback::NotWorking => FeedbackDb::NotWorking,
        }
    }
}

/// Database row mapping for the code_usages table.
#[derive(Debug, Clone, FromRow)]
pub struct CodeUsageEntity {
    pub id: Uuid,
    pub code_id: Uuid,
    pub ip_hash: String,
    pub user_agent: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub status: UsageStatusDb,
    pub feedback: Option<FeedbackDb>,
    pub feedback_at: Option<DateTime<Utc>>,
    pub contributed_code_id: Option<Uuid>,
    pub note: Option<String>,
}

impl From<CodeUsageEntity> for CodeUsage {
    fn from(entity: CodeUsageEntity) -> Self {
        Self {
            id: entity.id,
            code_id: entity.code_id,
            ip_hash: entity.ip_hash,
            user_agent: entity.user_agent,
            claimed_at: entity.claimed_at,
            status: entity.status.into(),
            feedback: entity.feedback.map(Into::into),
            feedback_at: entity.feedback_at,
            contributed_code_id: entity.contributed_code_id,
            note: entity.note,
        }
    }
}

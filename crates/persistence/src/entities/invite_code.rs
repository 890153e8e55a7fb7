//! Invite code entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{CodeStatistics, CodeStatus, InviteCode};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for code_status that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "code_status", rename_all = "lowercase")]
pub enum CodeStatusDb {
    Available,
    Active,
    Exhausted,
    Invalid,
}

impl CodeStatusDb {
    /// Label as stored in the enum type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeStatusDb::Available => "available",
            CodeStatusDb::Active => "active",
            CodeStatusDb::Exhausted => "exhausted",
            CodeStatusDb::Invalid => "invalid",
        }
    }
}

impl From<CodeStatusDb> for CodeStatus {
    fn from(db_status: CodeStatusDb) -> Self {
        match db_status {
            CodeStatusDb::Available => CodeStatus::Available,
            CodeStatusDb::Active => CodeStatus::Active,
            CodeStatusDb::Exhausted => CodeStatus::Exhausted,
            CodeStatusDb::Invalid => CodeStatus::Invalid,
        }
    }
}

impl From<CodeStatus> for CodeStatusDb {
    fn from(status: CodeStatus) -> Self {
        match status {
            CodeStatus::Available => CodeStatusDb::Available,
            CodeStatus::Active => CodeStatusDb::Active,
            CodeStatus::Exhausted => CodeStatusDb::Exhausted,
            CodeStatus::Invalid => CodeStatusDb::Invalid,
        }
    }
}

/// Database row mapping for the invite_codes table.
#[derive(Debug, Clone, FromRow)]
pub struct InviteCodeEntity {
    pub id: Uuid,
    pub code: String,
    pub status: CodeStatusDb,
    pub usage_count: i32,
    pub max_uses: i32,
    pub not_working_reports: i32,
    pub created_at: DateTime<Utc>,
    pub last_claimed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<InviteCodeEntity> for InviteCode {
    fn from(entity: InviteCodeEntity) -> Self {
        Self {
            id: entity.id,
            code: entity.code,
            status: entity.status.into(),
            usage_count: entity.usage_count,
            max_uses: entity.max_uses,
            not_working_reports: entity.not_working_reports,
            created_at: entity.created_at,
            last_claimed_at: entity.last_claimed_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Aggregate row for pool statistics.
#[derive(Debug, Clone, FromRow)]
pub struct CodeStatisticsEntity {
    pub total: i64,
    pub available: i64,
    pub active: i64,
    pub exhausted: i64,
    pub invalid: i64,
    pub needs_review: i64,
    pub total_claims: i64,
}

impl From<CodeStatisticsEntity> for CodeStatistics {
    fn from(entity: CodeStatisticsEntity) -> Self {
        Self {
            total: entity.total,
            available: entity.available,
            active: entity.active,
            exhausted: entity.exhausted,
            invalid: entity.invalid,
            total_claims: entity.total_claims,
            needs_review: entity.needs_review,
        }
    }
}

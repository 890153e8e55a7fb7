//! Usage ledger domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::invite_code::{CodeStatus, InviteCode};

/// Maximum length of a feedback note.
pub const MAX_NOTE_LENGTH: u64 = 500;

/// Status of a single claim.
///
/// Ordered by strength: a usage only ever moves towards `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    /// Code was handed out.
    Claimed,
    /// Caller reported having redeemed the code.
    Used,
    /// Caller contributed a code of their own afterwards.
    Confirmed,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Claimed => "claimed",
            UsageStatus::Used => "used",
            UsageStatus::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a claimed code worked for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Working,
    NotWorking,
}

impl Feedback {
    pub fn from_working(working: bool) -> Self {
        if working {
            Feedback::Working
        } else {
            Feedback::NotWorking
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Working => "working",
            Feedback::NotWorking => "not_working",
        }
    }
}

/// One ledger row: a single claim of a code by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeUsage {
    pub id: Uuid,
    pub code_id: Uuid,
    pub ip_hash: String,
    pub user_agent: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub status: UsageStatus,
    pub feedback: Option<Feedback>,
    pub feedback_at: Option<DateTime<Utc>>,
    pub contributed_code_id: Option<Uuid>,
    pub note: Option<String>,
}

/// A successful claim: the code after its counters moved, plus the new ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub code: InviteCode,
    pub usage: CodeUsage,
}

/// Result of a contribution: the new code and the usage it was attributed to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub code: InviteCode,
    pub attributed_usage: Option<CodeUsage>,
}

/// Result of a conditional feedback write.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub usage: CodeUsage,
    /// False when the usage already carried feedback and nothing changed.
    pub newly_recorded: bool,
}

/// Response for `POST /api/codes/request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub code: String,
    pub code_id: Uuid,
    pub usage_id: Uuid,
    pub remaining_uses: i32,
    pub status: CodeStatus,
}

impl From<&Claim> for ClaimResponse {
    fn from(claim: &Claim) -> Self {
        Self {
            code: claim.code.code.clone(),
            code_id: claim.code.id,
            usage_id: claim.usage.id,
            remaining_uses: claim.code.remaining_uses(),
            status: claim.code.status,
        }
    }
}

/// Request body for feedback.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub usage_id: Uuid,
    pub working: bool,

    #[validate(length(max = 500, message = "note must be at most 500 characters"))]
    pub note: Option<String>,
}

/// Response body for feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub success: bool,
    pub replaced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_code: Option<ClaimResponse>,
    pub message: String,
}

/// Request body for mark-used.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkUsedRequest {
    pub usage_id: Uuid,
}

//! Invite code domain models.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Uses granted to a code when the caller does not say otherwise.
pub const DEFAULT_MAX_USES: i32 = 6;

/// Number of "not working" reports after which a code is flagged for review.
pub const DEFAULT_REVIEW_THRESHOLD: i32 = 5;

/// Upper bound for `max_uses` accepted from admins.
pub const MAX_USES_LIMIT: i32 = 1000;

/// Lifecycle status of an invite code.
///
/// `available`, `active` and `exhausted` follow the usage count; `invalid`
/// is only ever set by an admin and removes the code from selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    Available,
    Active,
    Exhausted,
    Invalid,
}

impl CodeStatus {
    pub const ALL: [CodeStatus; 4] = [
        CodeStatus::Available,
        CodeStatus::Active,
        CodeStatus::Exhausted,
        CodeStatus::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeStatus::Available => "available",
            CodeStatus::Active => "active",
            CodeStatus::Exhausted => "exhausted",
            CodeStatus::Invalid => "invalid",
        }
    }

    /// Status implied by a usage count.
    pub fn for_usage(usage_count: i32, max_uses: i32) -> Self {
        if usage_count >= max_uses {
            CodeStatus::Exhausted
        } else if usage_count > 0 {
            CodeStatus::Active
        } else {
            CodeStatus::Available
        }
    }

    /// Whether selection may consider a code in this status.
    pub fn is_selectable(&self) -> bool {
        matches!(self, CodeStatus::Available | CodeStatus::Active)
    }
}

impl std::fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(CodeStatus::Available),
            "active" => Ok(CodeStatus::Active),
            "exhausted" => Ok(CodeStatus::Exhausted),
            "invalid" => Ok(CodeStatus::Invalid),
            other => Err(format!("Invalid code status: {}", other)),
        }
    }
}

/// A shareable invite code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub id: Uuid,
    pub code: String,
    pub status: CodeStatus,
    pub usage_count: i32,
    pub max_uses: i32,
    pub not_working_reports: i32,
    pub created_at: DateTime<Utc>,
    pub last_claimed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl InviteCode {
    pub fn remaining_uses(&self) -> i32 {
        (self.max_uses - self.usage_count).max(0)
    }

    /// A code can be handed out when its status allows it and capacity remains.
    pub fn is_claimable(&self) -> bool {
        self.status.is_selectable() && self.usage_count < self.max_uses
    }

    pub fn needs_review(&self, threshold: i32) -> bool {
        self.status != CodeStatus::Invalid && self.not_working_reports >= threshold
    }
}

/// Tunables applied by the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePolicy {
    pub default_max_uses: i32,
    pub review_threshold: i32,
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self {
            default_max_uses: DEFAULT_MAX_USES,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
        }
    }
}

/// Data for inserting a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInviteCode {
    pub code: String,
    pub max_uses: i32,
    pub status: CodeStatus,
}

impl NewInviteCode {
    pub fn available(code: impl Into<String>, max_uses: i32) -> Self {
        Self {
            code: code.into(),
            max_uses,
            status: CodeStatus::Available,
        }
    }
}

/// Admin view of a code with derived fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCodeView {
    #[serde(flatten)]
    pub code: InviteCode,
    pub remaining_uses: i32,
    pub needs_review: bool,
}

impl AdminCodeView {
    pub fn new(code: InviteCode, review_threshold: i32) -> Self {
        Self {
            remaining_uses: code.remaining_uses(),
            needs_review: code.needs_review(review_threshold),
            code,
        }
    }
}

/// Request to contribute a code to the pool.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContributeCodeRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
}

/// Response after a successful contribution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributeCodeResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

/// Admin request to add codes in bulk.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddCodesRequest {
    #[validate(length(min = 1, max = 500, message = "codes must contain 1 to 500 entries"))]
    pub codes: Vec<String>,

    #[validate(range(min = 1, max = 1000, message = "maxUses must be between 1 and 1000"))]
    pub max_uses: Option<i32>,
}

/// Response for a bulk add.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCodesResponse {
    pub success: bool,
    pub count: usize,
    pub codes: Vec<InviteCode>,
}

/// Admin request to overwrite a code's status.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCodeStatusRequest {
    pub status: CodeStatus,
}

/// Query for listing codes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListCodesQuery {
    pub status: Option<CodeStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(usage_count: i32, max_uses: i32, status: CodeStatus) -> InviteCode {
        let now = Utc::now();
        InviteCode {
            id: Uuid::new_v4(),
            code: "SORA-TEST".to_string(),
            status,
            usage_count,
            max_uses,
            not_working_reports: 0,
            created_at: now,
            last_claimed_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_for_usage() {
        assert_eq!(CodeStatus::for_usage(0, 6), CodeStatus::Available);
        assert_eq!(CodeStatus::for_usage(1, 6), CodeStatus::Active);
        assert_eq!(CodeStatus::for_usage(5, 6), CodeStatus::Active);
        assert_eq!(CodeStatus::for_usage(6, 6), CodeStatus::Exhausted);
        assert_eq!(CodeStatus::for_usage(1, 1), CodeStatus::Exhausted);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&CodeStatus::Exhausted).unwrap(),
            "\"exhausted\""
        );
        let parsed: CodeStatus = serde_json::from_str("\"invalid\"").unwrap();
        assert_eq!(parsed, CodeStatus::Invalid);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("ACTIVE".parse::<CodeStatus>().unwrap(), CodeStatus::Active);
        assert!("used".parse::<CodeStatus>().is_err());
        for status in CodeStatus::ALL {
            assert_eq!(status.as_str().parse::<CodeStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_claimable() {
        assert!(code(0, 6, CodeStatus::Available).is_claimable());
        assert!(code(3, 6, CodeStatus::Active).is_claimable());
        assert!(!code(6, 6, CodeStatus::Exhausted).is_claimable());
        assert!(!code(0, 6, CodeStatus::Invalid).is_claimable());
    }

    #[test]
    fn test_remaining_uses() {
        assert_eq!(code(2, 6, CodeStatus::Active).remaining_uses(), 4);
        assert_eq!(code(6, 6, CodeStatus::Exhausted).remaining_uses(), 0);
    }

    #[test]
    fn test_needs_review() {
        let mut c = code(1, 6, CodeStatus::Active);
        c.not_working_reports = 4;
        assert!(!c.needs_review(5));
        c.not_working_reports = 5;
        assert!(c.needs_review(5));
        c.status = CodeStatus::Invalid;
        assert!(!c.needs_review(5));
    }

    #[test]
    fn test_admin_view_is_flat_camel_case() {
        let view = AdminCodeView::new(code(2, 6, CodeStatus::Active), 5);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["code"], "SORA-TEST");
        assert_eq!(json["usageCount"], 2);
        assert_eq!(json["maxUses"], 6);
        assert_eq!(json["remainingUses"], 4);
        assert_eq!(json["needsReview"], false);
    }

    #[test]
    fn test_add_codes_request_validation() {
        let valid = AddCodesRequest {
            codes: vec!["A".into()],
            max_uses: Some(3),
        };
        assert!(valid.validate().is_ok());

        let empty = AddCodesRequest {
            codes: vec![],
            max_uses: None,
        };
        assert!(empty.validate().is_err());

        let zero_uses = AddCodesRequest {
            codes: vec!["A".into()],
            max_uses: Some(0),
        };
        assert!(zero_uses.validate().is_err());
    }
}

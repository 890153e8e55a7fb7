//! Admin account models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// An administrator allowed to manage the code inventory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Login request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, max = 256, message = "Password is required"))]
    pub password: String,
}

/// Login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginResponse {
    pub success: bool,
    pub token: String,
    pub expires_in: i64,
}

/// Session check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCheckResponse {
    pub authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_not_serialized() {
        let admin = Admin {
            id: Uuid::new_v4(),
            username: "admin".into(),
            password_hash: "$argon2id$secret".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&admin).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("createdAt"));
    }

    #[test]
    fn test_login_request_validation() {
        let empty = AdminLoginRequest {
            username: "".into(),
            password: "pw".into(),
        };
        assert!(empty.validate().is_err());
    }
}

//! Admin entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::Admin;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the admins table.
#[derive(Debug, Clone, FromRow)]
pub struct AdminEntity {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<AdminEntity> for Admin {
    fn from(entity: AdminEntity) -> Self {
        Self {
            id: entity.id,
            username: entity.username,
            password_hash: entity.password_hash,
            created_at: entity.created_at,
        }
    }
}

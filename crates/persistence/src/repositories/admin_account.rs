//! Admin account repository.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::AdminEntity;
use crate::metrics::QueryTimer;

/// Repository for admin accounts.
#[derive(Clone)]
pub struct AdminAccountRepository {
    pool: PgPool,
}

impl AdminAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_admin_by_username");
        let result = sqlx::query_as::<_, AdminEntity>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM admins
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_admin_by_id");
        let result = sqlx::query_as::<_, AdminEntity>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM admins
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<AdminEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_admin");
        let result = sqlx::query_as::<_, AdminEntity>(
            r#"
            INSERT INTO admins (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_admins");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM admins
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}

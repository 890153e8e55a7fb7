//! Usage ledger repository.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{CodeUsageEntity, UsageStatusDb};
use crate::metrics::QueryTimer;

/// Repository for code usage database operations.
#[derive(Clone)]
pub struct CodeUsageRepository {
    pool: PgPool,
}

impl CodeUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a `claimed` row.
    pub async fn insert(
        &self,
        code_id: Uuid,
        ip_hash: &str,
        user_agent: Option<&str>,
    ) -> Result<CodeUsageEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_code_usage");
        let result = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            INSERT INTO code_usages (code_id, ip_hash, user_agent)
            VALUES ($1, $2, $3)
            RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            "#,
        )
        .bind(code_id)
        .bind(ip_hash)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CodeUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_code_usage_by_id");
        let result = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            SELECT id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            FROM code_usages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Usages of a code, newest first.
    pub async fn list_for_code(&self, code_id: Uuid) -> Result<Vec<CodeUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_code_usages_for_code");
        let result = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            SELECT id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            FROM code_usages
            WHERE code_id = $1
            ORDER BY claimed_at DESC, seq DESC
            "#,
        )
        .bind(code_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_latest_by_ip_hash(
        &self,
        ip_hash: &str,
    ) -> Result<Option<CodeUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_latest_code_usage_by_ip_hash");
        let result = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            SELECT id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            FROM code_usages
            WHERE ip_hash = $1
            ORDER BY claimed_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(ip_hash)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn set_status(
        &self,
        id: Uuid,
        status: UsageStatusDb,
    ) -> Result<Option<CodeUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("set_code_usage_status");
        let result = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            UPDATE code_usages
            SET status = $2
            WHERE id = $1
            RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn link_contribution(
        &self,
        id: Uuid,
        contributed_code_id: Uuid,
    ) -> Result<Option<CodeUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("link_code_usage_contribution");
        let result = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            UPDATE code_usages
            SET contributed_code_id = $2, status = 'confirmed'
            WHERE id = $1
            RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            "#,
        )
        .bind(id)
        .bind(contributed_code_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_code_usages");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM code_usages
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}

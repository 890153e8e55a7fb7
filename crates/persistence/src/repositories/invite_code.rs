//! Invite code repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{CodeStatisticsEntity, CodeStatusDb, InviteCodeEntity};
use crate::metrics::QueryTimer;

/// Outcome of a batch insert.
#[derive(Debug)]
pub enum CreateManyOutcome {
    Created(Vec<InviteCodeEntity>),
    /// Values that already exist. Nothing was inserted.
    Duplicates(Vec<String>),
}

/// Repository for invite code database operations.
#[derive(Clone)]
pub struct InviteCodeRepository {
    pool: PgPool,
}

impl InviteCodeRepository {
    /// Creates a new InviteCodeRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a single code.
    pub async fn create(
        &self,
        code: &str,
        max_uses: i32,
        status: CodeStatusDb,
    ) -> Result<InviteCodeEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_invite_code");
        let result = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            INSERT INTO invite_codes (code, max_uses, status)
            VALUES ($1, $2, $3)
            RETURNING id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            "#,
        )
        .bind(code)
        .bind(max_uses)
        .bind(status)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Insert a batch in one transaction after checking that no value exists yet.
    pub async fn create_many(
        &self,
        codes: &[String],
        max_uses: &[i32],
        statuses: &[CodeStatusDb],
    ) -> Result<CreateManyOutcome, sqlx::Error> {
        let timer = QueryTimer::new("create_invite_codes_batch");
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, String>(
            r#"
            SELECT code FROM invite_codes WHERE code = ANY($1)
            "#,
        )
        .bind(codes)
        .fetch_all(&mut *tx)
        .await?;

        if !existing.is_empty() {
            timer.record();
            return Ok(CreateManyOutcome::Duplicates(existing));
        }

        let status_names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();

        let mut created = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            INSERT INTO invite_codes (code, max_uses, status)
            SELECT v.code, v.max_uses, v.status::code_status
            FROM UNNEST($1::text[], $2::int4[], $3::text[]) WITH ORDINALITY AS v(code, max_uses, status, ord)
            ORDER BY v.ord
            RETURNING id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            "#,
        )
        .bind(codes)
        .bind(max_uses)
        .bind(&status_names)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();

        // RETURNING order is not guaranteed; restore input order.
        created.sort_by_key(|entity| codes.iter().position(|c| *c == entity.code));
        Ok(CreateManyOutcome::Created(created))
    }

    /// Find code by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<InviteCodeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_invite_code_by_id");
        let result = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            SELECT id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            FROM invite_codes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find code by its value.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<InviteCodeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_invite_code_by_value");
        let result = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            SELECT id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            FROM invite_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List codes newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<CodeStatusDb>,
    ) -> Result<Vec<InviteCodeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_invite_codes");
        let result = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            SELECT id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            FROM invite_codes
            WHERE ($1::code_status IS NULL OR status = $1)
            ORDER BY created_at DESC, seq DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Overwrite a code's status.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: CodeStatusDb,
    ) -> Result<Option<InviteCodeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_invite_code_status");
        let result = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            UPDATE invite_codes
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Derive status from the usage counters, lifting a forced `invalid`.
    pub async fn restore_status(&self, id: Uuid) -> Result<Option<InviteCodeEntity>, sqlx::Error> {
        let timer = QueryTimer::new("restore_invite_code_status");
        let result = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            UPDATE invite_codes
            SET status = CASE
                    WHEN usage_count >= max_uses THEN 'exhausted'::code_status
                    WHEN usage_count > 0 THEN 'active'::code_status
                    ELSE 'available'::code_status
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Which of `codes` are already stored.
    pub async fn find_existing(&self, codes: &[String]) -> Result<Vec<String>, sqlx::Error> {
        let timer = QueryTimer::new("find_existing_invite_codes");
        let result = sqlx::query_scalar::<_, String>(
            r#"
            SELECT code FROM invite_codes WHERE code = ANY($1)
            "#,
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Hard delete. Usages cascade.
    pub async fn delete(&self, id: Uuid) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_invite_code");
        let result = sqlx::query(
            r#"
            DELETE FROM invite_codes WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    /// Count all codes.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_invite_codes");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM invite_codes
            "#,
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Aggregate pool statistics in one statement.
    pub async fn statistics(
        &self,
        review_threshold: i32,
    ) -> Result<CodeStatisticsEntity, sqlx::Error> {
        let timer = QueryTimer::new("invite_code_statistics");
        let result = sqlx::query_as::<_, CodeStatisticsEntity>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'available' AND usage_count < max_uses) AS available,
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                COUNT(*) FILTER (WHERE status = 'exhausted') AS exhausted,
                COUNT(*) FILTER (WHERE status = 'invalid') AS invalid,
                COUNT(*) FILTER (WHERE status <> 'invalid' AND not_working_reports >= $1) AS needs_review,
                (SELECT COUNT(*) FROM code_usages) AS total_claims
            FROM invite_codes
            "#,
        )
        .bind(review_threshold)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}

//! Multi-table operations that run inside a single transaction.
//!
//! The claim path locks its candidate row with `FOR UPDATE`, so two
//! concurrent claims can never both take the last use of a code. A claim
//! that waits on a row another transaction just exhausted re-checks the
//! filter once the lock is released and moves on to the next candidate.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{CodeStatusDb, CodeUsageEntity, FeedbackDb, InviteCodeEntity, UsageStatusDb};
use crate::metrics::QueryTimer;

/// Rows written by a contribution.
#[derive(Debug)]
pub struct ContributionRows {
    pub code: InviteCodeEntity,
    pub attributed_usage: Option<CodeUsageEntity>,
}

/// Repository for transactional allocation operations.
#[derive(Clone)]
pub struct AllocationRepository {
    pool: PgPool,
}

impl AllocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claims the oldest claimable code not in `exclude`.
    ///
    /// `next_status` computes the status for the incremented usage count.
    pub async fn claim_next<F>(
        &self,
        ip_hash: &str,
        user_agent: Option<&str>,
        exclude: &[Uuid],
        next_status: F,
    ) -> Result<Option<(InviteCodeEntity, CodeUsageEntity)>, sqlx::Error>
    where
        F: Fn(i32, i32) -> CodeStatusDb,
    {
        let timer = QueryTimer::new("claim_next_code");
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            SELECT id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            FROM invite_codes
            WHERE status IN ('available', 'active')
              AND usage_count < max_uses
              AND NOT (id = ANY($1))
            ORDER BY created_at ASC, seq ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(exclude)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            timer.record();
            return Ok(None);
        };

        let new_count = candidate.usage_count + 1;
        let code = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            UPDATE invite_codes
            SET usage_count = $2, status = $3, last_claimed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            "#,
        )
        .bind(candidate.id)
        .bind(new_count)
        .bind(next_status(new_count, candidate.max_uses))
        .fetch_one(&mut *tx)
        .await?;

        let usage = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            INSERT INTO code_usages (code_id, ip_hash, user_agent)
            VALUES ($1, $2, $3)
            RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            "#,
        )
        .bind(code.id)
        .bind(ip_hash)
        .bind(user_agent)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(Some((code, usage)))
    }

    /// Inserts a contributed code and links it to the caller's latest usage.
    ///
    /// Returns `None` if the code value already exists.
    pub async fn contribute(
        &self,
        code: &str,
        max_uses: i32,
        status: CodeStatusDb,
        ip_hash: &str,
    ) -> Result<Option<ContributionRows>, sqlx::Error> {
        let timer = QueryTimer::new("contribute_code");
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, InviteCodeEntity>(
            r#"
            INSERT INTO invite_codes (code, max_uses, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO NOTHING
            RETURNING id, code, status, usage_count, max_uses, not_working_reports, created_at, last_claimed_at, updated_at
            "#,
        )
        .bind(code)
        .bind(max_uses)
        .bind(status)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(code) = inserted else {
            timer.record();
            return Ok(None);
        };

        let latest = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            SELECT id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            FROM code_usages
            WHERE ip_hash = $1
            ORDER BY claimed_at DESC, seq DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(ip_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let attributed_usage = match latest {
            Some(usage) if usage.contributed_code_id.is_none() => Some(
                sqlx::query_as::<_, CodeUsageEntity>(
                    r#"
                    UPDATE code_usages
                    SET contributed_code_id = $2, status = 'confirmed'
                    WHERE id = $1
                    RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
                    "#,
                )
                .bind(usage.id)
                .bind(code.id)
                .fetch_one(&mut *tx)
                .await?,
            ),
            _ => None,
        };

        tx.commit().await?;
        timer.record();
        Ok(Some(ContributionRows {
            code,
            attributed_usage,
        }))
    }

    /// Sets feedback once. Returns the usage and whether this call recorded it,
    /// or `None` if the usage does not exist.
    pub async fn record_feedback(
        &self,
        usage_id: Uuid,
        feedback: FeedbackDb,
        note: Option<&str>,
    ) -> Result<Option<(CodeUsageEntity, bool)>, sqlx::Error> {
        let timer = QueryTimer::new("record_usage_feedback");
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            UPDATE code_usages
            SET feedback = $2, feedback_at = NOW(), note = COALESCE($3, note)
            WHERE id = $1 AND feedback IS NULL
            RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            "#,
        )
        .bind(usage_id)
        .bind(feedback)
        .bind(note)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match updated {
            Some(usage) => {
                if feedback == FeedbackDb::NotWorking {
                    sqlx::query(
                        r#"
                        UPDATE invite_codes
                        SET not_working_reports = not_working_reports + 1, updated_at = NOW()
                        WHERE id = $1
                        "#,
                    )
                    .bind(usage.code_id)
                    .execute(&mut *tx)
                    .await?;
                }
                Some((usage, true))
            }
            None => sqlx::query_as::<_, CodeUsageEntity>(
                r#"
                SELECT id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
                FROM code_usages
                WHERE id = $1
                "#,
            )
            .bind(usage_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|usage| (usage, false)),
        };

        tx.commit().await?;
        timer.record();
        Ok(result)
    }

    /// Move a `claimed` usage to `used`; other statuses are left alone. Returns
    /// the usage as stored afterwards, or `None` if it does not exist.
    pub async fn mark_used(&self, usage_id: Uuid) -> Result<Option<CodeUsageEntity>, sqlx::Error> {
        let timer = QueryTimer::new("mark_code_usage_used");
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, CodeUsageEntity>(
            r#"
            UPDATE code_usages
            SET status = $2
            WHERE id = $1 AND status = $3
            RETURNING id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
            "#,
        )
        .bind(usage_id)
        .bind(UsageStatusDb::Used)
        .bind(UsageStatusDb::Claimed)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match updated {
            Some(usage) => Some(usage),
            None => {
                sqlx::query_as::<_, CodeUsageEntity>(
                    r#"
                    SELECT id, code_id, ip_hash, user_agent, claimed_at, status, feedback, feedback_at, contributed_code_id, note
                    FROM code_usages
                    WHERE id = $1
                    "#,
                )
                .bind(usage_id)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        timer.record();
        Ok(result)
    }
}

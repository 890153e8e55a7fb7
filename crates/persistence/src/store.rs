//! PostgreSQL implementation of the domain store traits.

use std::collections::HashSet;

use async_trait::async_trait;
use domain::models::{
    Admin, CallerIdentity, Claim, CodeStatistics, CodeStatus, CodeUsage, Contribution, Feedback,
    FeedbackRecord, InviteCode, NewInviteCode, UsageStatus,
};
use domain::services::{AdminRepository, AllocationStore, CodeRepository, InviteStore, UsageLedger};
use domain::InviteError;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::entities::CodeStatusDb;
use crate::metrics::{record_pool_metrics, record_store_failure};
use crate::repositories::{
    AdminAccountRepository, AllocationRepository, CodeUsageRepository, CreateManyOutcome,
    InviteCodeRepository,
};

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

/// Maps a database error to the domain taxonomy. Unique violations become
/// `DuplicateCode` naming `code`; anything else is a failed transaction.
fn map_code_error(code: &str) -> impl FnOnce(sqlx::Error) -> InviteError + '_ {
    move |err| {
        if is_unique_violation(&err) {
            InviteError::DuplicateCode(code.to_string())
        } else {
            transaction_error(err)
        }
    }
}

fn transaction_error(err: sqlx::Error) -> InviteError {
    error!(error = %err, "Database operation failed");
    record_store_failure();
    InviteError::Transaction(err.to_string())
}

/// Values that occur more than once in `values`, in first-seen order.
fn repeated_values(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for value in values {
        if !seen.insert(value.as_str()) && !repeated.contains(value) {
            repeated.push(value.clone());
        }
    }
    repeated
}

/// Store backed by PostgreSQL. Cheap to clone.
#[derive(Clone)]
pub struct PgInviteStore {
    pool: PgPool,
    codes: InviteCodeRepository,
    usages: CodeUsageRepository,
    allocation: AllocationRepository,
    admins: AdminAccountRepository,
}

impl PgInviteStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            codes: InviteCodeRepository::new(pool.clone()),
            usages: CodeUsageRepository::new(pool.clone()),
            allocation: AllocationRepository::new(pool.clone()),
            admins: AdminAccountRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CodeRepository for PgInviteStore {
    async fn create_code(&self, new_code: NewInviteCode) -> Result<InviteCode, InviteError> {
        self.codes
            .create(&new_code.code, new_code.max_uses, new_code.status.into())
            .await
            .map(Into::into)
            .map_err(map_code_error(&new_code.code))
    }

    async fn find_code_by_id(&self, id: Uuid) -> Result<Option<InviteCode>, InviteError> {
        self.codes
            .find_by_id(id)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn find_code_by_value(&self, code: &str) -> Result<Option<InviteCode>, InviteError> {
        self.codes
            .find_by_code(code)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn list_codes(&self) -> Result<Vec<InviteCode>, InviteError> {
        self.codes
            .list(None)
            .await
            .map(|entities| entities.into_iter().map(Into::into).collect())
            .map_err(transaction_error)
    }

    async fn list_codes_by_status(
        &self,
        status: CodeStatus,
    ) -> Result<Vec<InviteCode>, InviteError> {
        self.codes
            .list(Some(status.into()))
            .await
            .map(|entities| entities.into_iter().map(Into::into).collect())
            .map_err(transaction_error)
    }

    async fn update_code_status(
        &self,
        id: Uuid,
        status: CodeStatus,
    ) -> Result<Option<InviteCode>, InviteError> {
        self.codes
            .update_status(id, status.into())
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn restore_code_status(&self, id: Uuid) -> Result<Option<InviteCode>, InviteError> {
        self.codes
            .restore_status(id)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn delete_code(&self, id: Uuid) -> Result<bool, InviteError> {
        self.codes
            .delete(id)
            .await
            .map(|rows| rows > 0)
            .map_err(transaction_error)
    }

    async fn count_codes(&self) -> Result<i64, InviteError> {
        self.codes.count().await.map_err(transaction_error)
    }
}

#[async_trait]
impl UsageLedger for PgInviteStore {
    async fn record_claim(
        &self,
        code_id: Uuid,
        ip_hash: &str,
        user_agent: Option<&str>,
    ) -> Result<CodeUsage, InviteError> {
        self.usages
            .insert(code_id, ip_hash, user_agent)
            .await
            .map(Into::into)
            .map_err(|err| {
                let unknown_code = matches!(
                    &err,
                    sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation()
                );
                if unknown_code {
                    InviteError::code_not_found()
                } else {
                    transaction_error(err)
                }
            })
    }

    async fn find_usage_by_id(&self, id: Uuid) -> Result<Option<CodeUsage>, InviteError> {
        self.usages
            .find_by_id(id)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn list_usages_for_code(&self, code_id: Uuid) -> Result<Vec<CodeUsage>, InviteError> {
        self.usages
            .list_for_code(code_id)
            .await
            .map(|entities| entities.into_iter().map(Into::into).collect())
            .map_err(transaction_error)
    }

    async fn find_latest_usage_by_ip_hash(
        &self,
        ip_hash: &str,
    ) -> Result<Option<CodeUsage>, InviteError> {
        self.usages
            .find_latest_by_ip_hash(ip_hash)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn set_usage_status(
        &self,
        id: Uuid,
        status: UsageStatus,
    ) -> Result<Option<CodeUsage>, InviteError> {
        self.usages
            .set_status(id, status.into())
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn link_contribution(
        &self,
        usage_id: Uuid,
        contributed_code_id: Uuid,
    ) -> Result<Option<CodeUsage>, InviteError> {
        self.usages
            .link_contribution(usage_id, contributed_code_id)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn count_usages(&self) -> Result<i64, InviteError> {
        self.usages.count().await.map_err(transaction_error)
    }
}

#[async_trait]
impl AllocationStore for PgInviteStore {
    async fn claim_next(
        &self,
        caller: &CallerIdentity,
        exclude: &[Uuid],
    ) -> Result<Option<Claim>, InviteError> {
        let claimed = self
            .allocation
            .claim_next(
                &caller.ip_hash,
                caller.user_agent.as_deref(),
                exclude,
                |count, max| CodeStatus::for_usage(count, max).into(),
            )
            .await
            .map_err(transaction_error)?;

        Ok(claimed.map(|(code, usage)| Claim {
            code: code.into(),
            usage: usage.into(),
        }))
    }

    async fn contribute(
        &self,
        new_code: NewInviteCode,
        ip_hash: &str,
    ) -> Result<Contribution, InviteError> {
        let rows = self
            .allocation
            .contribute(
                &new_code.code,
                new_code.max_uses,
                new_code.status.into(),
                ip_hash,
            )
            .await
            .map_err(map_code_error(&new_code.code))?
            .ok_or_else(|| InviteError::DuplicateCode(new_code.code.clone()))?;

        Ok(Contribution {
            code: rows.code.into(),
            attributed_usage: rows.attributed_usage.map(Into::into),
        })
    }

    async fn create_codes(
        &self,
        new_codes: Vec<NewInviteCode>,
    ) -> Result<Vec<InviteCode>, InviteError> {
        let values: Vec<String> = new_codes.iter().map(|c| c.code.clone()).collect();
        let max_uses: Vec<i32> = new_codes.iter().map(|c| c.max_uses).collect();
        let statuses: Vec<CodeStatusDb> = new_codes.iter().map(|c| c.status.into()).collect();

        let outcome = match self.codes.create_many(&values, &max_uses, &statuses).await {
            Ok(outcome) => outcome,
            // Another writer inserted one of the values after the pre-check
            Err(err) if is_unique_violation(&err) => {
                let mut existing = self
                    .codes
                    .find_existing(&values)
                    .await
                    .map_err(transaction_error)?;
                if existing.is_empty() {
                    existing = repeated_values(&values);
                }
                CreateManyOutcome::Duplicates(existing)
            }
            Err(err) => return Err(transaction_error(err)),
        };

        match outcome {
            CreateManyOutcome::Created(entities) => {
                Ok(entities.into_iter().map(Into::into).collect())
            }
            CreateManyOutcome::Duplicates(existing) => {
                Err(InviteError::DuplicateCode(existing.join(", ")))
            }
        }
    }

    async fn record_feedback(
        &self,
        usage_id: Uuid,
        feedback: Feedback,
        note: Option<&str>,
    ) -> Result<Option<FeedbackRecord>, InviteError> {
        let recorded = self
            .allocation
            .record_feedback(usage_id, feedback.into(), note)
            .await
            .map_err(transaction_error)?;

        Ok(recorded.map(|(usage, newly_recorded)| FeedbackRecord {
            usage: usage.into(),
            newly_recorded,
        }))
    }

    async fn mark_usage_used(&self, usage_id: Uuid) -> Result<Option<CodeUsage>, InviteError> {
        self.allocation
            .mark_used(usage_id)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn statistics(&self, review_threshold: i32) -> Result<CodeStatistics, InviteError> {
        self.codes
            .statistics(review_threshold)
            .await
            .map(Into::into)
            .map_err(transaction_error)
    }
}

#[async_trait]
impl AdminRepository for PgInviteStore {
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>, InviteError> {
        self.admins
            .find_by_username(username)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn find_admin_by_id(&self, id: Uuid) -> Result<Option<Admin>, InviteError> {
        self.admins
            .find_by_id(id)
            .await
            .map(|entity| entity.map(Into::into))
            .map_err(transaction_error)
    }

    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Admin, InviteError> {
        self.admins
            .create(username, password_hash)
            .await
            .map(Into::into)
            .map_err(|err| {
                if is_unique_violation(&err) {
                    InviteError::Validation(format!("Admin '{}' already exists", username))
                } else {
                    transaction_error(err)
                }
            })
    }

    async fn count_admins(&self) -> Result<i64, InviteError> {
        self.admins.count().await.map_err(transaction_error)
    }
}

#[async_trait]
impl InviteStore for PgInviteStore {
    async fn ping(&self) -> Result<(), InviteError> {
        record_pool_metrics(&self.pool);
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(transaction_error)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

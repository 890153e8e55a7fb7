//! Storage abstraction shared by the PostgreSQL and in-memory backends.
//!
//! Single-entity reads and writes live on [`CodeRepository`] and
//! [`UsageLedger`]. Anything that must touch both tables atomically lives on
//! [`AllocationStore`]; implementations run those operations inside one
//! transaction (or one lock acquisition) so callers never observe a partial
//! write.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::InviteError;
use crate::models::{
    Admin, CallerIdentity, Claim, CodeStatistics, CodeStatus, CodeUsage, Contribution, Feedback,
    FeedbackRecord, InviteCode, NewInviteCode, UsageStatus,
};

/// Storage of invite codes.
#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Inserts one code. Fails with `DuplicateCode` if the value exists.
    async fn create_code(&self, new_code: NewInviteCode) -> Result<InviteCode, InviteError>;

    async fn find_code_by_id(&self, id: Uuid) -> Result<Option<InviteCode>, InviteError>;

    async fn find_code_by_value(&self, code: &str) -> Result<Option<InviteCode>, InviteError>;

    /// All codes, newest first.
    async fn list_codes(&self) -> Result<Vec<InviteCode>, InviteError>;

    /// Codes with the given status, newest first.
    async fn list_codes_by_status(
        &self,
        status: CodeStatus,
    ) -> Result<Vec<InviteCode>, InviteError>;

    /// Overwrites the status and bumps `updated_at`. Returns `None` if absent.
    async fn update_code_status(
        &self,
        id: Uuid,
        status: CodeStatus,
    ) -> Result<Option<InviteCode>, InviteError>;

    /// Recomputes the status from `usage_count` and `max_uses`, lifting a
    /// forced `invalid`. Returns `None` if absent.
    async fn restore_code_status(&self, id: Uuid) -> Result<Option<InviteCode>, InviteError>;

    /// Hard delete; the code's usages go with it. Returns false if absent.
    async fn delete_code(&self, id: Uuid) -> Result<bool, InviteError>;

    async fn count_codes(&self) -> Result<i64, InviteError>;
}

/// Append-mostly ledger of claims.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Appends a `claimed` row without touching the code's counters.
    async fn record_claim(
        &self,
        code_id: Uuid,
        ip_hash: &str,
        user_agent: Option<&str>,
    ) -> Result<CodeUsage, InviteError>;

    async fn find_usage_by_id(&self, id: Uuid) -> Result<Option<CodeUsage>, InviteError>;

    /// Usages of one code, newest first.
    async fn list_usages_for_code(&self, code_id: Uuid) -> Result<Vec<CodeUsage>, InviteError>;

    async fn find_latest_usage_by_ip_hash(
        &self,
        ip_hash: &str,
    ) -> Result<Option<CodeUsage>, InviteError>;

    async fn set_usage_status(
        &self,
        id: Uuid,
        status: UsageStatus,
    ) -> Result<Option<CodeUsage>, InviteError>;

    /// Sets `contributed_code_id` and marks the usage `confirmed`.
    async fn link_contribution(
        &self,
        usage_id: Uuid,
        contributed_code_id: Uuid,
    ) -> Result<Option<CodeUsage>, InviteError>;

    async fn count_usages(&self) -> Result<i64, InviteError>;
}

/// Operations that span codes and usages and must be atomic.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Selects the oldest claimable code not in `exclude`, increments its
    /// usage count, updates its status and appends a usage row.
    ///
    /// Returns `None` when nothing is claimable.
    async fn claim_next(
        &self,
        caller: &CallerIdentity,
        exclude: &[Uuid],
    ) -> Result<Option<Claim>, InviteError>;

    /// Inserts a contributed code and links it to the caller's most recent
    /// usage if that usage has no contribution yet.
    async fn contribute(
        &self,
        new_code: NewInviteCode,
        ip_hash: &str,
    ) -> Result<Contribution, InviteError>;

    /// Inserts a batch. If any value already exists nothing is inserted.
    async fn create_codes(
        &self,
        new_codes: Vec<NewInviteCode>,
    ) -> Result<Vec<InviteCode>, InviteError>;

    /// Sets feedback if none is recorded yet. The first `NotWorking` report
    /// also increments the code's `not_working_reports`.
    ///
    /// Returns `None` if the usage does not exist.
    async fn record_feedback(
        &self,
        usage_id: Uuid,
        feedback: Feedback,
        note: Option<&str>,
    ) -> Result<Option<FeedbackRecord>, InviteError>;

    /// Moves a `claimed` usage to `used`. `used` and `confirmed` usages are
    /// returned unchanged.
    ///
    /// Returns `None` if the usage does not exist.
    async fn mark_usage_used(&self, usage_id: Uuid) -> Result<Option<CodeUsage>, InviteError>;

    async fn statistics(&self, review_threshold: i32) -> Result<CodeStatistics, InviteError>;
}

/// Admin account storage.
#[async_trait]
pub trait AdminRepository: Send + Sync {
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>, InviteError>;

    async fn find_admin_by_id(&self, id: Uuid) -> Result<Option<Admin>, InviteError>;

    async fn create_admin(&self, username: &str, password_hash: &str)
        -> Result<Admin, InviteError>;

    async fn count_admins(&self) -> Result<i64, InviteError>;
}

/// Everything the services need from a backend.
#[async_trait]
pub trait InviteStore: CodeRepository + UsageLedger + AllocationStore + AdminRepository {
    /// Cheap liveness probe of the backing store.
    async fn ping(&self) -> Result<(), InviteError>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

//! In-memory [`InviteStore`] used by tests and the `memory` storage backend.
//!
//! The whole state sits behind one mutex, so every trait call is atomic with
//! respect to every other call. Nothing survives a restart.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::InviteError;
use crate::models::{
    Admin, CallerIdentity, Claim, CodeStatistics, CodeStatus, CodeUsage, Contribution, Feedback,
    FeedbackRecord, InviteCode, NewInviteCode, UsageStatus,
};

use super::store::{AdminRepository, AllocationStore, CodeRepository, InviteStore, UsageLedger};

#[derive(Debug, Clone)]
struct StoredCode {
    seq: u64,
    code: InviteCode,
}

#[derive(Debug, Clone)]
struct StoredUsage {
    seq: u64,
    usage: CodeUsage,
}

#[derive(Debug, Default)]
struct MemoryState {
    codes: Vec<StoredCode>,
    usages: Vec<StoredUsage>,
    admins: Vec<Admin>,
    next_seq: u64,
}

impl MemoryState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn code_exists(&self, value: &str) -> bool {
        self.codes.iter().any(|s| s.code.code == value)
    }

    fn insert_code(&mut self, new_code: NewInviteCode) -> InviteCode {
        let now = Utc::now();
        let code = InviteCode {
            id: Uuid::new_v4(),
            code: new_code.code,
            status: new_code.status,
            usage_count: 0,
            max_uses: new_code.max_uses,
            not_working_reports: 0,
            created_at: now,
            last_claimed_at: None,
            updated_at: now,
        };
        let seq = self.next_seq();
        self.codes.push(StoredCode {
            seq,
            code: code.clone(),
        });
        code
    }

    fn code_mut(&mut self, id: Uuid) -> Option<&mut InviteCode> {
        self.codes
            .iter_mut()
            .find(|s| s.code.id == id)
            .map(|s| &mut s.code)
    }

    fn insert_usage(
        &mut self,
        code_id: Uuid,
        ip_hash: &str,
        user_agent: Option<&str>,
        claimed_at: DateTime<Utc>,
    ) -> CodeUsage {
        let usage = CodeUsage {
            id: Uuid::new_v4(),
            code_id,
            ip_hash: ip_hash.to_string(),
            user_agent: user_agent.map(str::to_string),
            claimed_at,
            status: UsageStatus::Claimed,
            feedback: None,
            feedback_at: None,
            contributed_code_id: None,
            note: None,
        };
        let seq = self.next_seq();
        self.usages.push(StoredUsage {
            seq,
            usage: usage.clone(),
        });
        usage
    }

    fn usage_mut(&mut self, id: Uuid) -> Option<&mut CodeUsage> {
        self.usages
            .iter_mut()
            .find(|s| s.usage.id == id)
            .map(|s| &mut s.usage)
    }

    fn latest_usage_id_for(&self, ip_hash: &str) -> Option<Uuid> {
        self.usages
            .iter()
            .filter(|s| s.usage.ip_hash == ip_hash)
            .max_by_key(|s| (s.usage.claimed_at, s.seq))
            .map(|s| s.usage.id)
    }

    fn codes_newest_first<F>(&self, filter: F) -> Vec<InviteCode>
    where
        F: Fn(&InviteCode) -> bool,
    {
        let mut matching: Vec<&StoredCode> = self.codes.iter().filter(|s| filter(&s.code)).collect();
        matching.sort_by_key(|s| std::cmp::Reverse((s.code.created_at, s.seq)));
        matching.into_iter().map(|s| s.code.clone()).collect()
    }
}

/// Process-local store. Cheap to create; one per test.
#[derive(Debug, Default)]
pub struct MemoryInviteStore {
    state: Mutex<MemoryState>,
}

impl MemoryInviteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, InviteError> {
        self.state
            .lock()
            .map_err(|_| InviteError::Transaction("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CodeRepository for MemoryInviteStore {
    async fn create_code(&self, new_code: NewInviteCode) -> Result<InviteCode, InviteError> {
        let mut state = self.lock()?;
        if state.code_exists(&new_code.code) {
            return Err(InviteError::DuplicateCode(new_code.code));
        }
        Ok(state.insert_code(new_code))
    }

    async fn find_code_by_id(&self, id: Uuid) -> Result<Option<InviteCode>, InviteError> {
        let state = self.lock()?;
        Ok(state
            .codes
            .iter()
            .find(|s| s.code.id == id)
            .map(|s| s.code.clone()))
    }

    async fn find_code_by_value(&self, code: &str) -> Result<Option<InviteCode>, InviteError> {
        let state = self.lock()?;
        Ok(state
            .codes
            .iter()
            .find(|s| s.code.code == code)
            .map(|s| s.code.clone()))
    }

    async fn list_codes(&self) -> Result<Vec<InviteCode>, InviteError> {
        Ok(self.lock()?.codes_newest_first(|_| true))
    }

    async fn list_codes_by_status(
        &self,
        status: CodeStatus,
    ) -> Result<Vec<InviteCode>, InviteError> {
        Ok(self.lock()?.codes_newest_first(|c| c.status == status))
    }

    async fn update_code_status(
        &self,
        id: Uuid,
        status: CodeStatus,
    ) -> Result<Option<InviteCode>, InviteError> {
        let mut state = self.lock()?;
        Ok(state.code_mut(id).map(|code| {
            code.status = status;
            code.updated_at = Utc::now();
            code.clone()
        }))
    }

    async fn restore_code_status(&self, id: Uuid) -> Result<Option<InviteCode>, InviteError> {
        let mut state = self.lock()?;
        Ok(state.code_mut(id).map(|code| {
            code.status = CodeStatus::for_usage(code.usage_count, code.max_uses);
            code.updated_at = Utc::now();
            code.clone()
        }))
    }

    async fn delete_code(&self, id: Uuid) -> Result<bool, InviteError> {
        let mut state = self.lock()?;
        let before = state.codes.len();
        state.codes.retain(|s| s.code.id != id);
        if state.codes.len() == before {
            return Ok(false);
        }

        state.usages.retain(|s| s.usage.code_id != id);
        for stored in state.usages.iter_mut() {
            if stored.usage.contributed_code_id == Some(id) {
                stored.usage.contributed_code_id = None;
            }
        }
        Ok(true)
    }

    async fn count_codes(&self) -> Result<i64, InviteError> {
        Ok(self.lock()?.codes.len() as i64)
    }
}

#[async_trait]
impl UsageLedger for MemoryInviteStore {
    async fn record_claim(
        &self,
        code_id: Uuid,
        ip_hash: &str,
        user_agent: Option<&str>,
    ) -> Result<CodeUsage, InviteError> {
        let mut state = self.lock()?;
        if state.code_mut(code_id).is_none() {
            return Err(InviteError::code_not_found());
        }
        Ok(state.insert_usage(code_id, ip_hash, user_agent, Utc::now()))
    }

    async fn find_usage_by_id(&self, id: Uuid) -> Result<Option<CodeUsage>, InviteError> {
        let state = self.lock()?;
        Ok(state
            .usages
            .iter()
            .find(|s| s.usage.id == id)
            .map(|s| s.usage.clone()))
    }

    async fn list_usages_for_code(&self, code_id: Uuid) -> Result<Vec<CodeUsage>, InviteError> {
        let state = self.lock()?;
        let mut usages: Vec<&StoredUsage> = state
            .usages
            .iter()
            .filter(|s| s.usage.code_id == code_id)
            .collect();
        usages.sort_by_key(|s| std::cmp::Reverse((s.usage.claimed_at, s.seq)));
        Ok(usages.into_iter().map(|s| s.usage.clone()).collect())
    }

    async fn find_latest_usage_by_ip_hash(
        &self,
        ip_hash: &str,
    ) -> Result<Option<CodeUsage>, InviteError> {
        let mut state = self.lock()?;
        let latest = state.latest_usage_id_for(ip_hash);
        Ok(latest.and_then(|id| state.usage_mut(id).map(|u| u.clone())))
    }

    async fn set_usage_status(
        &self,
        id: Uuid,
        status: UsageStatus,
    ) -> Result<Option<CodeUsage>, InviteError> {
        let mut state = self.lock()?;
        Ok(state.usage_mut(id).map(|usage| {
            usage.status = status;
            usage.clone()
        }))
    }

    async fn link_contribution(
        &self,
        usage_id: Uuid,
        contributed_code_id: Uuid,
    ) -> Result<Option<CodeUsage>, InviteError> {
        let mut state = self.lock()?;
        Ok(state.usage_mut(usage_id).map(|usage| {
            usage.contributed_code_id = Some(contributed_code_id);
            usage.status = UsageStatus::Confirmed;
            usage.clone()
        }))
    }

    async fn count_usages(&self) -> Result<i64, InviteError> {
        Ok(self.lock()?.usages.len() as i64)
    }
}

#[async_trait]
impl AllocationStore for MemoryInviteStore {
    async fn claim_next(
        &self,
        caller: &CallerIdentity,
        exclude: &[Uuid],
    ) -> Result<Option<Claim>, InviteError> {
        let mut state = self.lock()?;

        let candidate = state
            .codes
            .iter()
            .filter(|s| s.code.is_claimable() && !exclude.contains(&s.code.id))
            .min_by_key(|s| (s.code.created_at, s.seq))
            .map(|s| s.code.id);

        let Some(code_id) = candidate else {
            return Ok(None);
        };

        let now = Utc::now();
        let code = match state.code_mut(code_id) {
            Some(code) => {
                code.usage_count += 1;
                code.status = CodeStatus::for_usage(code.usage_count, code.max_uses);
                code.last_claimed_at = Some(now);
                code.updated_at = now;
                code.clone()
            }
            None => return Err(InviteError::code_not_found()),
        };

        let usage = state.insert_usage(
            code_id,
            &caller.ip_hash,
            caller.user_agent.as_deref(),
            now,
        );

        Ok(Some(Claim { code, usage }))
    }

    async fn contribute(
        &self,
        new_code: NewInviteCode,
        ip_hash: &str,
    ) -> Result<Contribution, InviteError> {
        let mut state = self.lock()?;
        if state.code_exists(&new_code.code) {
            return Err(InviteError::DuplicateCode(new_code.code));
        }

        let code = state.insert_code(new_code);

        let attributed_usage = match state.latest_usage_id_for(ip_hash) {
            Some(usage_id) => state.usage_mut(usage_id).and_then(|usage| {
                if usage.contributed_code_id.is_some() {
                    return None;
                }
                usage.contributed_code_id = Some(code.id);
                usage.status = UsageStatus::Confirmed;
                Some(usage.clone())
            }),
            None => None,
        };

        Ok(Contribution {
            code,
            attributed_usage,
        })
    }

    async fn create_codes(
        &self,
        new_codes: Vec<NewInviteCode>,
    ) -> Result<Vec<InviteCode>, InviteError> {
        let mut state = self.lock()?;

        let mut seen = std::collections::HashSet::new();
        let duplicates: Vec<&str> = new_codes
            .iter()
            .map(|c| c.code.as_str())
            .filter(|value| state.code_exists(value) || !seen.insert(*value))
            .collect();
        if !duplicates.is_empty() {
            return Err(InviteError::DuplicateCode(duplicates.join(", ")));
        }

        Ok(new_codes
            .into_iter()
            .map(|new_code| state.insert_code(new_code))
            .collect())
    }

    async fn record_feedback(
        &self,
        usage_id: Uuid,
        feedback: Feedback,
        note: Option<&str>,
    ) -> Result<Option<FeedbackRecord>, InviteError> {
        let mut state = self.lock()?;

        let record = match state.usage_mut(usage_id) {
            None => return Ok(None),
            Some(usage) if usage.feedback.is_some() => FeedbackRecord {
                usage: usage.clone(),
                newly_recorded: false,
            },
            Some(usage) => {
                usage.feedback = Some(feedback);
                usage.feedback_at = Some(Utc::now());
                if let Some(note) = note {
                    usage.note = Some(note.to_string());
                }
                FeedbackRecord {
                    usage: usage.clone(),
                    newly_recorded: true,
                }
            }
        };

        if record.newly_recorded && feedback == Feedback::NotWorking {
            if let Some(code) = state.code_mut(record.usage.code_id) {
                code.not_working_reports += 1;
                code.updated_at = Utc::now();
            }
        }

        Ok(Some(record))
    }

    async fn mark_usage_used(&self, usage_id: Uuid) -> Result<Option<CodeUsage>, InviteError> {
        let mut state = self.lock()?;
        Ok(state.usage_mut(usage_id).map(|usage| {
            if usage.status == UsageStatus::Claimed {
                usage.status = UsageStatus::Used;
            }
            usage.clone()
        }))
    }

    async fn statistics(&self, review_threshold: i32) -> Result<CodeStatistics, InviteError> {
        let state = self.lock()?;
        let mut stats = CodeStatistics {
            total: state.codes.len() as i64,
            total_claims: state.usages.len() as i64,
            ..Default::default()
        };

        for code in state.codes.iter().map(|s| &s.code) {
            match code.status {
                CodeStatus::Available if code.usage_count < code.max_uses => stats.available += 1,
                CodeStatus::Available => {}
                CodeStatus::Active => stats.active += 1,
                CodeStatus::Exhausted => stats.exhausted += 1,
                CodeStatus::Invalid => stats.invalid += 1,
            }
            if code.needs_review(review_threshold) {
                stats.needs_review += 1;
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl AdminRepository for MemoryInviteStore {
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>, InviteError> {
        let state = self.lock()?;
        Ok(state.admins.iter().find(|a| a.username == username).cloned())
    }

    async fn find_admin_by_id(&self, id: Uuid) -> Result<Option<Admin>, InviteError> {
        let state = self.lock()?;
        Ok(state.admins.iter().find(|a| a.id == id).cloned())
    }

    async fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Admin, InviteError> {
        let mut state = self.lock()?;
        if state.admins.iter().any(|a| a.username == username) {
            return Err(InviteError::Validation(format!(
                "Admin '{}' already exists",
                username
            )));
        }

        let admin = Admin {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        state.admins.push(admin.clone());
        Ok(admin)
    }

    async fn count_admins(&self) -> Result<i64, InviteError> {
        Ok(self.lock()?.admins.len() as i64)
    }
}

#[async_trait]
impl InviteStore for MemoryInviteStore {
    async fn ping(&self) -> Result<(), InviteError> {
        self.lock().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(ip_hash: &str) -> CallerIdentity {
        CallerIdentity::new(ip_hash, Some("test-agent".to_string()))
    }

    #[tokio::test]
    async fn test_create_code_rejects_duplicate() {
        let store = MemoryInviteStore::new();
        store
            .create_code(NewInviteCode::available("ABC", 6))
            .await
            .unwrap();

        let result = store.create_code(NewInviteCode::available("ABC", 6)).await;
        assert!(matches!(result, Err(InviteError::DuplicateCode(c)) if c == "ABC"));
        assert_eq!(store.count_codes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_next_picks_oldest_and_updates_counters() {
        let store = MemoryInviteStore::new();
        let first = store
            .create_code(NewInviteCode::available("FIRST", 2))
            .await
            .unwrap();
        store
            .create_code(NewInviteCode::available("SECOND", 2))
            .await
            .unwrap();

        let claim = store.claim_next(&caller("h1"), &[]).await.unwrap().unwrap();
        assert_eq!(claim.code.id, first.id);
        assert_eq!(claim.code.usage_count, 1);
        assert_eq!(claim.code.status, CodeStatus::Active);
        assert!(claim.code.last_claimed_at.is_some());
        assert_eq!(claim.usage.code_id, first.id);
        assert_eq!(claim.usage.status, UsageStatus::Claimed);
        assert_eq!(claim.usage.user_agent.as_deref(), Some("test-agent"));

        let claim = store.claim_next(&caller("h2"), &[]).await.unwrap().unwrap();
        assert_eq!(claim.code.id, first.id);
        assert_eq!(claim.code.status, CodeStatus::Exhausted);

        let claim = store.claim_next(&caller("h3"), &[]).await.unwrap().unwrap();
        assert_eq!(claim.code.code, "SECOND");
    }

    #[tokio::test]
    async fn test_claim_next_honours_exclusions() {
        let store = MemoryInviteStore::new();
        let first = store
            .create_code(NewInviteCode::available("FIRST", 6))
            .await
            .unwrap();

        assert!(store
            .claim_next(&caller("h"), &[first.id])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_claim_does_not_touch_counters() {
        let store = MemoryInviteStore::new();
        let code = store
            .create_code(NewInviteCode::available("A", 6))
            .await
            .unwrap();

        let usage = store.record_claim(code.id, "h", None).await.unwrap();
        assert_eq!(usage.code_id, code.id);
        assert!(usage.user_agent.is_none());

        let stored = store.find_code_by_id(code.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 0);

        let missing = store.record_claim(Uuid::new_v4(), "h", None).await;
        assert!(matches!(missing, Err(InviteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_usages_and_clears_links() {
        let store = MemoryInviteStore::new();
        let code = store
            .create_code(NewInviteCode::available("A", 6))
            .await
            .unwrap();
        let claim = store.claim_next(&caller("h"), &[]).await.unwrap().unwrap();
        let contributed = store
            .contribute(NewInviteCode::available("B", 6), "h")
            .await
            .unwrap();
        assert!(contributed.attributed_usage.is_some());

        // Deleting the contributed code keeps the usage but drops the link.
        assert!(store.delete_code(contributed.code.id).await.unwrap());
        let usage = store.find_usage_by_id(claim.usage.id).await.unwrap().unwrap();
        assert!(usage.contributed_code_id.is_none());

        assert!(store.delete_code(code.id).await.unwrap());
        assert!(store.find_usage_by_id(claim.usage.id).await.unwrap().is_none());
        assert_eq!(store.count_usages().await.unwrap(), 0);
        assert!(!store.delete_code(code.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_codes_is_all_or_nothing() {
        let store = MemoryInviteStore::new();
        store
            .create_code(NewInviteCode::available("EXISTING", 6))
            .await
            .unwrap();

        let result = store
            .create_codes(vec![
                NewInviteCode::available("NEW-1", 6),
                NewInviteCode::available("EXISTING", 6),
            ])
            .await;
        assert!(matches!(result, Err(InviteError::DuplicateCode(c)) if c == "EXISTING"));
        assert_eq!(store.count_codes().await.unwrap(), 1);

        let in_batch = store
            .create_codes(vec![
                NewInviteCode::available("X", 6),
                NewInviteCode::available("X", 6),
            ])
            .await;
        assert!(matches!(in_batch, Err(InviteError::DuplicateCode(_))));
        assert_eq!(store.count_codes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_feedback_sets_once() {
        let store = MemoryInviteStore::new();
        store
            .create_code(NewInviteCode::available("A", 6))
            .await
            .unwrap();
        let claim = store.claim_next(&caller("h"), &[]).await.unwrap().unwrap();

        let first = store
            .record_feedback(claim.usage.id, Feedback::NotWorking, Some("expired"))
            .await
            .unwrap()
            .unwrap();
        assert!(first.newly_recorded);
        assert_eq!(first.usage.note.as_deref(), Some("expired"));

        let second = store
            .record_feedback(claim.usage.id, Feedback::Working, None)
            .await
            .unwrap()
            .unwrap();
        assert!(!second.newly_recorded);
        assert_eq!(second.usage.feedback, Some(Feedback::NotWorking));

        let code = store.find_code_by_id(claim.code.id).await.unwrap().unwrap();
        assert_eq!(code.not_working_reports, 1);

        assert!(store
            .record_feedback(Uuid::new_v4(), Feedback::Working, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_usage_used_only_moves_claimed() {
        let store = MemoryInviteStore::new();
        store
            .create_code(NewInviteCode::available("A", 6))
            .await
            .unwrap();
        let first = store.claim_next(&caller("h1"), &[]).await.unwrap().unwrap();
        let second = store.claim_next(&caller("h2"), &[]).await.unwrap().unwrap();

        let used = store.mark_usage_used(first.usage.id).await.unwrap().unwrap();
        assert_eq!(used.status, UsageStatus::Used);

        let gift = store
            .contribute(NewInviteCode::available("GIFT", 6), "h2")
            .await
            .unwrap();
        assert!(gift.attributed_usage.is_some());
        let confirmed = store.mark_usage_used(second.usage.id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, UsageStatus::Confirmed);
        assert_eq!(confirmed.contributed_code_id, Some(gift.code.id));

        assert!(store.mark_usage_used(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_code_status_follows_counters() {
        let store = MemoryInviteStore::new();
        let code = store
            .create_code(NewInviteCode::available("A", 2))
            .await
            .unwrap();
        store.claim_next(&caller("h"), &[]).await.unwrap().unwrap();
        store
            .update_code_status(code.id, CodeStatus::Invalid)
            .await
            .unwrap();

        let restored = store.restore_code_status(code.id).await.unwrap().unwrap();
        assert_eq!(restored.status, CodeStatus::Active);
        assert_eq!(restored.usage_count, 1);
        assert!(store.restore_code_status(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let store = MemoryInviteStore::new();
        for value in ["A", "B", "C"] {
            store
                .create_code(NewInviteCode::available(value, 6))
                .await
                .unwrap();
        }

        let values: Vec<String> = store
            .list_codes()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(values, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_admin_repository() {
        let store = MemoryInviteStore::new();
        assert_eq!(store.count_admins().await.unwrap(), 0);

        let admin = store.create_admin("admin", "hash").await.unwrap();
        assert_eq!(
            store.find_admin_by_username("admin").await.unwrap().unwrap().id,
            admin.id
        );
        assert!(store.find_admin_by_id(admin.id).await.unwrap().is_some());
        assert!(store.create_admin("admin", "other").await.is_err());
        assert_eq!(store.count_admins().await.unwrap(), 1);
    }
}

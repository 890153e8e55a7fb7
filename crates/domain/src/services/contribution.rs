//! Code contribution and pool statistics.

use std::sync::Arc;

use metrics::counter;
use shared::validation::{normalize_code, validate_code_value};
use tracing::info;

use crate::error::InviteError;
use crate::models::{CallerIdentity, CodePolicy, CodeStatistics, Contribution, NewInviteCode};

use super::store::InviteStore;

/// Accepts codes from the community and reports on the pool.
#[derive(Clone)]
pub struct ContributionService {
    store: Arc<dyn InviteStore>,
    policy: CodePolicy,
}

impl ContributionService {
    pub fn new(store: Arc<dyn InviteStore>, policy: CodePolicy) -> Self {
        Self { store, policy }
    }

    /// Adds a contributed code to the pool and credits the caller's most
    /// recent claim, if that claim has not contributed before.
    pub async fn contribute(
        &self,
        raw_code: &str,
        caller: &CallerIdentity,
    ) -> Result<Contribution, InviteError> {
        let code = normalize_code(raw_code);
        validate_code_value(code)?;

        let contribution = self
            .store
            .contribute(
                NewInviteCode::available(code, self.policy.default_max_uses),
                &caller.ip_hash,
            )
            .await?;

        counter!("codes_contributed_total").increment(1);
        info!(
            code_id = %contribution.code.id,
            attributed_usage_id = ?contribution.attributed_usage.as_ref().map(|u| u.id),
            "Code contributed"
        );

        Ok(contribution)
    }

    pub async fn statistics(&self) -> Result<CodeStatistics, InviteError> {
        self.store.statistics(self.policy.review_threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CodeStatus, Feedback, UsageStatus};
    use crate::services::allocation::AllocationService;
    use crate::services::memory_store::MemoryInviteStore;
    use crate::services::store::{AllocationStore, CodeRepository, UsageLedger};

    fn caller(ip_hash: &str) -> CallerIdentity {
        CallerIdentity::new(ip_hash, None)
    }

    fn services() -> (Arc<MemoryInviteStore>, AllocationService, ContributionService) {
        let store = Arc::new(MemoryInviteStore::new());
        let allocation = AllocationService::new(store.clone());
        let contribution = ContributionService::new(store.clone(), CodePolicy::default());
        (store, allocation, contribution)
    }

    #[tokio::test]
    async fn test_contribute_trims_and_uses_default_capacity() {
        let (_store, _allocation, service) = services();

        let contribution = service
            .contribute("  SORA-NEW-1 \n", &caller("h"))
            .await
            .unwrap();

        assert_eq!(contribution.code.code, "SORA-NEW-1");
        assert_eq!(contribution.code.max_uses, 6);
        assert_eq!(contribution.code.usage_count, 0);
        assert_eq!(contribution.code.status, CodeStatus::Available);
        assert!(contribution.attributed_usage.is_none());
    }

    #[tokio::test]
    async fn test_contribute_rejects_blank_and_whitespace() {
        let (store, _allocation, service) = services();

        assert!(matches!(
            service.contribute("   ", &caller("h")).await,
            Err(InviteError::Validation(_))
        ));
        assert!(matches!(
            service.contribute("AB CD", &caller("h")).await,
            Err(InviteError::Validation(_))
        ));
        assert_eq!(store.count_codes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_contribution_leaves_pool_unchanged() {
        let (store, _allocation, service) = services();
        service.contribute("DUP", &caller("h")).await.unwrap();

        let result = service.contribute(" DUP ", &caller("h")).await;
        assert!(matches!(result, Err(InviteError::DuplicateCode(c)) if c == "DUP"));
        assert_eq!(store.count_codes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_contribution_attributed_to_latest_claim() {
        let (store, allocation, service) = services();
        store
            .create_code(NewInviteCode::available("POOL", 6))
            .await
            .unwrap();

        let _older = allocation.claim(&caller("h")).await.unwrap();
        let latest = allocation.claim(&caller("h")).await.unwrap();
        let other = allocation.claim(&caller("someone-else")).await.unwrap();

        let contribution = service.contribute("GIFT", &caller("h")).await.unwrap();
        let linked = contribution.attributed_usage.unwrap();
        assert_eq!(linked.id, latest.usage.id);
        assert_eq!(linked.status, UsageStatus::Confirmed);
        assert_eq!(linked.contributed_code_id, Some(contribution.code.id));

        let untouched = store.find_usage_by_id(other.usage.id).await.unwrap().unwrap();
        assert!(untouched.contributed_code_id.is_none());
    }

    #[tokio::test]
    async fn test_second_contribution_is_not_attributed_again() {
        let (store, allocation, service) = services();
        store
            .create_code(NewInviteCode::available("POOL", 6))
            .await
            .unwrap();
        let claim = allocation.claim(&caller("h")).await.unwrap();

        let first = service.contribute("GIFT-1", &caller("h")).await.unwrap();
        assert!(first.attributed_usage.is_some());

        let second = service.contribute("GIFT-2", &caller("h")).await.unwrap();
        assert!(second.attributed_usage.is_none());

        let usage = store.find_usage_by_id(claim.usage.id).await.unwrap().unwrap();
        assert_eq!(usage.contributed_code_id, Some(first.code.id));
    }

    #[tokio::test]
    async fn test_statistics() {
        let (store, allocation, service) = services();
        for value in ["A", "B", "C", "D"] {
            store
                .create_code(NewInviteCode::available(value, 1))
                .await
                .unwrap();
        }
        let invalid = store.find_code_by_value("D").await.unwrap().unwrap();
        store
            .update_code_status(invalid.id, CodeStatus::Invalid)
            .await
            .unwrap();
        allocation.claim(&caller("h")).await.unwrap();

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.total_claims, 1);
        assert_eq!(stats.needs_review, 0);
    }

    #[tokio::test]
    async fn test_statistics_counts_codes_needing_review() {
        let store = Arc::new(MemoryInviteStore::new());
        let service = ContributionService::new(
            store.clone(),
            CodePolicy {
                default_max_uses: 6,
                review_threshold: 2,
            },
        );
        let code = store
            .create_code(NewInviteCode::available("FLAKY", 6))
            .await
            .unwrap();

        for i in 0..2 {
            let usage = store
                .record_claim(code.id, &format!("h{}", i), None)
                .await
                .unwrap();
            store
                .record_feedback(usage.id, Feedback::NotWorking, None)
                .await
                .unwrap();
        }

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.needs_review, 1);
        assert_eq!(stats.total_claims, 2);
    }

    #[tokio::test]
    async fn test_total_claims_tracks_ledger() {
        let (store, allocation, service) = services();
        store
            .create_code(NewInviteCode::available("A", 6))
            .await
            .unwrap();
        for i in 0..4 {
            allocation.claim(&caller(&format!("h{}", i))).await.unwrap();
        }

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats.total_claims, store.count_usages().await.unwrap());
        assert_eq!(stats.total_claims, 4);
        assert_eq!(stats.active, 1);
    }
}

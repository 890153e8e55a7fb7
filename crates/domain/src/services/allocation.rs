//! Claim, feedback and mark-used operations.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::InviteError;
use crate::models::code_usage::MAX_NOTE_LENGTH;
use crate::models::{CallerIdentity, Claim, CodeUsage, Feedback};

use super::store::InviteStore;

/// What happened to a feedback submission.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackOutcome {
    pub recorded: Feedback,
    pub replaced: bool,
    pub replacement: Option<Claim>,
    /// True when the usage already had feedback; nothing changed.
    pub already_recorded: bool,
    pub message: String,
}

/// Hands out codes from the pool.
#[derive(Clone)]
pub struct AllocationService {
    store: Arc<dyn InviteStore>,
}

impl AllocationService {
    pub fn new(store: Arc<dyn InviteStore>) -> Self {
        Self { store }
    }

    /// Claims one use of the oldest claimable code.
    pub async fn claim(&self, caller: &CallerIdentity) -> Result<Claim, InviteError> {
        self.claim_excluding(caller, &[]).await
    }

    async fn claim_excluding(
        &self,
        caller: &CallerIdentity,
        exclude: &[Uuid],
    ) -> Result<Claim, InviteError> {
        match self.store.claim_next(caller, exclude).await? {
            Some(claim) => {
                counter!("codes_claimed_total").increment(1);
                info!(
                    code_id = %claim.code.id,
                    usage_id = %claim.usage.id,
                    usage_count = claim.code.usage_count,
                    max_uses = claim.code.max_uses,
                    status = %claim.code.status,
                    "Code claimed"
                );
                Ok(claim)
            }
            None => {
                counter!("codes_pool_empty_total").increment(1);
                info!("Claim attempted with empty pool");
                Err(InviteError::NoCodesAvailable)
            }
        }
    }

    /// Records whether a claimed code worked. A first "not working" report
    /// triggers a replacement claim for the same caller, skipping the
    /// reported code.
    pub async fn submit_feedback(
        &self,
        usage_id: Uuid,
        working: bool,
        note: Option<&str>,
        caller: &CallerIdentity,
    ) -> Result<FeedbackOutcome, InviteError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if let Some(note) = note {
            if note.chars().count() as u64 > MAX_NOTE_LENGTH {
                return Err(InviteError::Validation(format!(
                    "note must be at most {} characters",
                    MAX_NOTE_LENGTH
                )));
            }
        }

        let feedback = Feedback::from_working(working);
        let record = self
            .store
            .record_feedback(usage_id, feedback, note)
            .await?
            .ok_or_else(InviteError::usage_not_found)?;

        if !record.newly_recorded {
            info!(usage_id = %usage_id, "Feedback already recorded for usage");
            return Ok(FeedbackOutcome {
                recorded: record.usage.feedback.unwrap_or(feedback),
                replaced: false,
                replacement: None,
                already_recorded: true,
                message: "Feedback was already recorded for this code".to_string(),
            });
        }

        info!(
            usage_id = %usage_id,
            code_id = %record.usage.code_id,
            feedback = feedback.as_str(),
            "Feedback recorded"
        );

        if feedback == Feedback::Working {
            return Ok(FeedbackOutcome {
                recorded: feedback,
                replaced: false,
                replacement: None,
                already_recorded: false,
                message: "Thanks for confirming the code works".to_string(),
            });
        }

        match self
            .claim_excluding(caller, &[record.usage.code_id])
            .await
        {
            Ok(replacement) => {
                counter!("codes_replaced_total").increment(1);
                info!(
                    usage_id = %usage_id,
                    reported_code_id = %record.usage.code_id,
                    replacement_code_id = %replacement.code.id,
                    "Replacement code issued"
                );
                Ok(FeedbackOutcome {
                    recorded: feedback,
                    replaced: true,
                    replacement: Some(replacement),
                    already_recorded: false,
                    message: "Here is a replacement code".to_string(),
                })
            }
            Err(InviteError::NoCodesAvailable) => {
                warn!(usage_id = %usage_id, "No replacement available");
                Ok(FeedbackOutcome {
                    recorded: feedback,
                    replaced: false,
                    replacement: None,
                    already_recorded: false,
                    message: "Thanks for the report. No replacement code is available right now"
                        .to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Marks a usage as redeemed. Idempotent; never downgrades a confirmed usage.
    pub async fn mark_used(&self, usage_id: Uuid) -> Result<CodeUsage, InviteError> {
        let usage = self
            .store
            .mark_usage_used(usage_id)
            .await?
            .ok_or_else(InviteError::usage_not_found)?;

        info!(
            usage_id = %usage_id,
            code_id = %usage.code_id,
            status = %usage.status,
            "Usage marked as used"
        );
        Ok(usage)
    }
}

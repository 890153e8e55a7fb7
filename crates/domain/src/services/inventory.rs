//! Admin inventory management.

use std::collections::HashSet;
use std::sync::Arc;

use shared::validation::{normalize_code, validate_code_value};
use tracing::info;
use uuid::Uuid;

use crate::error::InviteError;
use crate::models::invite_code::MAX_USES_LIMIT;
use crate::models::{
    AdminCodeView, AdminGate, CodePolicy, CodeStatus, CodeUsage, InviteCode, NewInviteCode,
};

use super::store::InviteStore;

/// Admin-only operations over the code inventory. Every call checks the gate first.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn InviteStore>,
    policy: CodePolicy,
}

impl InventoryService {
    pub fn new(store: Arc<dyn InviteStore>, policy: CodePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn list_codes(
        &self,
        gate: AdminGate,
        status: Option<CodeStatus>,
    ) -> Result<Vec<AdminCodeView>, InviteError> {
        gate.require()?;

        let codes = match status {
            Some(status) => self.store.list_codes_by_status(status).await?,
            None => self.store.list_codes().await?,
        };

        Ok(codes
            .into_iter()
            .map(|code| AdminCodeView::new(code, self.policy.review_threshold))
            .collect())
    }

    pub async fn get_code(&self, gate: AdminGate, id: Uuid) -> Result<AdminCodeView, InviteError> {
        gate.require()?;

        let code = self
            .store
            .find_code_by_id(id)
            .await?
            .ok_or_else(InviteError::code_not_found)?;
        Ok(AdminCodeView::new(code, self.policy.review_threshold))
    }

    /// Adds a batch of codes. Blank lines are skipped; a duplicate anywhere
    /// in the batch or in the store rejects the whole batch.
    pub async fn add_codes(
        &self,
        gate: AdminGate,
        values: &[String],
        max_uses: Option<i32>,
    ) -> Result<Vec<InviteCode>, InviteError> {
        gate.require()?;

        let max_uses = max_uses.unwrap_or(self.policy.default_max_uses);
        if !(1..=MAX_USES_LIMIT).contains(&max_uses) {
            return Err(InviteError::Validation(format!(
                "maxUses must be between 1 and {}",
                MAX_USES_LIMIT
            )));
        }

        let mut seen = HashSet::new();
        let mut new_codes = Vec::new();
        for value in values.iter().map(|v| normalize_code(v)) {
            if value.is_empty() {
                continue;
            }
            validate_code_value(value)?;
            if !seen.insert(value) {
                return Err(InviteError::DuplicateCode(value.to_string()));
            }
            new_codes.push(NewInviteCode::available(value, max_uses));
        }

        if new_codes.is_empty() {
            return Err(InviteError::Validation(
                "At least one code is required".to_string(),
            ));
        }

        let created = self.store.create_codes(new_codes).await?;
        info!(count = created.len(), max_uses, "Admin added codes");
        Ok(created)
    }

    /// Changes a code's status. `invalid` can be forced at any time and takes
    /// the code out of selection. Any other status must match what the usage
    /// counters imply; setting it recomputes the status from those counters.
    pub async fn update_status(
        &self,
        gate: AdminGate,
        id: Uuid,
        status: CodeStatus,
    ) -> Result<AdminCodeView, InviteError> {
        gate.require()?;

        let code = if status == CodeStatus::Invalid {
            self.store.update_code_status(id, status).await?
        } else {
            let current = self
                .store
                .find_code_by_id(id)
                .await?
                .ok_or_else(InviteError::code_not_found)?;
            let derived = CodeStatus::for_usage(current.usage_count, current.max_uses);
            if status != derived {
                return Err(InviteError::Validation(format!(
                    "Cannot set status {} on a code with {} of {} uses; expected {}",
                    status, current.usage_count, current.max_uses, derived
                )));
            }
            self.store.restore_code_status(id).await?
        }
        .ok_or_else(InviteError::code_not_found)?;

        info!(code_id = %id, status = %code.status, "Admin updated code status");
        Ok(AdminCodeView::new(code, self.policy.review_threshold))
    }

    /// Hard delete. The code's usages are removed with it.
    pub async fn delete_code(&self, gate: AdminGate, id: Uuid) -> Result<(), InviteError> {
        gate.require()?;

        if !self.store.delete_code(id).await? {
            return Err(InviteError::code_not_found());
        }

        info!(code_id = %id, "Admin deleted code");
        Ok(())
    }

    pub async fn list_usages(
        &self,
        gate: AdminGate,
        code_id: Uuid,
    ) -> Result<Vec<CodeUsage>, InviteError> {
        gate.require()?;

        if self.store.find_code_by_id(code_id).await?.is_none() {
            return Err(InviteError::code_not_found());
        }
        self.store.list_usages_for_code(code_id).await
    }
}

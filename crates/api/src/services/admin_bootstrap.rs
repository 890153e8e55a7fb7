//! First-start setup: the initial admin account and optional seed codes.
//!
//! Both steps are idempotent. The admin is created only while no admin
//! exists, and seed codes are inserted only into an empty pool.

use domain::models::{Admin, AdminGate};
use domain::services::{AdminRepository, CodeRepository, InventoryService, InviteStore};
use domain::InviteError;
use shared::crypto::random_secret;
use shared::password::{hash_password, PasswordError};
use tracing::{info, warn};

use crate::config::{AdminConfig, BootstrapConfig};

/// Length of a generated bootstrap password.
const GENERATED_PASSWORD_LEN: usize = 24;

/// Error types for bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Store error: {0}")]
    Store(#[from] InviteError),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] PasswordError),
}

/// Create the bootstrap admin if configured and no admin exists yet.
///
/// Returns the created admin, or `None` when nothing was done.
pub async fn bootstrap_admin(
    store: &dyn InviteStore,
    config: &AdminConfig,
) -> Result<Option<Admin>, BootstrapError> {
    let username = config.bootstrap_username.trim();
    if username.is_empty() {
        return Ok(None);
    }

    if store.count_admins().await? > 0 {
        info!("Admin account already exists - skipping bootstrap");
        return Ok(None);
    }

    let generated = config.bootstrap_password.is_empty();
    let password = if generated {
        random_secret(GENERATED_PASSWORD_LEN)
    } else {
        config.bootstrap_password.clone()
    };

    let password_hash = hash_password(&password)?;
    let admin = store.create_admin(username, &password_hash).await?;

    info!(admin_id = %admin.id, username = %admin.username, "Bootstrap admin created");

    if generated {
        warn!(
            username = %admin.username,
            "SECURITY: Generated bootstrap admin password: {}. \
             It is not shown again; set INVITE__ADMIN__BOOTSTRAP_PASSWORD to choose one.",
            password
        );
    }

    Ok(Some(admin))
}

/// Insert the configured seed codes when the pool is empty.
///
/// Returns the number of codes inserted.
pub async fn seed_codes(
    store: &dyn InviteStore,
    inventory: &InventoryService,
    config: &BootstrapConfig,
) -> Result<usize, BootstrapError> {
    if config.seed_codes.is_empty() {
        return Ok(0);
    }

    if store.count_codes().await? > 0 {
        info!("Code pool is not empty - skipping seed codes");
        return Ok(0);
    }

    let created = inventory
        .add_codes(AdminGate::granted(), &config.seed_codes, None)
        .await?;

    info!(count = created.len(), "Seed codes inserted");
    Ok(created.len())
}

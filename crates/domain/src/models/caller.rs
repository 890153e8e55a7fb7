//! Who is calling: an anonymous fingerprint for public calls, a gate for admin calls.

use crate::error::InviteError;

/// Anonymous caller fingerprint recorded with every claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Keyed hash of the client address. Raw addresses are never stored.
    pub ip_hash: String,
    pub user_agent: Option<String>,
}

impl CallerIdentity {
    pub fn new(ip_hash: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_hash: ip_hash.into(),
            user_agent,
        }
    }
}

/// Result of the admin authentication check, passed into admin operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminGate(bool);

impl AdminGate {
    pub fn granted() -> Self {
        AdminGate(true)
    }

    pub fn denied() -> Self {
        AdminGate(false)
    }

    pub fn from_authenticated(authenticated: bool) -> Self {
        AdminGate(authenticated)
    }

    pub fn require(&self) -> Result<(), InviteError> {
        if self.0 {
            Ok(())
        } else {
            Err(InviteError::Unauthorized)
        }
    }
}

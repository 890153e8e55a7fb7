//! Domain error taxonomy.

use thiserror::Error;

/// Failures surfaced by stores and services.
///
/// `NoCodesAvailable` and `DuplicateCode` are expected business outcomes and
/// must stay distinguishable from `Transaction`, which always means the store
/// aborted and rolled back.
#[derive(Debug, Error)]
pub enum InviteError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Code already exists: {0}")]
    DuplicateCode(String),

    #[error("No codes available")]
    NoCodesAvailable,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

impl InviteError {
    pub fn code_not_found() -> Self {
        InviteError::NotFound("Code".to_string())
    }

    pub fn usage_not_found() -> Self {
        InviteError::NotFound("Usage".to_string())
    }

    /// Returns true for outcomes that are part of normal operation.
    pub fn is_expected(&self) -> bool {
        !matches!(self, InviteError::Transaction(_))
    }
}

impl From<validator::ValidationError> for InviteError {
    fn from(err: validator::ValidationError) -> Self {
        let message = err
            .message
            .map(|m| m.to_string())
            .unwrap_or_else(|| err.code.to_string());
        InviteError::Validation(message)
    }
}

impl From<validator::ValidationErrors> for InviteError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        InviteError::Validation(messages.join(", "))
    }
}

//! Invite code value validation.

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

/// Maximum length of an invite code value after trimming.
pub const MAX_CODE_LENGTH: usize = 128;

lazy_static! {
    /// Code values are opaque, but never contain whitespace or control characters.
    static ref CODE_VALUE_REGEX: Regex = Regex::new(r"^[^\s\p{Cc}]+$").unwrap();
}

/// Trims surrounding whitespace from a user supplied code value.
pub fn normalize_code(raw: &str) -> &str {
    raw.trim()
}

/// Validates an already-normalized code value.
pub fn validate_code_value(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        let mut err = ValidationError::new("code_required");
        err.message = Some("Code is required".into());
        return Err(err);
    }

    if code.chars().count() > MAX_CODE_LENGTH {
        let mut err = ValidationError::new("code_length");
        err.message = Some(format!("Code must be at most {} characters", MAX_CODE_LENGTH).into());
        return Err(err);
    }

    if !CODE_VALUE_REGEX.is_match(code) {
        let mut err = ValidationError::new("code_format");
        err.message = Some("Code must not contain whitespace".into());
        return Err(err);
    }

    Ok(())
}

//! Validation errors for domain models

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field}: {reason}")]
    InvalidFormat { field: &'static str, reason: &'static str },

    #[error("invalid {field} value: '{value}'")]
    InvalidVariant { field: &'static str, value: String },

    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },

    #[error("duplicate {field}: '{value}'")]
    Duplicate { field: &'static str, value: String },

    #[error("start_date must be before end_date")]
    DateOrder,

    #[error("end_date must be in the future")]
    EndInPast,
}

impl ValidationError {
    /// Name of the offending field, reported alongside the message.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Empty { field }
            | Self::TooLong { field, .. }
            | Self::InvalidFormat { field, .. }
            | Self::InvalidVariant { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::Duplicate { field, .. } => field,
            Self::DateOrder => "start_date",
            Self::EndInPast => "end_date",
        }
    }
}

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    optional_text(field, trimmed, max).map(|s| s.unwrap_or_default())
}

/// Like [`required_text`] but an empty value becomes `None`.
pub fn optional_text(field: &'static str, value: &str, max: usize) -> Result<Option<String>, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(Some(trimmed.to_string()))
}

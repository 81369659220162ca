//! Error types for protocol parsing and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or validating protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A field failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Offending field, in wire (camelCase) form.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// The message body is not valid JSON for the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// An enum value was not recognised.
    #[error("unknown {kind}: {value}")]
    UnknownValue {
        /// Kind of value (e.g. "entity type").
        kind: &'static str,
        /// The rejected text.
        value: String,
    },
}

impl ProtocolError {
    /// Creates a validation error for `field`.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_names_field() {
        let err = ProtocolError::validation("storeId", "must not be empty");
        assert_eq!(err.to_string(), "invalid storeId: must not be empty");
    }

    #[test]
    fn malformed_wraps_json_error() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("malformed message"));
    }
}

//! Unified error hierarchy
//!
//! Structured error types for the codec boundary and the pipelines, with
//! severity levels mapped onto the tracing system. Fatal conditions abort
//! a run; everything else is logged and recovered in place.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all inclinefit operations.
#[derive(Debug, Error)]
pub enum InclineError {
    /// Codec boundary errors (decode/encode)
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors at the codec boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input file does not exist
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The byte stream could not be parsed; fatal for the whole run
    #[error("malformed file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// One rewritten message violates the wire schema; the caller skips it
    /// and continues encoding the rest
    #[error("cannot encode {kind} message: {reason}")]
    MessageEncode { kind: String, reason: String },

    /// A field value cannot be represented in its wire type
    #[error("field {field} of {kind} not writable: {reason}")]
    UnwritableField {
        kind: String,
        field: u8,
        reason: String,
    },
}

/// Result type alias for inclinefit operations.
pub type Result<T> = std::result::Result<T, InclineError>;

impl InclineError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            InclineError::Codec(
                CodecError::MessageEncode { .. } | CodecError::UnwritableField { .. }
            )
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            InclineError::Codec(CodecError::MessageEncode { .. }) => ErrorSeverity::Warning,
            InclineError::Codec(CodecError::UnwritableField { .. }) => ErrorSeverity::Warning,
            InclineError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents the run but leaves the system healthy
    Error,
    /// Warning that does not prevent the run
    Warning,
}

impl ErrorSeverity {
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_is_fatal() {
        let err = InclineError::Codec(CodecError::Malformed {
            path: PathBuf::from("run.fit"),
            reason: "bad header".to_string(),
        });
        assert!(err.is_fatal());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    #[test]
    fn test_message_encode_is_recoverable() {
        let err = InclineError::Codec(CodecError::MessageEncode {
            kind: "session".to_string(),
            reason: "value out of range".to_string(),
        });
        assert!(!err.is_fatal());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_error_display_names_file() {
        let err = InclineError::Codec(CodecError::FileNotFound {
            path: PathBuf::from("missing.fit"),
        });
        assert!(err.to_string().contains("missing.fit"));
    }
}

//! Error types for the audit logging system.

use thiserror::Error;

use crate::sink::SinkKind;

/// Errors that can occur while formatting or delivering audit records.
#[derive(Debug, Error)]
pub enum TrustLogError {
    /// The category is not a member of the fixed category set.
    #[error("unknown audit category: {category}")]
    InvalidCategory {
        /// The category name that failed to parse.
        category: String,
    },

    /// The source name is empty or blank.
    #[error("source name must be a non-empty string")]
    InvalidSource,

    /// A required payload field is missing or has the wrong type.
    #[error("payload is missing required field: {field}")]
    MalformedPayload {
        /// The field that is missing or malformed.
        field: String,
    },

    /// A sink failed to deliver a record.
    ///
    /// One failure is produced per failing sink; sibling sinks are
    /// unaffected.
    #[error("delivery to {sink} sink failed: {reason}")]
    DeliveryFailed {
        /// The sink that failed.
        sink: SinkKind,
        /// Why delivery failed.
        reason: String,
    },

    /// The logger configuration is invalid.
    #[error("invalid logger configuration: {reason}")]
    ConfigurationError {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// Failed to serialize a record.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for audit logging operations.
pub type Result<T> = std::result::Result<T, TrustLogError>;

//! # Error Types
//!
//! Structured error types for pricing_core. Every failure carries enough
//! context for a caller (UI, CLI, batch job) to tell the user what to fix
//! without guessing a price.
//!
//! ## Taxonomy
//!
//! - **Validation** - bad measurements, negative quantity, a markup that
//!   implies a negative sell price. Fails fast, never retried.
//! - **Configuration** - a material with neither a grid nor a flat price,
//!   or a grid whose rows don't line up with its width columns.
//! - **Store** - raised by the persistence layer behind [`crate::store`].
//!
//! Batch resync isolates all three per item; single-item pricing returns
//! them to the caller as-is.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::errors::{PricingError, PricingResult};
//!
//! fn validate_width(width_cm: f64) -> PricingResult<()> {
//!     if width_cm <= 0.0 {
//!         return Err(PricingError::validation(
//!             "width_cm",
//!             width_cm.to_string(),
//!             "Width must be positive",
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! assert!(validate_width(-5.0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pricing_core operations
pub type PricingResult<T> = Result<T, PricingError>;

/// Structured error type for pricing operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum PricingError {
    /// An input value is invalid (non-positive measurement, negative quantity, etc.)
    #[error("Invalid value for '{field}': {value} - {reason}")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    /// Pricing data is missing or inconsistent for the referenced material/grid
    #[error("Configuration error for {subject}: {reason}")]
    Configuration { subject: String, reason: String },

    /// The record store rejected a read or write
    #[error("Store error during {operation}: {reason}")]
    Store { operation: String, reason: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// Workbook is locked by another user/process
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },
}

impl PricingError {
    /// Create a Validation error
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PricingError::Validation {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a Configuration error
    pub fn configuration(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::Configuration {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Create a Store error
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PricingError::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(
        operation: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PricingError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(
        path: impl Into<String>,
        locked_by: impl Into<String>,
        locked_at: impl Into<String>,
    ) -> Self {
        PricingError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Whether a batch job should skip the failing item and carry on.
    pub fn is_item_isolated(&self) -> bool {
        matches!(
            self,
            PricingError::Validation { .. }
                | PricingError::Configuration { .. }
                | PricingError::Store { .. }
        )
    }

    /// Check if this is a recoverable error (e.g., can retry later)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PricingError::FileLocked { .. } | PricingError::Store { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PricingError::Validation { .. } => "VALIDATION_ERROR",
            PricingError::Configuration { .. } => "CONFIGURATION_ERROR",
            PricingError::Store { .. } => "STORE_ERROR",
            PricingError::FileError { .. } => "FILE_ERROR",
            PricingError::FileLocked { .. } => "FILE_LOCKED",
            PricingError::SerializationError { .. } => "SERIALIZATION_ERROR",
            PricingError::VersionMismatch { .. } => "VERSION_MISMATCH",
        }
    }
}

impl From<serde_json::Error> for PricingError {
    fn from(e: serde_json::Error) -> Self {
        PricingError::SerializationError { reason: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = PricingError::validation("drop_cm", "-5", "Drop must be positive");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"Validation\""));
        let roundtrip: PricingError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PricingError::configuration("m", "x").error_code(), "CONFIGURATION_ERROR");
        assert_eq!(PricingError::store("write", "timeout").error_code(), "STORE_ERROR");
    }

    #[test]
    fn test_batch_isolation() {
        assert!(PricingError::store("fetch", "down").is_item_isolated());
        assert!(PricingError::configuration("material", "no price").is_item_isolated());
        assert!(!PricingError::file_locked("a", "b", "c").is_item_isolated());
    }
}

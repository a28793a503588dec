//! Error types for `VantaDB`.
//!
//! A single crate-wide error enum covering every operation. Each variant
//! carries a stable `VANTA-XXX` code for log correlation and maps onto one
//! of the coarse [`ErrorKind`] categories embedders branch on.

use thiserror::Error;

/// Result type alias for `VantaDB` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error categories for callers that map errors onto transport
/// status codes (HTTP 400/404/409/500) or retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller supplied a malformed vector, id, metadata, or parameter.
    InvalidInput,
    /// Operation issued against an uninitialized, closed, or degraded database.
    InvalidState,
    /// A referenced id does not exist.
    NotFound,
    /// Duplicate id within a single batch.
    Conflict,
    /// Graph-structural index failure.
    Index,
    /// Storage backend I/O or integrity failure.
    Storage,
    /// Snapshot format or checksum failure.
    Persistence,
    /// Quantizer misuse or codebook mismatch.
    Quantization,
    /// Allocation or capacity exhaustion.
    Resource,
    /// Out-of-range parameter, unknown metric or index type.
    Configuration,
}

/// Errors that can occur in `VantaDB` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (VANTA-001): empty/NaN vector, malformed id, bad metadata.
    #[error("[VANTA-001] Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch (VANTA-002).
    #[error("[VANTA-002] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Invalid state (VANTA-003): operation on an uninitialized or closed database.
    #[error("[VANTA-003] Invalid state: {0}")]
    InvalidState(String),

    /// Not found (VANTA-004).
    #[error("[VANTA-004] Id '{0}' not found")]
    NotFound(String),

    /// Conflict (VANTA-005): duplicate id within a single batch.
    #[error("[VANTA-005] Conflict: {0}")]
    Conflict(String),

    /// Index error (VANTA-006): graph-structural failure, invalid entry point.
    #[error("[VANTA-006] Index error: {0}")]
    Index(String),

    /// Storage error (VANTA-007).
    #[error("[VANTA-007] Storage error: {0}")]
    Storage(String),

    /// IO error (VANTA-008).
    #[error("[VANTA-008] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (VANTA-009).
    #[error("[VANTA-009] Serialization error: {0}")]
    Serialization(String),

    /// Persistence error (VANTA-010): snapshot version or checksum failure.
    #[error("[VANTA-010] Persistence error: {0}")]
    Persistence(String),

    /// Quantization error (VANTA-011): untrained quantizer, codebook mismatch.
    #[error("[VANTA-011] Quantization error: {0}")]
    Quantization(String),

    /// Resource error (VANTA-012): allocation or capacity exhaustion.
    #[error("[VANTA-012] Resource error: {0}")]
    Resource(String),

    /// Configuration error (VANTA-013).
    #[error("[VANTA-013] Configuration error: {0}")]
    Config(String),

    /// Inconsistent state (VANTA-014): store is non-empty but no dimension
    /// can be inferred. Requires manual intervention.
    #[error("[VANTA-014] Inconsistent state: {0}")]
    InconsistentState(String),

    /// Degraded (VANTA-015): a two-phase write failed and its compensation
    /// also failed. Both causes are reported.
    #[error("[VANTA-015] Database degraded during {operation}: {primary}; compensation failed: {compensation}")]
    Degraded {
        /// Operation that triggered the failure.
        operation: String,
        /// The original registration failure.
        primary: String,
        /// The compensation failure.
        compensation: String,
    },
}

impl Error {
    /// Returns the stable error code (e.g., "VANTA-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "VANTA-001",
            Self::DimensionMismatch { .. } => "VANTA-002",
            Self::InvalidState(_) => "VANTA-003",
            Self::NotFound(_) => "VANTA-004",
            Self::Conflict(_) => "VANTA-005",
            Self::Index(_) => "VANTA-006",
            Self::Storage(_) => "VANTA-007",
            Self::Io(_) => "VANTA-008",
            Self::Serialization(_) => "VANTA-009",
            Self::Persistence(_) => "VANTA-010",
            Self::Quantization(_) => "VANTA-011",
            Self::Resource(_) => "VANTA-012",
            Self::Config(_) => "VANTA-013",
            Self::InconsistentState(_) => "VANTA-014",
            Self::Degraded { .. } => "VANTA-015",
        }
    }

    /// Returns the coarse category for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::DimensionMismatch { .. } => ErrorKind::InvalidInput,
            Self::InvalidState(_) | Self::Degraded { .. } => ErrorKind::InvalidState,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Index(_) => ErrorKind::Index,
            Self::Storage(_) | Self::Io(_) | Self::Serialization(_) | Self::InconsistentState(_) => {
                ErrorKind::Storage
            }
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Quantization(_) => ErrorKind::Quantization,
            Self::Resource(_) => ErrorKind::Resource,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if this error is recoverable by retrying or correcting input.
    ///
    /// Non-recoverable errors indicate corrupted or degraded state.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InconsistentState(_) | Self::Degraded { .. })
    }

    /// Attaches an operation name to the error message, preserving the variant.
    #[must_use]
    pub fn during(self, operation: &str) -> Self {
        match self {
            Self::Storage(msg) => Self::Storage(format!("{operation}: {msg}")),
            Self::Index(msg) => Self::Index(format!("{operation}: {msg}")),
            Self::Io(e) => Self::Storage(format!("{operation}: {e}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::InvalidInput("x".into()).code(), "VANTA-001");
        assert_eq!(
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
            .code(),
            "VANTA-002"
        );
        assert_eq!(Error::NotFound("a".into()).code(), "VANTA-004");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
            .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(Error::Conflict("dup".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            Error::Persistence("bad crc".into()).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_degraded_is_not_recoverable() {
        let err = Error::Degraded {
            operation: "insert".into(),
            primary: "index full".into(),
            compensation: "storage unreachable".into(),
        };
        assert!(!err.is_recoverable());
        let msg = err.to_string();
        assert!(msg.contains("index full"));
        assert!(msg.contains("storage unreachable"));
    }
}

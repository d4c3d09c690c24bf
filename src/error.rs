//! Error types for mystic

use thiserror::Error;

/// A serializable record of a failure raised by a hijacked callable.
///
/// Error records travel through call events and `HijackResult`s, so they
/// carry a kind string rather than a live error value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    /// Error kind (e.g. "ValueError", "io")
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

impl ErrorRecord {
    /// Create a new error record
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors that can occur in the function-control plane
///
/// Only `Config`, `RegistryConflict`, `NotFound`, `Blocked` and `Original`
/// are surfaced to callers; the remaining kinds are internal and are
/// swallowed on observational paths (logging, tracking, analysis).
#[derive(Error, Debug)]
pub enum MysticError {
    /// Invalid environment or paths at init
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Attempt to re-register an identity without replace=true
    #[error("Registry conflict: '{identity}' is already registered")]
    RegistryConflict { identity: String },

    /// Unknown identity on call/hijack/unhijack/inspect
    #[error("Function '{name}' not found")]
    NotFound { name: String },

    /// Intentional block raised by the Block strategy
    #[error("Call blocked: {reason}")]
    Blocked { reason: String },

    /// The wrapped callable raised; propagated unchanged
    #[error("Function raised {0}")]
    Original(ErrorRecord),

    /// Disk cache read/write failed; treated as a miss by callers
    #[error("Cache IO failure: {message}")]
    CacheIo { message: String },

    /// A payload could not be serialized; callers fall back to repr
    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MysticError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a registry conflict error
    pub fn registry_conflict(identity: impl Into<String>) -> Self {
        Self::RegistryConflict { identity: identity.into() }
    }

    /// Create a not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a blocked error
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked { reason: reason.into() }
    }

    /// Create a cache IO error
    pub fn cache_io(message: impl Into<String>) -> Self {
        Self::CacheIo { message: message.into() }
    }

    /// The record form of this error, for events and results
    pub fn to_record(&self) -> ErrorRecord {
        match self {
            Self::Original(record) => record.clone(),
            Self::Blocked { reason } => ErrorRecord::new("BlockedError", reason.clone()),
            Self::Config { message } => ErrorRecord::new("ConfigError", message.clone()),
            Self::RegistryConflict { identity } => {
                ErrorRecord::new("RegistryConflict", identity.clone())
            }
            Self::NotFound { name } => ErrorRecord::new("NotFound", name.clone()),
            Self::CacheIo { message } => ErrorRecord::new("CacheIOError", message.clone()),
            Self::Serialization(e) => ErrorRecord::new("SerializationError", e.to_string()),
        }
    }
}

/// Result type alias for mystic operations
pub type Result<T> = std::result::Result<T, MysticError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MysticError::not_found("math.fib");
        assert_eq!(err.to_string(), "Function 'math.fib' not found");
    }

    #[test]
    fn test_blocked_record_kind() {
        let err = MysticError::blocked("deprecated");
        let record = err.to_record();
        assert_eq!(record.kind, "BlockedError");
        assert_eq!(record.message, "deprecated");
    }

    #[test]
    fn test_original_record_passthrough() {
        let record = ErrorRecord::new("ValueError", "bad input");
        let err = MysticError::Original(record.clone());
        assert_eq!(err.to_record(), record);
    }
}

//! Error Types for nanotsc
//!
//! Every failure while probing a frequency source lands in one of these
//! variants. The resolver folds all of them into "source unavailable";
//! only configuration errors are reported to the caller.

use std::fmt;

/// Unified error type for nanotsc operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TscError {
    /// Source file does not exist
    SourceMissing(String),
    /// I/O operation failed (permission denied, read error, ...)
    IoError(String),
    /// Content did not fit the bounded read buffer
    Truncated(String),
    /// Content is not a well-formed decimal value
    Malformed(String),
    /// Source parsed but reported zero
    NonPositive(String),
    /// Label-keyed table has no matching entry
    LabelNotFound(String),
    /// Invalid configuration
    ConfigError(String),
}

impl TscError {
    /// Whether this error means "try the next frequency source".
    pub fn is_source_unavailable(&self) -> bool {
        !matches!(self, TscError::ConfigError(_))
    }
}

impl fmt::Display for TscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TscError::SourceMissing(path) => write!(f, "Source missing: {}", path),
            TscError::IoError(msg) => write!(f, "I/O error: {}", msg),
            TscError::Truncated(path) => write!(f, "Content truncated: {}", path),
            TscError::Malformed(msg) => write!(f, "Malformed content: {}", msg),
            TscError::NonPositive(src) => write!(f, "Non-positive frequency from {}", src),
            TscError::LabelNotFound(label) => write!(f, "Label not found: {}", label),
            TscError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TscError {}

/// Result type alias for nanotsc operations
pub type Result<T> = std::result::Result<T, TscError>;

impl From<std::io::Error> for TscError {
    fn from(err: std::io::Error) -> Self {
        TscError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for TscError {
    fn from(err: serde_json::Error) -> Self {
        TscError::ConfigError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TscError::Malformed("abc".to_string());
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_source_unavailable_family() {
        assert!(TscError::SourceMissing("/x".into()).is_source_unavailable());
        assert!(TscError::Truncated("/x".into()).is_source_unavailable());
        assert!(!TscError::ConfigError("bad".into()).is_source_unavailable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TscError = io.into();
        assert!(matches!(err, TscError::IoError(_)));
    }
}

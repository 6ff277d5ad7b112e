//! Error taxonomy shared by the trigger, sequencer and timeout components.

use std::time::Duration;

/// Failures reported by collaborators and by component configuration.
///
/// Inside the panic sequence every variant except `InvalidConfig` is
/// absorbed per step; `InvalidConfig` is returned at configuration time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SafetyError {
    /// A platform permission (location, notifications) was not granted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// A network or storage call failed.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),
    /// A platform call did not complete in bounded time.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// Invalid configuration passed by the caller.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The capability is not available on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// A collaborator panicked mid-call and the call was abandoned.
    #[error("aborted: {0}")]
    Aborted(String),
}

pub type SafetyResult<T> = Result<T, SafetyError>;

impl From<std::io::Error> for SafetyError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => SafetyError::PermissionDenied(e.to_string()),
            std::io::ErrorKind::TimedOut => SafetyError::TransientIo(format!("timed out: {}", e)),
            _ => SafetyError::TransientIo(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for SafetyError {
    fn from(e: serde_json::Error) -> Self {
        SafetyError::TransientIo(format!("serialization failed: {}", e))
    }
}

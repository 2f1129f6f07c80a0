//! Common error types.

use thiserror::Error;

/// Main error type for the sandbox.
///
/// Failures raised by user code never surface as this type; the execution
/// host turns them into `error` records. These variants cover the plumbing
/// around an execution: the isolation channel, host setup and misuse of the
/// execution state machine.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

impl SandboxError {
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn unsupported(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(language.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Channel(msg)
            | Self::UnsupportedLanguage(msg)
            | Self::InvalidState(msg)
            | Self::Timeout(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }

    /// The error name reported in synthetic error records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Channel(_) => "ChannelError",
            Self::UnsupportedLanguage(_) => "UnsupportedLanguageError",
            Self::InvalidState(_) => "InvalidStateError",
            Self::Timeout(_) => "TimeoutError",
            Self::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SandboxError::channel("worker hung up");
        assert_eq!(err.to_string(), "Channel error: worker hung up");
        assert_eq!(err.name(), "ChannelError");
        assert_eq!(err.detail(), "worker hung up");
    }

    #[test]
    fn test_timeout_name() {
        assert_eq!(SandboxError::timeout("5000ms").name(), "TimeoutError");
    }
}

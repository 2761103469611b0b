use thiserror::Error;

/// Stevedore-specific error types for better error handling
#[derive(Error, Debug)]
pub enum StevedoreError {
    #[error("Compose definition error: {0}")]
    Parse(#[from] ParseError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeCallError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Raised by the compose parser before any runtime call is made.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid compose format: {reason}")]
    InvalidFormat { reason: String },
}

impl ParseError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }
}

/// A failed call against the runtime adapter, carrying enough context
/// (operation + derived target name) for the caller to diagnose which
/// step of a reconciliation aborted.
#[derive(Error, Debug)]
#[error("runtime operation `{operation}` failed for `{target}`: {message}")]
pub struct RuntimeCallError {
    pub operation: &'static str,
    pub target: String,
    pub message: String,
}

impl RuntimeCallError {
    pub fn new(
        operation: &'static str,
        target: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self {
            operation,
            target: target.into(),
            message: cause.to_string(),
        }
    }
}

/// Convenience type alias for Stevedore results
pub type Result<T, E = StevedoreError> = std::result::Result<T, E>;

//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Three variants are workflow states
//! rather than failures (see [`Error::is_workflow_state`]); callers use them to
//! steer the user toward configuration or a prerequisite tool.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the FSFVI workflow orchestrator.
#[derive(Error, Debug)]
pub enum Error {
    /// Requested tool id is not in the registry.
    #[error("Unknown analysis tool: {0}")]
    UnknownTool(String),

    /// Tool requires a confirmed configuration before it may run.
    #[error("configuration required for tool: {0}")]
    ConfigurationRequired(String),

    /// A prerequisite tool has not completed.
    #[error("tool {tool} requires {missing} to complete first")]
    DependencyNotSatisfied { tool: String, missing: String },

    /// Tool already has an invocation in flight.
    #[error("tool already running: {0}")]
    AlreadyRunning(String),

    /// No bearer token available.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Transport-level failure talking to the analysis backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Backend answered with a non-2xx status.
    #[error("backend returned {status}: {detail}")]
    BackendStatus { status: u16, detail: String },

    /// Backend answered 2xx with a body that is not a JSON object.
    #[error("malformed backend payload: {0}")]
    MalformedPayload(String),

    /// Configuration or parameter validation failed.
    #[error("invalid configuration for {tool}: {}", .issues.join("; "))]
    Validation { tool: String, issues: Vec<String> },

    /// Settings could not be loaded.
    #[error("settings error: {0}")]
    Config(String),

    /// Invalid run-state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnknownTool(_) => "UNKNOWN_TOOL",
            Error::ConfigurationRequired(_) => "CONFIGURATION_REQUIRED",
            Error::DependencyNotSatisfied { .. } => "DEPENDENCY_NOT_SATISFIED",
            Error::AlreadyRunning(_) => "ALREADY_RUNNING",
            Error::Unauthenticated(_) => "UNAUTHENTICATED",
            Error::Backend(_) | Error::BackendStatus { .. } | Error::MalformedPayload(_) => {
                "BACKEND_ERROR"
            }
            Error::Validation { .. } => "INVALID_ARGUMENT",
            Error::Config(_) => "CONFIG_ERROR",
            Error::StateTransition(_) => "FAILED_PRECONDITION",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// Expected workflow outcomes that should drive the UI toward a corrective
    /// action instead of an error dialog.
    pub fn is_workflow_state(&self) -> bool {
        matches!(
            self,
            Error::ConfigurationRequired(_)
                | Error::DependencyNotSatisfied { .. }
                | Error::AlreadyRunning(_)
        )
    }

    /// Failures that a manual re-run may fix.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Backend(_) | Error::BackendStatus { .. } | Error::MalformedPayload(_)
        )
    }
}

// Convenience constructors
impl Error {
    pub fn unknown_tool(id: impl Into<String>) -> Self {
        Self::UnknownTool(id.into())
    }

    pub fn configuration_required(id: impl Into<String>) -> Self {
        Self::ConfigurationRequired(id.into())
    }

    pub fn dependency(tool: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::DependencyNotSatisfied {
            tool: tool.into(),
            missing: missing.into(),
        }
    }

    pub fn already_running(id: impl Into<String>) -> Self {
        Self::AlreadyRunning(id.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    pub fn validation(tool: impl Into<String>, issues: Vec<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            issues,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Backend(format!("request timed out: {}", err))
        } else if err.is_decode() {
            Error::MalformedPayload(err.to_string())
        } else {
            Error::Backend(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_states_are_not_failures() {
        assert!(Error::configuration_required("budget-sensitivity").is_workflow_state());
        assert!(Error::dependency("multi-year", "optimization").is_workflow_state());
        assert!(Error::already_running("optimization").is_workflow_state());
        assert!(!Error::unauthenticated("no token").is_workflow_state());
        assert!(!Error::backend("connection refused").is_workflow_state());
    }

    #[test]
    fn test_backend_family() {
        assert!(Error::backend("x").is_backend());
        assert!(Error::malformed("x").is_backend());
        assert!(Error::BackendStatus {
            status: 500,
            detail: "boom".to_string()
        }
        .is_backend());
        assert!(!Error::unknown_tool("x").is_backend());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::unknown_tool("foo").to_string(),
            "Unknown analysis tool: foo"
        );
        assert_eq!(
            Error::dependency("multi-year", "optimization").to_string(),
            "tool multi-year requires optimization to complete first"
        );
        let err = Error::validation(
            "budget-sensitivity",
            vec!["a".to_string(), "b".to_string()],
        );
        assert_eq!(err.to_string(), "invalid configuration for budget-sensitivity: a; b");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}

//! Core types for the FSFVI workflow orchestrator.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (RunId, SessionId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Settings for the backend, credentials, and observability

mod config;
mod errors;
mod ids;

pub use config::{
    AuthConfig, BackendConfig, Config, ObservabilityConfig, ENV_API_URL, ENV_LOG_FORMAT,
    ENV_TIMEOUT, ENV_TOKEN_FILE,
};
pub use errors::{Error, Result};
pub use ids::{RunId, SessionId};

//! Analysis backend transport.
//!
//! The coordinator talks to the analysis service only through
//! [`AnalysisBackend`], so tests can substitute an in-process fake and the
//! HTTP client stays a thin adapter.

pub mod auth;
pub mod http;
pub mod request;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Result;

pub use auth::{FileTokenStore, StaticTokenStore, TokenStore};
pub use http::HttpBackend;
pub use request::{build_request, ToolRequest};

/// One endpoint call per tool invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Invoke the tool's endpoint and return the decoded JSON body.
    ///
    /// Non-2xx statuses and undecodable bodies are errors; shape checking of
    /// a decoded body is left to the reconciler.
    async fn invoke(&self, request: &ToolRequest) -> Result<Value>;
}

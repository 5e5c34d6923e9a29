//! HTTP transport for the analysis service (reqwest).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Instant;

use super::{AnalysisBackend, ToolRequest};
use crate::types::{BackendConfig, Error, Result};

/// reqwest-backed [`AnalysisBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Service health check (`GET /`).
    pub async fn health(&self) -> Result<Value> {
        let response = self.client.get(self.url("")).send().await?;
        decode(response).await
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn invoke(&self, request: &ToolRequest) -> Result<Value> {
        let url = self.url(&request.endpoint);
        let started = Instant::now();

        tracing::debug!(
            tool_id = %request.tool_id,
            run_id = %request.run_id,
            url = %url,
            "posting analysis request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&request.bearer_token)
            .form(&request.form)
            .send()
            .await?;

        let status = response.status();
        let result = decode(response).await;

        tracing::debug!(
            tool_id = %request.tool_id,
            run_id = %request.run_id,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis response received"
        );

        result
    }
}

async fn decode(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::BackendStatus {
            status: status.as_u16(),
            detail: error_detail(status, &body),
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::malformed(format!("invalid JSON: {}", e)))
}

/// Pull a readable message out of an error body.
///
/// The service answers errors as `{"detail": "..."}`, or with a list of
/// field errors (`{"detail": [{"msg": "..."}]}`) for rejected form input.
fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("detail").or_else(|| v.get("error")));

    match detail {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.get("msg")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| item.to_string())
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

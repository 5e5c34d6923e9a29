//! Request building: session context plus tool configuration as form fields.
//!
//! The analysis service takes form-encoded fields. Scalars are sent as text,
//! lists as JSON, and the allocation constraint bounds are packed into a
//! single `constraints` JSON object.

use serde_json::{Map, Value};

use crate::session::SessionContext;
use crate::tools::builtin::CONSTRAINT_PARAMS;
use crate::types::RunId;

/// A fully-resolved backend call.
#[derive(Clone, PartialEq)]
pub struct ToolRequest {
    pub tool_id: String,
    pub run_id: RunId,
    /// Endpoint path relative to the service base URL.
    pub endpoint: String,
    pub bearer_token: String,
    pub form: Vec<(String, String)>,
}

impl ToolRequest {
    /// Value of a form field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for ToolRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRequest")
            .field("tool_id", &self.tool_id)
            .field("run_id", &self.run_id)
            .field("endpoint", &self.endpoint)
            .field("form", &self.form)
            .finish_non_exhaustive()
    }
}

/// Build the request for one invocation.
pub fn build_request(
    tool_id: &str,
    endpoint: &str,
    ctx: &SessionContext,
    params: &Map<String, Value>,
    bearer_token: String,
    run_id: RunId,
) -> ToolRequest {
    let mut form = ctx.form_fields();
    let mut constraints = Map::new();

    for (name, value) in params {
        if value.is_null() {
            continue;
        }
        if CONSTRAINT_PARAMS.contains(&name.as_str()) {
            constraints.insert(name.clone(), value.clone());
            continue;
        }
        form.push((name.clone(), encode_value(value)));
    }

    if !constraints.is_empty() {
        form.push((
            "constraints".to_string(),
            Value::Object(constraints).to_string(),
        ));
    }

    ToolRequest {
        tool_id: tool_id.to_string(),
        run_id,
        endpoint: endpoint.trim_start_matches('/').to_string(),
        bearer_token,
        form,
    }
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

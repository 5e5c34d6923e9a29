//! Per-tool configuration.
//!
//! Every registered tool starts with an unconfigured entry holding its
//! parameter defaults. `update_config` edits freely; `confirm_config` is the
//! only way to reach `configured = true` and it validates the merged result
//! first. A failed confirm leaves the entry exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::tools::builtin::unknown_scenarios;
use crate::tools::{ToolDescriptor, ToolRegistry};
use crate::types::{Error, Result};

/// Configuration of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub configured: bool,
    pub params: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl ToolConfig {
    fn unconfigured(params: Map<String, Value>) -> Self {
        Self {
            configured: false,
            params,
            updated_at: Utc::now(),
        }
    }
}

fn defaults(tool: &ToolDescriptor) -> Map<String, Value> {
    tool.parameters
        .iter()
        .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
        .collect()
}

/// Configuration entries keyed by tool id.
#[derive(Debug)]
pub struct ConfigStore {
    registry: Arc<ToolRegistry>,
    configs: HashMap<String, ToolConfig>,
}

impl ConfigStore {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        let configs = registry
            .list_tools()
            .iter()
            .map(|tool| (tool.id.clone(), ToolConfig::unconfigured(defaults(tool))))
            .collect();
        Self { registry, configs }
    }

    pub fn get_config(&self, tool_id: &str) -> Result<ToolConfig> {
        self.entry(tool_id).cloned()
    }

    /// Merge fields into the stored params. Does not validate and never
    /// changes `configured`.
    pub fn update_config(&mut self, tool_id: &str, partial: Map<String, Value>) -> Result<ToolConfig> {
        let config = self.entry_mut(tool_id)?;
        config.params.extend(partial);
        config.updated_at = Utc::now();
        Ok(config.clone())
    }

    /// Merge, validate, and mark configured in one step.
    pub fn confirm_config(
        &mut self,
        tool_id: &str,
        partial: Map<String, Value>,
    ) -> Result<ToolConfig> {
        let mut params = self.entry(tool_id)?.params.clone();
        params.extend(partial);

        let issues = self.issues(tool_id, &params)?;
        if !issues.is_empty() {
            return Err(Error::validation(tool_id, issues));
        }

        let config = self.entry_mut(tool_id)?;
        config.params = params;
        config.configured = true;
        config.updated_at = Utc::now();
        Ok(config.clone())
    }

    /// Tools that need no configuration always count as configured.
    pub fn is_configured(&self, tool_id: &str) -> Result<bool> {
        let tool = self.registry.get_tool(tool_id)?;
        if !tool.requires_configuration {
            return Ok(true);
        }
        Ok(self.entry(tool_id)?.configured)
    }

    /// Back to defaults, unconfigured.
    pub fn reset_config(&mut self, tool_id: &str) -> Result<ToolConfig> {
        let params = defaults(self.registry.get_tool(tool_id)?);
        let config = self.entry_mut(tool_id)?;
        *config = ToolConfig::unconfigured(params);
        Ok(config.clone())
    }

    /// Params for an invocation, re-checked against the registry.
    pub fn validated_params(&self, tool_id: &str) -> Result<Map<String, Value>> {
        let params = self.entry(tool_id)?.params.clone();
        let issues = self.issues(tool_id, &params)?;
        if !issues.is_empty() {
            return Err(Error::validation(tool_id, issues));
        }
        Ok(params)
    }

    fn issues(&self, tool_id: &str, params: &Map<String, Value>) -> Result<Vec<String>> {
        let mut issues = self.registry.validate_params(tool_id, params)?;

        let bound = |name: &str| params.get(name).and_then(Value::as_f64);
        if let (Some(min), Some(max)) = (bound("min_allocation"), bound("max_allocation")) {
            if min > max {
                issues.push(format!(
                    "min_allocation ({}) exceeds max_allocation ({})",
                    min, max
                ));
            }
        }

        if let Some(Value::Array(items)) = params.get("scenarios") {
            for name in unknown_scenarios(items) {
                issues.push(format!("Unknown scenario: {}", name));
            }
        }

        Ok(issues)
    }

    fn entry(&self, tool_id: &str) -> Result<&ToolConfig> {
        self.configs
            .get(tool_id)
            .ok_or_else(|| Error::unknown_tool(tool_id))
    }

    fn entry_mut(&mut self, tool_id: &str) -> Result<&mut ToolConfig> {
        self.configs
            .get_mut(tool_id)
            .ok_or_else(|| Error::unknown_tool(tool_id))
    }
}

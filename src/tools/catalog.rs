//! Tool registry with parameter definitions and validation.
//!
//! Owns tool *metadata* only. Implementations live behind the analysis
//! backend; this side knows which endpoint to call, which tools must complete
//! first, and what a valid configuration looks like.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// =============================================================================
// Parameter types
// =============================================================================

/// Parameter type for tool configuration fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
    StringList,
    FloatList,
    Enum(Vec<String>),
    Optional(Box<ParamType>),
}

impl ParamType {
    /// Validate a JSON value against this parameter type.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            ParamType::String => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(format!("expected string, got {}", value_type_name(value)))
                }
            }
            ParamType::Int => {
                if value.is_i64() || value.is_u64() {
                    Ok(())
                } else {
                    Err(format!("expected integer, got {}", value_type_name(value)))
                }
            }
            ParamType::Float => {
                if value.is_number() {
                    Ok(())
                } else {
                    Err(format!("expected number, got {}", value_type_name(value)))
                }
            }
            ParamType::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("expected boolean, got {}", value_type_name(value)))
                }
            }
            ParamType::StringList => validate_list(value, "string", Value::is_string),
            ParamType::FloatList => validate_list(value, "number", Value::is_number),
            ParamType::Enum(variants) => {
                if let Some(s) = value.as_str() {
                    if variants.iter().any(|v| v == s) {
                        Ok(())
                    } else {
                        Err(format!(
                            "invalid value '{}', expected one of: {}",
                            s,
                            variants.join(", ")
                        ))
                    }
                } else {
                    Err(format!("expected string for enum, got {}", value_type_name(value)))
                }
            }
            ParamType::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.validate(value)
                }
            }
        }
    }

    /// Human-readable type name for configuration prompts.
    pub fn display_name(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Int => "integer".to_string(),
            ParamType::Float => "number".to_string(),
            ParamType::Bool => "boolean".to_string(),
            ParamType::StringList => "string[]".to_string(),
            ParamType::FloatList => "number[]".to_string(),
            ParamType::Enum(variants) => format!("enum({})", variants.join("|")),
            ParamType::Optional(inner) => format!("{}?", inner.display_name()),
        }
    }
}

fn validate_list(
    value: &Value,
    item_name: &str,
    accept: fn(&Value) -> bool,
) -> std::result::Result<(), String> {
    let arr = value
        .as_array()
        .ok_or_else(|| format!("expected array, got {}", value_type_name(value)))?;
    for (i, item) in arr.iter().enumerate() {
        if !accept(item) {
            return Err(format!(
                "expected {} at index {}, got {}",
                item_name,
                i,
                value_type_name(item)
            ));
        }
    }
    Ok(())
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Parameter definition
// =============================================================================

/// A single configuration field for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Minimum number of items for list types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    /// Inclusive bounds for numbers and for every item of a number list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
}

impl ParamDef {
    pub fn new(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            default: None,
            min_items: None,
            range: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_min_items(mut self, min_items: usize) -> Self {
        self.min_items = Some(min_items);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && !matches!(self.param_type, ParamType::Optional(_))
    }

    /// Check a present value: type first, then item count and bounds.
    fn check(&self, value: &Value) -> std::result::Result<(), String> {
        self.param_type.validate(value)?;

        if let (Some(min), Some(items)) = (self.min_items, value.as_array()) {
            if items.len() < min {
                return Err(format!(
                    "requires at least {} item(s), got {}",
                    min,
                    items.len()
                ));
            }
        }

        if let Some((lo, hi)) = self.range {
            let numbers: Vec<f64> = match value {
                Value::Array(items) => items.iter().filter_map(Value::as_f64).collect(),
                other => other.as_f64().into_iter().collect(),
            };
            if let Some(bad) = numbers.iter().find(|n| **n < lo || **n > hi) {
                return Err(format!("value {} outside [{}, {}]", bad, lo, hi));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tool descriptor
// =============================================================================

/// Static definition of one analysis capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub label: String,
    pub description: String,
    /// Backend endpoint path (relative to the service base URL).
    pub endpoint: String,
    /// Key under which the backend may nest this tool's results.
    pub wrapper_key: String,
    /// Tools that must be `completed` before this one may run.
    pub dependencies: Vec<String>,
    pub requires_configuration: bool,
    pub parameters: Vec<ParamDef>,
}

impl ToolDescriptor {
    /// One-line summary for tool pickers.
    ///
    /// Format: `- tool_id(param1: type, param2?: type) after dep1, dep2: description`
    pub fn to_summary_line(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let optional = if p.is_required() { "" } else { "?" };
                format!("{}{}: {}", p.name, optional, p.param_type.display_name())
            })
            .collect();

        let after = if self.dependencies.is_empty() {
            String::new()
        } else {
            format!(" after {}", self.dependencies.join(", "))
        };

        format!(
            "- {}({}){}: {}",
            self.id,
            params.join(", "),
            after,
            self.description
        )
    }

    pub fn param(&self, name: &str) -> Option<&ParamDef> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

// =============================================================================
// Tool registry
// =============================================================================

/// In-memory tool registry. Keeps registration order for listing.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool.
    ///
    /// Dependencies must already be registered, so the graph stays acyclic
    /// and registration order is a valid execution order.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if descriptor.id.trim().is_empty() {
            return Err(Error::validation("registry", vec!["Tool id cannot be empty".to_string()]));
        }
        if self.index.contains_key(&descriptor.id) {
            return Err(Error::validation(
                "registry",
                vec![format!("Tool already registered: {}", descriptor.id)],
            ));
        }
        let unknown: Vec<String> = descriptor
            .dependencies
            .iter()
            .filter(|dep| !self.index.contains_key(dep.as_str()))
            .map(|dep| format!("Unknown dependency: {}", dep))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::validation(descriptor.id.clone(), unknown));
        }

        self.index.insert(descriptor.id.clone(), self.entries.len());
        self.entries.push(descriptor);
        Ok(())
    }

    /// Get a tool by id.
    pub fn get_tool(&self, tool_id: &str) -> Result<&ToolDescriptor> {
        self.index
            .get(tool_id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| Error::unknown_tool(tool_id))
    }

    pub fn has_tool(&self, tool_id: &str) -> bool {
        self.index.contains_key(tool_id)
    }

    /// All tools in registration order.
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.entries
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn dependencies_of(&self, tool_id: &str) -> Result<&[String]> {
        Ok(&self.get_tool(tool_id)?.dependencies)
    }

    /// Tools that list `tool_id` as a direct dependency.
    pub fn dependents_of(&self, tool_id: &str) -> Result<Vec<String>> {
        self.get_tool(tool_id)?;
        Ok(self
            .entries
            .iter()
            .filter(|e| e.dependencies.iter().any(|d| d == tool_id))
            .map(|e| e.id.clone())
            .collect())
    }

    /// Validate configuration fields against a tool's parameter definitions.
    ///
    /// Returns a list of validation issues (empty = valid).
    pub fn validate_params(&self, tool_id: &str, params: &Map<String, Value>) -> Result<Vec<String>> {
        let entry = self.get_tool(tool_id)?;
        let mut issues = Vec::new();

        for param_def in &entry.parameters {
            if param_def.is_required() && !params.contains_key(&param_def.name) {
                issues.push(format!("Missing required parameter: {}", param_def.name));
            }
        }

        for (key, value) in params {
            match entry.param(key) {
                Some(param_def) => {
                    if let Err(e) = param_def.check(value) {
                        issues.push(format!("Parameter '{}': {}", key, e));
                    }
                }
                None => issues.push(format!("Unknown parameter: {}", key)),
            }
        }

        Ok(issues)
    }

    /// Fill in default values for missing parameters.
    pub fn fill_defaults(&self, tool_id: &str, params: &mut Map<String, Value>) -> Result<()> {
        let entry = self.get_tool(tool_id)?;
        for param_def in &entry.parameters {
            if !params.contains_key(&param_def.name) {
                if let Some(default) = &param_def.default {
                    params.insert(param_def.name.clone(), default.clone());
                }
            }
        }
        Ok(())
    }

    /// Formatted listing of all tools.
    pub fn describe(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut lines = Vec::with_capacity(self.entries.len() + 1);
        lines.push("Available analysis tools:".to_string());
        for entry in &self.entries {
            lines.push(entry.to_summary_line());
        }
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

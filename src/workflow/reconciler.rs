//! Result reconciliation: one record shape regardless of payload shape.
//!
//! The analysis service sometimes nests a tool's results under a wrapper key
//! (`{"optimization_results": {...}}`) and sometimes returns them at the top
//! level, and field names drift between endpoints. Every field is looked up
//! in this order:
//!
//! 1. under the tool's wrapper key, trying each accepted alias;
//! 2. at the top level, trying each accepted alias;
//! 3. a default: `0` for numbers, `"Unknown"` for labels, empty for lists.
//!
//! Reconciliation is pure and total for any JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::tools::builtin::{
    wrapper_key_for, BUDGET_SENSITIVITY, COMPONENT_VULNERABILITIES, CRISIS_RESILIENCE,
    DISTRIBUTION, MULTI_YEAR, OPTIMIZATION, PERFORMANCE_GAPS, REPORTS, SCENARIO_COMPARISON,
    SYSTEM_ANALYSIS, SYSTEM_VULNERABILITY, TARGET_BASED,
};
use crate::types::{Error, Result};

/// Placeholder for labels the payload did not carry.
pub const UNKNOWN: &str = "Unknown";

// =============================================================================
// Record types
// =============================================================================

/// Change to one component's allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDelta {
    pub component: String,
    pub current: f64,
    pub optimized: f64,
    pub change: f64,
    pub change_percent: f64,
}

/// Normalized output of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub tool_id: String,
    pub success: bool,
    pub baseline_score: f64,
    pub optimized_score: f64,
    pub relative_improvement_percent: f64,
    pub reallocation_amount: f64,
    pub reallocation_intensity_percent: f64,
    pub budget_utilization_percent: f64,
    pub allocation_deltas: Vec<AllocationDelta>,
    pub method: String,
    pub scenario: String,
    /// Tool-specific numbers; every declared metric is present.
    pub metrics: BTreeMap<String, f64>,
    /// Tool-specific labels; every declared label is present.
    pub labels: BTreeMap<String, String>,
    /// Tool-specific lists, passed through as received.
    pub entries: BTreeMap<String, Vec<Value>>,
}

impl ResultRecord {
    /// Record with every field defaulted, as produced for `{}`.
    pub fn empty(tool_id: &str) -> Self {
        reconcile(tool_id, Lookup::new(None, &Map::new()))
    }

    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    pub fn label(&self, name: &str) -> &str {
        self.labels.get(name).map(String::as_str).unwrap_or(UNKNOWN)
    }

    pub fn entries(&self, name: &str) -> &[Value] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

// =============================================================================
// Field tables
// =============================================================================

/// A record field and the payload keys it may arrive under.
#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    aliases: &'static [&'static str],
}

const BASELINE: &[&str] = &["original_fsfvi", "baseline_fsfvi", "current_fsfvi", "fsfvi_value"];
const OPTIMIZED: &[&str] = &["optimal_fsfvi", "optimized_fsfvi", "final_fsfvi"];
const IMPROVEMENT: &[&str] = &[
    "relative_improvement_percent",
    "improvement_percent",
    "improvement_potential",
];
const REALLOCATION: &[&str] = &["total_reallocation_amount", "reallocation_amount"];
const INTENSITY: &[&str] = &["reallocation_intensity_percent", "reallocation_intensity"];
const UTILIZATION: &[&str] = &["budget_utilization_percent", "budget_utilization"];
const SUCCESS: &[&str] = &["success"];
const ERROR_KEYS: &[&str] = &["error"];
const METHOD: &[&str] = &["method", "weighting_method"];
const SCENARIO: &[&str] = &["scenario"];

const CHANGE_LISTS: &[&str] = &["allocation_changes", "component_changes", "allocation_deltas"];
const ORIGINAL_ALLOCATIONS: &[&str] = &["original_allocations", "current_allocations"];
const OPTIMAL_ALLOCATIONS: &[&str] = &["optimal_allocations", "optimized_allocations"];
const COMPONENT_NAMES: &[&str] = &["component_names", "components"];

const COMPONENT: &[&str] = &["component_name", "component_type", "component", "name"];
const CURRENT: &[&str] = &["current_allocation", "original_allocation", "current"];
const NEW: &[&str] = &[
    "optimized_allocation",
    "optimal_allocation",
    "new_allocation",
    "optimized",
];
const CHANGE: &[&str] = &["change", "absolute_change"];
const CHANGE_PERCENT: &[&str] = &["change_percent", "percent_change", "percentage_change"];

/// Tool-specific fields beyond the shared score summary.
#[derive(Debug, Clone, Copy)]
struct ToolShape {
    metrics: &'static [Field],
    labels: &'static [Field],
    entries: &'static [Field],
}

const NO_FIELDS: ToolShape = ToolShape {
    metrics: &[],
    labels: &[],
    entries: &[],
};

const OPTIMIZATION_SHAPE: ToolShape = ToolShape {
    metrics: &[
        Field { name: "efficiency_gap", aliases: &["efficiency_gap", "absolute_gap"] },
        Field { name: "iterations", aliases: &["iterations"] },
        Field { name: "total_budget", aliases: &["total_budget", "budget"] },
    ],
    labels: &[Field { name: "solver", aliases: &["solver"] }],
    entries: &[Field { name: "convergence_history", aliases: &["convergence_history"] }],
};

const MULTI_YEAR_SHAPE: ToolShape = ToolShape {
    metrics: &[
        Field { name: "improvement", aliases: &["improvement", "total_improvement"] },
        Field { name: "planning_horizon", aliases: &["planning_horizon", "years"] },
        Field { name: "target_fsfvi", aliases: &["target_fsfvi"] },
        Field { name: "years_to_target", aliases: &["years_to_target"] },
    ],
    labels: &[Field { name: "target_achieved", aliases: &["target_achieved", "target_met"] }],
    entries: &[Field {
        name: "yearly_plans",
        aliases: &["yearly_plans", "yearly_results", "annual_plans"],
    }],
};

const BUDGET_SENSITIVITY_SHAPE: ToolShape = ToolShape {
    metrics: &[
        Field { name: "elasticity", aliases: &["elasticity", "budget_elasticity"] },
        Field {
            name: "optimal_budget_change",
            aliases: &["optimal_budget_change", "recommended_budget_change"],
        },
    ],
    labels: &[Field { name: "recommendation", aliases: &["recommendation"] }],
    entries: &[Field {
        name: "sensitivity_results",
        aliases: &["sensitivity_results", "variations", "results"],
    }],
};

const SCENARIO_COMPARISON_SHAPE: ToolShape = ToolShape {
    metrics: &[Field { name: "score_range", aliases: &["score_range", "fsfvi_range"] }],
    labels: &[
        Field {
            name: "best_scenario",
            aliases: &["best_scenario", "most_resilient_scenario"],
        },
        Field {
            name: "worst_scenario",
            aliases: &["worst_scenario", "most_vulnerable_scenario"],
        },
    ],
    entries: &[Field {
        name: "scenario_results",
        aliases: &["scenario_results", "scenarios", "comparisons"],
    }],
};

const TARGET_BASED_SHAPE: ToolShape = ToolShape {
    metrics: &[
        Field { name: "target_fsfvi", aliases: &["target_fsfvi"] },
        Field { name: "achieved_fsfvi", aliases: &["achieved_fsfvi"] },
        Field { name: "required_budget", aliases: &["required_budget", "budget_needed"] },
        Field {
            name: "additional_budget_needed",
            aliases: &["additional_budget_needed", "budget_gap"],
        },
    ],
    labels: &[Field {
        name: "target_achievable",
        aliases: &["target_achievable", "achievable"],
    }],
    entries: &[Field { name: "pathway", aliases: &["pathway", "allocation_pathway"] }],
};

const CRISIS_RESILIENCE_SHAPE: ToolShape = ToolShape {
    metrics: &[Field {
        name: "resilience_score",
        aliases: &["resilience_score", "overall_resilience_score"],
    }],
    labels: &[Field {
        name: "resilience_level",
        aliases: &["resilience_level", "overall_resilience"],
    }],
    entries: &[Field {
        name: "scenario_results",
        aliases: &["scenario_results", "shock_results", "crisis_scenarios"],
    }],
};

const DISTRIBUTION_SHAPE: ToolShape = ToolShape {
    metrics: &[
        Field {
            name: "total_budget",
            aliases: &["total_budget_usd_millions", "total_budget"],
        },
        Field {
            name: "total_allocated",
            aliases: &["total_allocated_usd_millions", "total_allocated"],
        },
    ],
    labels: &[
        Field { name: "largest_allocation", aliases: &["largest_allocation"] },
        Field { name: "smallest_allocation", aliases: &["smallest_allocation"] },
    ],
    entries: &[Field { name: "key_insights", aliases: &["key_insights"] }],
};

const PERFORMANCE_GAPS_SHAPE: ToolShape = ToolShape {
    metrics: &[
        Field {
            name: "average_gap_percent",
            aliases: &["average_gap_percent", "avg_gap_percent"],
        },
        Field {
            name: "critical_gaps",
            aliases: &["critical_gaps_count", "critical_gaps"],
        },
    ],
    labels: &[Field {
        name: "largest_gap_component",
        aliases: &["largest_gap_component", "worst_performer"],
    }],
    entries: &[Field {
        name: "priority_actions",
        aliases: &["priority_actions", "recommendations"],
    }],
};

const COMPONENT_VULNERABILITIES_SHAPE: ToolShape = ToolShape {
    metrics: &[],
    labels: &[],
    entries: &[
        Field { name: "critical_components", aliases: &["critical_components"] },
        Field { name: "high_risk_components", aliases: &["high_risk_components"] },
        Field { name: "recommendations", aliases: &["recommendations"] },
    ],
};

const SYSTEM_VULNERABILITY_SHAPE: ToolShape = ToolShape {
    metrics: &[Field {
        name: "total_allocation",
        aliases: &["total_allocation_millions", "total_allocation"],
    }],
    labels: &[Field { name: "risk_level", aliases: &["risk_level"] }],
    entries: &[Field { name: "critical_components", aliases: &["critical_components"] }],
};

const REPORTS_SHAPE: ToolShape = ToolShape {
    metrics: &[],
    labels: &[
        Field { name: "report_type", aliases: &["report_type"] },
        Field { name: "overall_assessment", aliases: &["overall_assessment"] },
    ],
    entries: &[Field { name: "recommendations", aliases: &["recommendations"] }],
};

fn shape(tool_id: &str) -> ToolShape {
    match tool_id {
        OPTIMIZATION => OPTIMIZATION_SHAPE,
        MULTI_YEAR => MULTI_YEAR_SHAPE,
        BUDGET_SENSITIVITY => BUDGET_SENSITIVITY_SHAPE,
        SCENARIO_COMPARISON => SCENARIO_COMPARISON_SHAPE,
        TARGET_BASED => TARGET_BASED_SHAPE,
        CRISIS_RESILIENCE => CRISIS_RESILIENCE_SHAPE,
        DISTRIBUTION => DISTRIBUTION_SHAPE,
        PERFORMANCE_GAPS => PERFORMANCE_GAPS_SHAPE,
        COMPONENT_VULNERABILITIES => COMPONENT_VULNERABILITIES_SHAPE,
        SYSTEM_VULNERABILITY | SYSTEM_ANALYSIS => SYSTEM_VULNERABILITY_SHAPE,
        REPORTS => REPORTS_SHAPE,
        _ => NO_FIELDS,
    }
}

// =============================================================================
// Lookup
// =============================================================================

/// Two-level view over a payload: wrapper object first, then top level.
#[derive(Debug, Clone, Copy)]
struct Lookup<'a> {
    nested: Option<&'a Map<String, Value>>,
    flat: &'a Map<String, Value>,
}

impl<'a> Lookup<'a> {
    fn new(nested: Option<&'a Map<String, Value>>, flat: &'a Map<String, Value>) -> Self {
        Self { nested, flat }
    }

    fn item(object: &'a Map<String, Value>) -> Self {
        Self::new(None, object)
    }

    /// First alias that converts, nested level before top level.
    fn find<T>(&self, aliases: &[&str], convert: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
        self.nested
            .into_iter()
            .chain(std::iter::once(self.flat))
            .flat_map(|level| aliases.iter().filter_map(move |alias| level.get(*alias)))
            .find_map(convert)
    }

    fn number(&self, aliases: &[&str]) -> Option<f64> {
        self.find(aliases, as_number)
    }

    fn number_or_zero(&self, aliases: &[&str]) -> f64 {
        self.number(aliases).unwrap_or(0.0)
    }

    fn label(&self, aliases: &[&str]) -> String {
        self.find(aliases, as_label)
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn list(&self, aliases: &[&str]) -> Option<&'a Vec<Value>> {
        self.find(aliases, Value::as_array)
    }

    fn flag(&self, aliases: &[&str]) -> Option<bool> {
        self.find(aliases, Value::as_bool)
    }

    fn has_value(&self, aliases: &[&str]) -> bool {
        self.find(aliases, |v| (!v.is_null()).then_some(())).is_some()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn as_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize a payload for a built-in tool.
pub fn normalize(tool_id: &str, payload: &Value) -> Result<ResultRecord> {
    normalize_with(tool_id, wrapper_key_for(tool_id), payload)
}

/// Normalize with an explicit wrapper key (registry-provided).
pub fn normalize_with(
    tool_id: &str,
    wrapper_key: Option<&str>,
    payload: &Value,
) -> Result<ResultRecord> {
    let flat = payload.as_object().ok_or_else(|| {
        Error::malformed(format!(
            "{} payload must be a JSON object, got {}",
            tool_id,
            kind_of(payload)
        ))
    })?;
    let nested = wrapper_key
        .and_then(|key| flat.get(key))
        .and_then(Value::as_object);

    Ok(reconcile(tool_id, Lookup::new(nested, flat)))
}

fn reconcile(tool_id: &str, lookup: Lookup<'_>) -> ResultRecord {
    let shape = shape(tool_id);

    let success = lookup
        .flag(SUCCESS)
        .unwrap_or_else(|| !lookup.has_value(ERROR_KEYS));

    ResultRecord {
        tool_id: tool_id.to_string(),
        success,
        baseline_score: lookup.number_or_zero(BASELINE),
        optimized_score: lookup.number_or_zero(OPTIMIZED),
        relative_improvement_percent: lookup.number_or_zero(IMPROVEMENT),
        reallocation_amount: lookup.number_or_zero(REALLOCATION),
        reallocation_intensity_percent: lookup.number_or_zero(INTENSITY),
        budget_utilization_percent: lookup.number_or_zero(UTILIZATION),
        allocation_deltas: allocation_deltas(&lookup),
        method: lookup.label(METHOD),
        scenario: lookup.label(SCENARIO),
        metrics: shape
            .metrics
            .iter()
            .map(|f| (f.name.to_string(), lookup.number_or_zero(f.aliases)))
            .collect(),
        labels: shape
            .labels
            .iter()
            .map(|f| (f.name.to_string(), lookup.label(f.aliases)))
            .collect(),
        entries: shape
            .entries
            .iter()
            .map(|f| {
                let items = lookup.list(f.aliases).cloned().unwrap_or_default();
                (f.name.to_string(), items)
            })
            .collect(),
    }
}

/// Per-component changes: an explicit change list wins; otherwise pair the
/// original and optimal allocation arrays by index.
fn allocation_deltas(lookup: &Lookup<'_>) -> Vec<AllocationDelta> {
    if let Some(items) = lookup.list(CHANGE_LISTS) {
        return items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_object().map(|obj| change_entry(i, obj)))
            .collect();
    }

    let (Some(original), Some(optimal)) = (
        lookup.list(ORIGINAL_ALLOCATIONS),
        lookup.list(OPTIMAL_ALLOCATIONS),
    ) else {
        return Vec::new();
    };
    let names = lookup.list(COMPONENT_NAMES);

    original
        .iter()
        .zip(optimal.iter())
        .enumerate()
        .map(|(i, (current, optimized))| {
            let component = names
                .and_then(|n| n.get(i))
                .and_then(component_name)
                .unwrap_or_else(|| default_component(i));
            delta(
                component,
                as_number(current).unwrap_or(0.0),
                as_number(optimized).unwrap_or(0.0),
                None,
                None,
            )
        })
        .collect()
}

fn change_entry(index: usize, item: &Map<String, Value>) -> AllocationDelta {
    let lookup = Lookup::item(item);
    let component = lookup
        .find(COMPONENT, |v| v.as_str().filter(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| default_component(index));
    delta(
        component,
        lookup.number_or_zero(CURRENT),
        lookup.number_or_zero(NEW),
        lookup.number(CHANGE),
        lookup.number(CHANGE_PERCENT),
    )
}

fn delta(
    component: String,
    current: f64,
    optimized: f64,
    change: Option<f64>,
    change_percent: Option<f64>,
) -> AllocationDelta {
    let change = change.unwrap_or(optimized - current);
    let change_percent = change_percent.unwrap_or(if current != 0.0 {
        change / current * 100.0
    } else {
        0.0
    });
    AllocationDelta {
        component,
        current,
        optimized,
        change,
        change_percent,
    }
}

fn component_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => Lookup::item(obj)
            .find(COMPONENT, Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn default_component(index: usize) -> String {
    format!("component_{}", index + 1)
}

fn kind_of(v: &Value) -> &'static str {
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
// Tests
// =============================================================================

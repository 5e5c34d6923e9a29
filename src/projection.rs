//! View projection: per-tool summary rows and number formatting.
//!
//! Nothing here mutates workflow state; summaries are built from snapshots.

use serde::Serialize;
use std::collections::HashMap;

use crate::tools::builtin::{
    BUDGET_SENSITIVITY, COMPONENT_VULNERABILITIES, CRISIS_RESILIENCE, DISTRIBUTION, MULTI_YEAR,
    OPTIMIZATION, PERFORMANCE_GAPS, REPORTS, SCENARIO_COMPARISON, SYSTEM_ANALYSIS,
    SYSTEM_VULNERABILITY, TARGET_BASED,
};
use crate::tools::ToolDescriptor;
use crate::workflow::{ResultRecord, ToolRunState, ToolStatus, WorkflowStore};

/// One row of the tool overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSummary {
    pub tool_id: String,
    pub label: String,
    pub status: ToolStatus,
    pub configured: bool,
    /// First dependency that has not completed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Summary rows for every tool, in registry order.
pub async fn summarize(store: &WorkflowStore, currency: &str) -> Vec<ToolSummary> {
    let states = store.run_states().await;
    let mut configured = HashMap::new();
    for tool in store.list_tools() {
        let ready = store.is_configured(&tool.id).await.unwrap_or(false);
        configured.insert(tool.id.clone(), ready);
    }
    project(store.list_tools(), &states, &configured, currency)
}

/// Pure projection over snapshots.
pub fn project(
    tools: &[ToolDescriptor],
    states: &HashMap<String, ToolRunState>,
    configured: &HashMap<String, bool>,
    currency: &str,
) -> Vec<ToolSummary> {
    tools
        .iter()
        .map(|tool| {
            let state = states.get(&tool.id).cloned().unwrap_or_default();
            let blocked_by = tool
                .dependencies
                .iter()
                .find(|dep| {
                    states.get(dep.as_str()).map(|s| s.status) != Some(ToolStatus::Completed)
                })
                .cloned();

            ToolSummary {
                tool_id: tool.id.clone(),
                label: tool.label.clone(),
                status: state.status,
                configured: configured.get(&tool.id).copied().unwrap_or(false),
                blocked_by,
                headline: state.result.as_ref().map(|r| headline(r, currency)),
                last_error: state.last_error,
            }
        })
        .collect()
}

/// The one number a tool's card leads with.
pub fn headline(record: &ResultRecord, currency: &str) -> String {
    match record.tool_id.as_str() {
        OPTIMIZATION => format!(
            "{} improvement ({} → {})",
            format_percent(record.relative_improvement_percent),
            format_score(record.baseline_score),
            format_score(record.optimized_score)
        ),
        MULTI_YEAR => format!(
            "{} improvement over {} years",
            format_percent(record.metric("improvement")),
            record.metric("planning_horizon")
        ),
        BUDGET_SENSITIVITY => format!("elasticity {:.2}", record.metric("elasticity")),
        SCENARIO_COMPARISON => format!("best scenario: {}", record.label("best_scenario")),
        TARGET_BASED => format!(
            "requires {} (achievable: {})",
            format_amount(record.metric("required_budget"), currency),
            record.label("target_achievable")
        ),
        CRISIS_RESILIENCE => format!(
            "resilience {} ({})",
            format_score(record.metric("resilience_score")),
            record.label("resilience_level")
        ),
        DISTRIBUTION => format!(
            "{} allocated ({} utilized)",
            format_amount(record.metric("total_allocated"), currency),
            format_percent(record.budget_utilization_percent)
        ),
        PERFORMANCE_GAPS => format!(
            "average gap {}",
            format_percent(record.metric("average_gap_percent"))
        ),
        COMPONENT_VULNERABILITIES => format!(
            "critical components: {}",
            record.entries("critical_components").len()
        ),
        SYSTEM_VULNERABILITY | SYSTEM_ANALYSIS => format!(
            "FSFVI {} ({} risk)",
            format_score(record.baseline_score),
            record.label("risk_level")
        ),
        REPORTS => format!("{} report", record.label("report_type")),
        _ => format!("score {}", format_score(record.optimized_score)),
    }
}

// =============================================================================
// Number formatting
// =============================================================================

/// `12.345` → `"12.3%"`.
pub fn format_percent(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    format!("{:.1}%", value)
}

/// Vulnerability scores are small fractions; four decimals.
pub fn format_score(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    format!("{:.4}", value)
}

/// Amount in millions: `1234.5` → `"USD 1,234.5M"`.
pub fn format_amount(value: f64, currency: &str) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let fixed = format!("{:.1}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "0"));
    // Sign after rounding: -0.04 is "0.0M", not "-0.0M".
    let rounds_to_zero = whole.bytes().all(|b| b == b'0') && fraction.bytes().all(|b| b == b'0');
    let sign = if value < 0.0 && !rounds_to_zero { "-" } else { "" };
    format!("{} {}{}.{}M", currency, sign, group_thousands(whole), fraction)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

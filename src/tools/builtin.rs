//! Built-in FSFVI analysis tools.

use super::catalog::{ParamDef, ParamType, ToolDescriptor, ToolRegistry};
use crate::types::Result;
use serde_json::json;

pub const OPTIMIZATION: &str = "optimization";
pub const MULTI_YEAR: &str = "multi-year";
pub const BUDGET_SENSITIVITY: &str = "budget-sensitivity";
pub const SCENARIO_COMPARISON: &str = "scenario-comparison";
pub const TARGET_BASED: &str = "target-based";
pub const CRISIS_RESILIENCE: &str = "crisis-resilience";

// Staged vulnerability pipeline. Each step reads what the previous one
// stored on the session, so they run in this order.
pub const DISTRIBUTION: &str = "distribution";
pub const PERFORMANCE_GAPS: &str = "performance-gaps";
pub const COMPONENT_VULNERABILITIES: &str = "component-vulnerabilities";
pub const SYSTEM_VULNERABILITY: &str = "system-vulnerability";
pub const REPORTS: &str = "reports";
/// All pipeline stages in one call.
pub const SYSTEM_ANALYSIS: &str = "system-analysis";

/// Key each built-in tool's results may be nested under.
const WRAPPER_KEYS: [(&str, &str); 12] = [
    (OPTIMIZATION, "optimization_results"),
    (MULTI_YEAR, "multi_year_plan"),
    (BUDGET_SENSITIVITY, "budget_sensitivity"),
    (SCENARIO_COMPARISON, "scenario_comparison"),
    (TARGET_BASED, "target_based_results"),
    (CRISIS_RESILIENCE, "crisis_resilience_assessment"),
    (DISTRIBUTION, "distribution_analysis"),
    (PERFORMANCE_GAPS, "performance_gaps"),
    (COMPONENT_VULNERABILITIES, "vulnerability_analysis"),
    (SYSTEM_VULNERABILITY, "system_fsfvi"),
    (REPORTS, "report"),
    (SYSTEM_ANALYSIS, "system_fsfvi"),
];

/// Wrapper key of a built-in tool.
pub fn wrapper_key_for(tool_id: &str) -> Option<&'static str> {
    WRAPPER_KEYS
        .iter()
        .find(|(id, _)| *id == tool_id)
        .map(|(_, key)| *key)
}

/// Weighting methods understood by the analysis service.
pub const WEIGHTING_METHODS: [&str; 4] = ["financial", "expert", "network", "hybrid"];

/// Shock scenarios understood by the analysis service.
pub const SCENARIOS: [&str; 7] = [
    "normal_operations",
    "climate_shock",
    "financial_crisis",
    "pandemic_disruption",
    "supply_chain_disruption",
    "cyber_threats",
    "political_instability",
];

/// Allocation constraint fields; sent to the backend packed as `constraints`.
pub const CONSTRAINT_PARAMS: [&str; 3] = ["min_allocation", "max_allocation", "transition_limit"];

fn method_param() -> ParamDef {
    ParamDef::new(
        "method",
        ParamType::Enum(WEIGHTING_METHODS.iter().map(|s| s.to_string()).collect()),
        "Component weighting method",
    )
    .with_default(json!("hybrid"))
}

fn scenario_param() -> ParamDef {
    ParamDef::new(
        "scenario",
        ParamType::Enum(SCENARIOS.iter().map(|s| s.to_string()).collect()),
        "Shock scenario",
    )
    .with_default(json!("normal_operations"))
}

fn visualizations_param() -> ParamDef {
    ParamDef::new(
        "include_visualizations",
        ParamType::Bool,
        "Include chart data in the response",
    )
    .with_default(json!(true))
}

fn constraint_params() -> Vec<ParamDef> {
    vec![
        ParamDef::new(
            "min_allocation",
            ParamType::Optional(Box::new(ParamType::Float)),
            "Lower bound per component (millions)",
        )
        .with_range(0.0, f64::MAX),
        ParamDef::new(
            "max_allocation",
            ParamType::Optional(Box::new(ParamType::Float)),
            "Upper bound per component (millions)",
        )
        .with_range(0.0, f64::MAX),
        ParamDef::new(
            "transition_limit",
            ParamType::Optional(Box::new(ParamType::Float)),
            "Maximum change per component per period (percent)",
        )
        .with_range(0.0, 100.0),
    ]
}

fn tool(
    id: &str,
    label: &str,
    description: &str,
    endpoint: &str,
    dependencies: &[&str],
    requires_configuration: bool,
    parameters: Vec<ParamDef>,
) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        endpoint: endpoint.to_string(),
        wrapper_key: wrapper_key_for(id).unwrap_or_default().to_string(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        requires_configuration,
        parameters,
    }
}

/// The standard catalog, registered in dependency order.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    let mut optimization_params = vec![
        method_param(),
        ParamDef::new(
            "budget_change_percent",
            ParamType::Float,
            "Change to the total budget before optimizing",
        )
        .with_default(json!(0.0))
        .with_range(-100.0, 500.0),
    ];
    optimization_params.extend(constraint_params());

    let mut multi_year_params = vec![
        method_param(),
        scenario_param(),
        ParamDef::new("planning_horizon", ParamType::Int, "Years to plan")
            .with_default(json!(5))
            .with_range(1.0, 30.0),
        ParamDef::new(
            "budget_growth",
            ParamType::Float,
            "Annual budget growth (percent)",
        )
        .with_default(json!(3.0))
        .with_range(-50.0, 100.0),
        ParamDef::new(
            "target_fsfvi",
            ParamType::Optional(Box::new(ParamType::Float)),
            "Vulnerability score to reach by the target year",
        )
        .with_range(0.0, 1.0),
        ParamDef::new(
            "target_year",
            ParamType::Optional(Box::new(ParamType::Int)),
            "Year by which the target should be met",
        ),
    ];
    multi_year_params.extend(constraint_params());

    vec![
        tool(
            OPTIMIZATION,
            "Allocation Optimization",
            "Reallocate the current budget to minimise system vulnerability",
            "optimize_allocation",
            &[],
            false,
            optimization_params,
        ),
        tool(
            MULTI_YEAR,
            "Multi-Year Planning",
            "Plan allocations across several fiscal years",
            "multi_year_planning",
            &[OPTIMIZATION],
            false,
            multi_year_params,
        ),
        tool(
            BUDGET_SENSITIVITY,
            "Budget Sensitivity",
            "Measure how the optimized score responds to budget changes",
            "budget_sensitivity_analysis",
            &[OPTIMIZATION],
            true,
            vec![
                method_param(),
                ParamDef::new(
                    "budget_variations",
                    ParamType::FloatList,
                    "Budget changes to test (percent)",
                )
                .with_min_items(1)
                .with_range(-100.0, 500.0),
            ],
        ),
        tool(
            SCENARIO_COMPARISON,
            "Scenario Comparison",
            "Compare optimized allocations across shock scenarios",
            "scenario_comparison",
            &[OPTIMIZATION],
            true,
            vec![
                method_param(),
                ParamDef::new(
                    "scenarios",
                    ParamType::StringList,
                    "Scenarios to compare",
                )
                .with_min_items(2),
            ],
        ),
        tool(
            TARGET_BASED,
            "Target-Based Optimization",
            "Find the budget needed to reach a target vulnerability score",
            "target_based_optimization",
            &[OPTIMIZATION],
            true,
            vec![
                method_param(),
                ParamDef::new(
                    "target_fsfvi",
                    ParamType::Float,
                    "Target vulnerability score",
                )
                .with_range(0.0, 1.0),
                ParamDef::new("target_year", ParamType::Int, "Year to reach the target")
                    .with_range(2000.0, 2100.0),
            ],
        ),
        tool(
            CRISIS_RESILIENCE,
            "Crisis Resilience",
            "Stress-test the optimized allocation against shocks",
            "crisis_resilience_assessment",
            &[OPTIMIZATION],
            false,
            vec![
                method_param(),
                ParamDef::new(
                    "scenarios",
                    ParamType::StringList,
                    "Shocks to test",
                )
                .with_default(json!(["climate_shock", "financial_crisis", "pandemic_disruption"]))
                .with_min_items(1),
            ],
        ),
        tool(
            DISTRIBUTION,
            "Current Distribution",
            "Break down the current budget across food system components",
            "analyze_current_distribution",
            &[],
            false,
            vec![visualizations_param()],
        ),
        tool(
            PERFORMANCE_GAPS,
            "Performance Gaps",
            "Measure each component's gap to its benchmark",
            "calculate_performance_gaps",
            &[DISTRIBUTION],
            false,
            Vec::new(),
        ),
        tool(
            COMPONENT_VULNERABILITIES,
            "Component Vulnerabilities",
            "Score the financing vulnerability of each component",
            "calculate_component_vulnerabilities",
            &[PERFORMANCE_GAPS],
            false,
            vec![method_param(), scenario_param()],
        ),
        tool(
            SYSTEM_VULNERABILITY,
            "System Vulnerability",
            "Aggregate component scores into the system FSFVI",
            "calculate_system_vulnerability",
            &[COMPONENT_VULNERABILITIES],
            false,
            vec![method_param(), scenario_param()],
        ),
        tool(
            REPORTS,
            "Reports",
            "Compile the analysis into a report",
            "generate_reports",
            &[SYSTEM_VULNERABILITY],
            false,
            vec![
                ParamDef::new("report_type", ParamType::String, "Report layout")
                    .with_default(json!("comprehensive")),
                visualizations_param(),
            ],
        ),
        tool(
            SYSTEM_ANALYSIS,
            "Complete System Analysis",
            "Run every pipeline stage in one call",
            "analyze_system",
            &[],
            false,
            vec![
                method_param(),
                scenario_param(),
                ParamDef::new(
                    "include_optimization_preview",
                    ParamType::Bool,
                    "Include a quick optimization estimate",
                )
                .with_default(json!(true)),
            ],
        ),
    ]
}

/// Registry holding the standard catalog.
pub fn builtin_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for descriptor in builtin_tools() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

/// Scenario names are a closed set; flag anything else in a list param.
pub(crate) fn unknown_scenarios(values: &[serde_json::Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !SCENARIOS.contains(s))
        .map(|s| s.to_string())
        .collect()
}

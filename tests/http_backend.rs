//! HTTP backend integration tests against an in-process analysis service.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fsfvi_workflow::backend::{build_request, AnalysisBackend, HttpBackend, StaticTokenStore};
use fsfvi_workflow::tools::builtin_registry;
use fsfvi_workflow::types::{BackendConfig, RunId, SessionId};
use fsfvi_workflow::workflow::{BatchOutcome, ToolStatus};
use fsfvi_workflow::{Error, SessionContext, WorkflowStore};

type Captured = Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>;

async fn optimize(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured.lock().unwrap().push((auth.clone(), form));

    if auth.is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Not authenticated"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "session_id": "sess-1",
            "optimization_results": {
                "success": true,
                "original_fsfvi": 0.0421,
                "optimal_fsfvi": 0.0368,
                "improvement_potential": 12.6,
                "method": "hybrid",
                "original_allocations": [500.0, 300.0],
                "optimal_allocations": [450.0, 350.0],
                "component_names": ["agricultural_development", "infrastructure"]
            }
        })),
    )
}

async fn multi_year() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"detail": "Multi-year planning failed: horizon too long"})),
    )
}

async fn crisis() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"detail": [{"loc": ["body", "scenarios"], "msg": "field required"}]})),
    )
}

async fn distribution(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    Json(json!({
        "session_id": form["session_id"],
        "analysis_type": "current_distribution",
        "distribution_analysis": {
            "total_budget_usd_millions": 2900.0,
            "total_allocated_usd_millions": 2755.0,
            "budget_utilization_percent": 95.0,
            "largest_allocation": "agricultural_development",
            "include_visualizations": form["include_visualizations"]
        },
        "next_step": "Calculate performance gaps to identify improvement areas"
    }))
}

async fn performance_gaps() -> Json<Value> {
    Json(json!({
        "analysis_type": "performance_gaps",
        "average_gap_percent": 23.5,
        "priority_actions": ["Close the infrastructure gap"]
    }))
}

async fn not_json() -> &'static str {
    "<html>maintenance</html>"
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({}))
}

/// Helper: serve the fake analysis service on a random port.
async fn start_service() -> (String, Captured) {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route("/", get(|| async { Json(json!({"status": "healthy"})) }))
        .route("/optimize_allocation", post(optimize))
        .route("/multi_year_planning", post(multi_year))
        .route("/crisis_resilience_assessment", post(crisis))
        .route("/budget_sensitivity_analysis", post(not_json))
        .route("/analyze_current_distribution", post(distribution))
        .route("/calculate_performance_gaps", post(performance_gaps))
        .route("/slow", post(slow))
        .with_state(Arc::clone(&captured));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    (format!("http://{}", addr), captured)
}

fn backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(&BackendConfig {
        base_url: base_url.to_string(),
        ..BackendConfig::default()
    })
    .unwrap()
}

fn ctx() -> SessionContext {
    SessionContext::new(SessionId::from_string("sess-1".to_string()).unwrap(), "Kenya", 2024)
        .with_budget(2900.0, "USD")
}

#[tokio::test]
async fn test_health() {
    let (url, _) = start_service().await;
    let body = backend(&url).health().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_posts_bearer_token_and_form_fields() {
    let (url, captured) = start_service().await;
    let params = json!({"method": "expert", "budget_change_percent": 10.0, "min_allocation": 5.0});
    let request = build_request(
        "optimization",
        "optimize_allocation",
        &ctx(),
        params.as_object().unwrap(),
        "tok-123".to_string(),
        RunId::new(),
    );

    let payload = backend(&url).invoke(&request).await.unwrap();
    assert_eq!(payload["optimization_results"]["optimal_fsfvi"], 0.0368);

    let calls = captured.lock().unwrap();
    let (auth, form) = &calls[0];
    assert_eq!(auth.as_deref(), Some("Bearer tok-123"));
    assert_eq!(form["session_id"], "sess-1");
    assert_eq!(form["country_name"], "Kenya");
    assert_eq!(form["fiscal_year"], "2024");
    assert_eq!(form["method"], "expert");
    assert_eq!(form["budget_change_percent"], "10.0");
    assert_eq!(
        serde_json::from_str::<Value>(&form["constraints"]).unwrap(),
        json!({"min_allocation": 5.0})
    );
}

#[tokio::test]
async fn test_error_detail_is_surfaced() {
    let (url, _) = start_service().await;
    let request = build_request(
        "multi-year",
        "multi_year_planning",
        &ctx(),
        &Default::default(),
        "tok".to_string(),
        RunId::new(),
    );

    match backend(&url).invoke(&request).await.unwrap_err() {
        Error::BackendStatus { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "Multi-year planning failed: horizon too long");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let (url, _) = start_service().await;
    let request = build_request(
        "budget-sensitivity",
        "budget_sensitivity_analysis",
        &ctx(),
        &Default::default(),
        "tok".to_string(),
        RunId::new(),
    );
    let err = backend(&url).invoke(&request).await.unwrap_err();
    assert!(matches!(err, Error::MalformedPayload(_)));
}

#[tokio::test]
async fn test_timeout_is_backend_error() {
    let (url, _) = start_service().await;
    let backend = HttpBackend::new(&BackendConfig {
        base_url: url,
        timeout: Duration::from_millis(200),
        ..BackendConfig::default()
    })
    .unwrap();
    let request = build_request(
        "optimization",
        "slow",
        &ctx(),
        &Default::default(),
        "tok".to_string(),
        RunId::new(),
    );

    let err = backend.invoke(&request).await.unwrap_err();
    assert!(matches!(err, Error::Backend(ref msg) if msg.contains("timed out")));
}

#[tokio::test]
async fn test_workflow_against_service() {
    let (url, captured) = start_service().await;
    let store = WorkflowStore::new(
        builtin_registry().unwrap(),
        Arc::new(backend(&url)),
        Arc::new(StaticTokenStore::new("tok")),
        HashMap::new(),
    );

    let report = store
        .run_all(["optimization", "multi-year", "crisis-resilience"], &ctx())
        .await;

    let Some(BatchOutcome::Completed(record)) = report.outcome("optimization") else {
        panic!("optimization did not complete: {:?}", report);
    };
    assert_eq!(record.baseline_score, 0.0421);
    assert_eq!(record.relative_improvement_percent, 12.6);
    assert_eq!(record.allocation_deltas.len(), 2);
    assert_eq!(record.allocation_deltas[1].component, "infrastructure");
    assert_eq!(record.allocation_deltas[1].change, 50.0);

    let multi_year = store.run_state("multi-year").await.unwrap();
    assert_eq!(multi_year.status, ToolStatus::Error);
    assert!(multi_year
        .last_error
        .as_deref()
        .unwrap()
        .contains("horizon too long"));

    assert!(matches!(
        report.outcome("crisis-resilience"),
        Some(BatchOutcome::Failed(Error::BackendStatus { status: 422, detail }))
            if detail == "field required"
    ));

    assert_eq!(captured.lock().unwrap().len(), 1);
    assert_eq!(report.completed_count(), 1);
    assert_eq!(report.failed_count(), 2);
}

#[tokio::test]
async fn test_unauthenticated_workflow_makes_no_request() {
    let (url, captured) = start_service().await;
    let store = WorkflowStore::new(
        builtin_registry().unwrap(),
        Arc::new(backend(&url)),
        Arc::new(StaticTokenStore::signed_out()),
        HashMap::new(),
    );

    let err = store.run_tool("optimization", &ctx()).await.unwrap_err();
    assert!(matches!(err, Error::Unauthenticated(_)));
    assert!(captured.lock().unwrap().is_empty());
    assert_eq!(
        store.run_state("optimization").await.unwrap().status,
        ToolStatus::Pending
    );
}

#[tokio::test]
async fn test_pipeline_stages_run_in_order() {
    let (url, _) = start_service().await;
    let store = WorkflowStore::new(
        builtin_registry().unwrap(),
        Arc::new(backend(&url)),
        Arc::new(StaticTokenStore::new("tok")),
        HashMap::new(),
    );

    let err = store.run_tool("performance-gaps", &ctx()).await.unwrap_err();
    assert!(matches!(err, Error::DependencyNotSatisfied { .. }));

    let report = store
        .run_all(["distribution", "performance-gaps"], &ctx())
        .await;
    assert!(report.is_success(), "{:?}", report);

    let distribution = store.run_state("distribution").await.unwrap().result.unwrap();
    assert_eq!(distribution.metric("total_allocated"), 2755.0);
    assert_eq!(distribution.budget_utilization_percent, 95.0);

    let gaps = store.run_state("performance-gaps").await.unwrap().result.unwrap();
    assert_eq!(gaps.metric("average_gap_percent"), 23.5);
    assert_eq!(gaps.entries("priority_actions").len(), 1);
}

//! Execution coordinator: run gating and dispatch.
//!
//! A run passes through the gates in a fixed order: configuration,
//! dependencies, in-flight check, token. Only then is the tool marked
//! `running` and the backend called. The gates and the `running` transition
//! happen under one lock acquisition with no await inside it; the token is
//! read beforehand. The lock is released before the backend call and
//! re-taken to record the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::reconciler::{normalize_with, ResultRecord};
use super::state::ToolStatus;
use super::WorkflowState;
use crate::backend::{build_request, AnalysisBackend, TokenStore, ToolRequest};
use crate::session::SessionContext;
use crate::tools::ToolRegistry;
use crate::types::{Error, Result, RunId};

// =============================================================================
// Pending run
// =============================================================================

/// A run that has passed every gate and is now `running`.
#[derive(Debug)]
pub struct PendingRun {
    tool_id: String,
    run_id: RunId,
    handle: JoinHandle<Result<ResultRecord>>,
}

impl PendingRun {
    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Wait for the backend call to finish and the state to settle.
    pub async fn wait(self) -> Result<ResultRecord> {
        self.handle.await.map_err(|e| {
            Error::internal(format!(
                "run {} of {} aborted: {}",
                self.run_id, self.tool_id, e
            ))
        })?
    }
}

// =============================================================================
// Batch report
// =============================================================================

/// Outcome of one tool in a batch.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Already completed before the batch reached it.
    Skipped,
    Completed(Box<ResultRecord>),
    Failed(Error),
}

impl BatchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchOutcome::Failed(_))
    }
}

/// Per-tool outcomes of `run_all`, in request order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, BatchOutcome)>,
}

impl BatchReport {
    pub fn outcome(&self, tool_id: &str) -> Option<&BatchOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == tool_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn completed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, BatchOutcome::Completed(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Clone)]
pub struct ExecutionCoordinator {
    registry: Arc<ToolRegistry>,
    state: Arc<Mutex<WorkflowState>>,
    backend: Arc<dyn AnalysisBackend>,
    tokens: Arc<dyn TokenStore>,
    /// Per-tool endpoint overrides from settings.
    endpoints: Arc<HashMap<String, String>>,
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("tools", &self.registry.len())
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        state: Arc<Mutex<WorkflowState>>,
        backend: Arc<dyn AnalysisBackend>,
        tokens: Arc<dyn TokenStore>,
        endpoints: HashMap<String, String>,
    ) -> Self {
        Self {
            registry,
            state,
            backend,
            tokens,
            endpoints: Arc::new(endpoints),
        }
    }

    /// Pass the gates, mark the tool `running`, and dispatch the backend
    /// call on a separate task.
    ///
    /// Returns as soon as the tool is `running`; gate failures return
    /// before any network I/O and leave the run state untouched.
    pub async fn start_tool(&self, tool_id: &str, ctx: &SessionContext) -> Result<PendingRun> {
        let tool = self.registry.get_tool(tool_id)?;

        // Read before locking: a file-backed store does disk I/O. The result
        // is only inspected after the earlier gates.
        let token = self.tokens.token().await;

        let request = {
            let mut state = self.state.lock().await;

            if !state.configs.is_configured(tool_id)? {
                tracing::debug!(tool_id, "tool_run_gated: configuration required");
                return Err(Error::configuration_required(tool_id));
            }

            if let Some(missing) = tool
                .dependencies
                .iter()
                .find(|dep| state.runs.status(dep) != ToolStatus::Completed)
            {
                tracing::debug!(tool_id, missing = %missing, "tool_run_gated: dependency not satisfied");
                return Err(Error::dependency(tool_id, missing.as_str()));
            }

            if state.runs.status(tool_id) == ToolStatus::Running {
                return Err(Error::already_running(tool_id));
            }

            let token = token?.ok_or_else(|| Error::unauthenticated("sign in to run analyses"))?;

            let params = state.configs.validated_params(tool_id)?;
            let endpoint = self
                .endpoints
                .get(tool_id)
                .map(String::as_str)
                .unwrap_or(tool.endpoint.as_str());
            let request = build_request(tool_id, endpoint, ctx, &params, token, RunId::new());

            state.runs.begin(tool_id, request.run_id.clone())?;
            request
        };

        tracing::info!(
            tool_id,
            run_id = %request.run_id,
            endpoint = %request.endpoint,
            "tool_run_started"
        );

        let run_id = request.run_id.clone();
        let handle = tokio::spawn(
            execute(
                Arc::clone(&self.state),
                Arc::clone(&self.backend),
                request,
                tool.wrapper_key.clone(),
            )
            .in_current_span(),
        );

        Ok(PendingRun {
            tool_id: tool_id.to_string(),
            run_id,
            handle,
        })
    }

    /// Run one tool to completion.
    pub async fn run_tool(&self, tool_id: &str, ctx: &SessionContext) -> Result<ResultRecord> {
        self.start_tool(tool_id, ctx).await?.wait().await
    }

    /// Run tools one after another in the given order.
    ///
    /// Tools already `completed` are skipped. A failure does not stop the
    /// batch; later tools that depend on a failed one are rejected by the
    /// dependency gate and never reach the backend.
    pub async fn run_all<I, S>(&self, tool_ids: I, ctx: &SessionContext) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = BatchReport::default();

        for tool_id in tool_ids {
            let tool_id = tool_id.as_ref();
            let already_done =
                self.state.lock().await.runs.status(tool_id) == ToolStatus::Completed;

            let outcome = if already_done {
                BatchOutcome::Skipped
            } else {
                match self.run_tool(tool_id, ctx).await {
                    Ok(record) => BatchOutcome::Completed(Box::new(record)),
                    Err(e) => {
                        tracing::warn!(tool_id, code = e.code(), "batch_tool_failed: {}", e);
                        BatchOutcome::Failed(e)
                    }
                }
            };
            report.outcomes.push((tool_id.to_string(), outcome));
        }

        tracing::info!(
            completed = report.completed_count(),
            failed = report.failed_count(),
            total = report.outcomes.len(),
            "batch_finished"
        );
        report
    }
}

/// Backend call and outcome recording; runs on its own task.
async fn execute(
    state: Arc<Mutex<WorkflowState>>,
    backend: Arc<dyn AnalysisBackend>,
    request: ToolRequest,
    wrapper_key: String,
) -> Result<ResultRecord> {
    let started = Instant::now();
    let outcome = match backend.invoke(&request).await {
        Ok(payload) => normalize_with(&request.tool_id, Some(&wrapper_key), &payload),
        Err(e) => Err(e),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut state = state.lock().await;
    match outcome {
        Ok(record) => {
            state
                .runs
                .complete(&request.tool_id, &request.run_id, record.clone())?;
            tracing::info!(
                tool_id = %request.tool_id,
                run_id = %request.run_id,
                status = %ToolStatus::Completed,
                elapsed_ms,
                "tool_run_finished"
            );
            Ok(record)
        }
        Err(e) => {
            state
                .runs
                .fail(&request.tool_id, &request.run_id, e.to_string())?;
            tracing::warn!(
                tool_id = %request.tool_id,
                run_id = %request.run_id,
                status = %ToolStatus::Error,
                elapsed_ms,
                "tool_run_failed: {}",
                e
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockAnalysisBackend, StaticTokenStore};
    use crate::tools::builtin::{
        builtin_registry, BUDGET_SENSITIVITY, MULTI_YEAR, OPTIMIZATION, TARGET_BASED,
    };
    use crate::types::SessionId;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn ctx() -> SessionContext {
        SessionContext::new(SessionId::from_string("sess-1".to_string()).unwrap(), "Kenya", 2024)
            .with_budget(2_900.0, "USD")
    }

    fn coordinator_with(
        backend: impl AnalysisBackend + 'static,
        tokens: StaticTokenStore,
    ) -> ExecutionCoordinator {
        let registry = Arc::new(builtin_registry().unwrap());
        let state = Arc::new(Mutex::new(WorkflowState::new(Arc::clone(&registry))));
        ExecutionCoordinator::new(
            registry,
            state,
            Arc::new(backend),
            Arc::new(tokens),
            HashMap::new(),
        )
    }

    fn coordinator(backend: impl AnalysisBackend + 'static) -> ExecutionCoordinator {
        coordinator_with(backend, StaticTokenStore::new("tok"))
    }

    async fn status(c: &ExecutionCoordinator, tool_id: &str) -> ToolStatus {
        c.state.lock().await.runs.status(tool_id)
    }

    #[tokio::test]
    async fn test_optimization_runs_to_completion() {
        let mut backend = MockAnalysisBackend::new();
        backend
            .expect_invoke()
            .withf(|req: &ToolRequest| {
                req.tool_id == OPTIMIZATION
                    && req.endpoint == "optimize_allocation"
                    && req.bearer_token == "tok"
                    && req.field("country_name") == Some("Kenya")
            })
            .times(1)
            .returning(|_| Ok(json!({"relative_improvement_percent": 12.5})));

        let c = coordinator(backend);
        let record = c.run_tool(OPTIMIZATION, &ctx()).await.unwrap();

        assert_eq!(record.relative_improvement_percent, 12.5);
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Completed);
        let state = c.state.lock().await;
        let run = state.runs.get(OPTIMIZATION).unwrap();
        assert_eq!(run.result.as_ref(), Some(&record));
        assert_eq!(run.run_count, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_tool_never_reaches_backend() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().times(0);
        let c = coordinator(backend);

        // Complete the dependency by hand so only the configuration gate applies.
        {
            let mut state = c.state.lock().await;
            let run_id = RunId::new();
            state.runs.begin(OPTIMIZATION, run_id.clone()).unwrap();
            state
                .runs
                .complete(OPTIMIZATION, &run_id, ResultRecord::empty(OPTIMIZATION))
                .unwrap();
        }

        for tool_id in [BUDGET_SENSITIVITY, TARGET_BASED] {
            let err = c.run_tool(tool_id, &ctx()).await.unwrap_err();
            assert!(matches!(err, Error::ConfigurationRequired(ref id) if id == tool_id));
            assert_eq!(status(&c, tool_id).await, ToolStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_dependency_gate() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().times(0);
        let c = coordinator(backend);

        let err = c.run_tool(MULTI_YEAR, &ctx()).await.unwrap_err();
        match err {
            Error::DependencyNotSatisfied { tool, missing } => {
                assert_eq!(tool, MULTI_YEAR);
                assert_eq!(missing, OPTIMIZATION);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(status(&c, MULTI_YEAR).await, ToolStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().times(0);
        let c = coordinator_with(backend, StaticTokenStore::signed_out());

        let err = c.run_tool(OPTIMIZATION, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Pending);
    }

    /// Token store that blocks until released.
    struct SlowTokenStore {
        release: Notify,
    }

    #[async_trait]
    impl TokenStore for SlowTokenStore {
        async fn token(&self) -> Result<Option<String>> {
            self.release.notified().await;
            Ok(Some("tok".to_string()))
        }
    }

    #[tokio::test]
    async fn test_token_read_does_not_hold_state_lock() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().times(1).returning(|_| Ok(json!({})));
        let tokens = Arc::new(SlowTokenStore {
            release: Notify::new(),
        });
        let registry = Arc::new(builtin_registry().unwrap());
        let state = Arc::new(Mutex::new(WorkflowState::new(Arc::clone(&registry))));
        let c = ExecutionCoordinator::new(
            registry,
            state,
            Arc::new(backend),
            tokens.clone(),
            HashMap::new(),
        );

        let runner = c.clone();
        let run = tokio::spawn(async move { runner.run_tool(OPTIMIZATION, &ctx()).await });
        tokio::task::yield_now().await;

        let guard = tokio::time::timeout(Duration::from_millis(300), c.state.lock())
            .await
            .expect("state lock held during token read");
        assert_eq!(guard.runs.status(OPTIMIZATION), ToolStatus::Pending);
        drop(guard);

        tokens.release.notify_one();
        run.await.unwrap().unwrap();
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Completed);
    }

    #[tokio::test]
    async fn test_configuration_gate_precedes_missing_token() {
        let c = coordinator_with(MockAnalysisBackend::new(), StaticTokenStore::signed_out());
        let err = c.run_tool(BUDGET_SENSITIVITY, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationRequired(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let c = coordinator(MockAnalysisBackend::new());
        let err = c.run_tool("weather", &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_sets_error() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().times(1).returning(|_| {
            Err(Error::BackendStatus {
                status: 500,
                detail: "Optimization failed".to_string(),
            })
        });
        let c = coordinator(backend);

        let err = c.run_tool(OPTIMIZATION, &ctx()).await.unwrap_err();
        assert!(err.is_backend());

        let state = c.state.lock().await;
        let run = state.runs.get(OPTIMIZATION).unwrap();
        assert_eq!(run.status, ToolStatus::Error);
        assert!(run.last_error.as_deref().unwrap().contains("Optimization failed"));
        assert!(run.result.is_none());
    }

    #[tokio::test]
    async fn test_non_object_payload_sets_error() {
        let mut backend = MockAnalysisBackend::new();
        backend
            .expect_invoke()
            .times(1)
            .returning(|_| Ok(json!(["not", "an", "object"])));
        let c = coordinator(backend);

        let err = c.run_tool(OPTIMIZATION, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Error);
    }

    #[tokio::test]
    async fn test_endpoint_override() {
        let mut backend = MockAnalysisBackend::new();
        backend
            .expect_invoke()
            .withf(|req: &ToolRequest| req.endpoint == "v2/optimize")
            .times(1)
            .returning(|_| Ok(json!({})));

        let registry = Arc::new(builtin_registry().unwrap());
        let state = Arc::new(Mutex::new(WorkflowState::new(Arc::clone(&registry))));
        let c = ExecutionCoordinator::new(
            registry,
            state,
            Arc::new(backend),
            Arc::new(StaticTokenStore::new("tok")),
            HashMap::from([(OPTIMIZATION.to_string(), "/v2/optimize".to_string())]),
        );
        c.run_tool(OPTIMIZATION, &ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_stops_dependents_after_failure() {
        let mut backend = MockAnalysisBackend::new();
        backend
            .expect_invoke()
            .withf(|req: &ToolRequest| req.tool_id == OPTIMIZATION)
            .times(1)
            .returning(|_| Err(Error::backend("connection refused")));
        backend
            .expect_invoke()
            .withf(|req: &ToolRequest| req.tool_id == MULTI_YEAR)
            .times(0);
        let c = coordinator(backend);

        let report = c.run_all([OPTIMIZATION, MULTI_YEAR], &ctx()).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failed_count(), 2);
        assert!(matches!(
            report.outcome(OPTIMIZATION),
            Some(BatchOutcome::Failed(Error::Backend(_)))
        ));
        assert!(matches!(
            report.outcome(MULTI_YEAR),
            Some(BatchOutcome::Failed(Error::DependencyNotSatisfied { .. }))
        ));
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Error);
        assert_eq!(status(&c, MULTI_YEAR).await, ToolStatus::Pending);
    }

    #[tokio::test]
    async fn test_batch_skips_completed_and_continues() {
        let mut backend = MockAnalysisBackend::new();
        backend
            .expect_invoke()
            .times(2)
            .returning(|req| Ok(json!({"tool": req.tool_id})));
        let c = coordinator(backend);

        c.run_tool(OPTIMIZATION, &ctx()).await.unwrap();
        let report = c
            .run_all([OPTIMIZATION, BUDGET_SENSITIVITY, MULTI_YEAR], &ctx())
            .await;

        assert!(matches!(report.outcome(OPTIMIZATION), Some(BatchOutcome::Skipped)));
        assert!(matches!(
            report.outcome(BUDGET_SENSITIVITY),
            Some(BatchOutcome::Failed(Error::ConfigurationRequired(_)))
        ));
        assert!(matches!(report.outcome(MULTI_YEAR), Some(BatchOutcome::Completed(_))));
        assert_eq!(report.completed_count(), 1);
        assert!(!report.is_success());
    }

    /// Blocks every call until released, counting invocations.
    struct GatedBackend {
        calls: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl AnalysisBackend for GatedBackend {
        async fn invoke(&self, _request: &ToolRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(json!({"optimization_results": {"optimal_fsfvi": 0.03}}))
        }
    }

    #[tokio::test]
    async fn test_overlapping_runs_call_backend_once() {
        let backend = Arc::new(GatedBackend {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let registry = Arc::new(builtin_registry().unwrap());
        let state = Arc::new(Mutex::new(WorkflowState::new(Arc::clone(&registry))));
        let c = ExecutionCoordinator::new(
            registry,
            state,
            backend.clone(),
            Arc::new(StaticTokenStore::new("tok")),
            HashMap::new(),
        );

        let first = c.start_tool(OPTIMIZATION, &ctx()).await.unwrap();
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Running);

        let err = c.run_tool(OPTIMIZATION, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning(_)));

        // notify_one stores a permit if the task has not reached the await yet.
        backend.release.notify_one();
        let record = first.wait().await.unwrap();

        assert_eq!(record.optimized_score, 0.03);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(status(&c, OPTIMIZATION).await, ToolStatus::Completed);
    }

    #[tokio::test]
    async fn test_rerun_replaces_result() {
        let mut backend = MockAnalysisBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(json!({"optimal_fsfvi": 0.05})));
        backend
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(json!({"optimal_fsfvi": 0.04})));
        let c = coordinator(backend);

        c.run_tool(OPTIMIZATION, &ctx()).await.unwrap();
        c.run_tool(OPTIMIZATION, &ctx()).await.unwrap();

        let state = c.state.lock().await;
        let run = state.runs.get(OPTIMIZATION).unwrap();
        assert_eq!(run.run_count, 2);
        assert_eq!(run.result.as_ref().unwrap().optimized_score, 0.04);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_run_is_logged() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().returning(|_| Ok(json!({})));
        let c = coordinator(backend);

        c.run_tool(OPTIMIZATION, &ctx()).await.unwrap();
        assert!(logs_contain("tool_run_started"));
        assert!(logs_contain("tool_run_finished"));
    }
}

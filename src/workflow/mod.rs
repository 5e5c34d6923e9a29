//! Analysis workflow state and the facade over it.
//!
//! [`WorkflowStore`] is the one object a UI holds. It owns the per-tool
//! configuration and run state behind a single `Arc<Mutex<_>>` and hands out
//! snapshots; every mutation goes through its methods.
//!
//! ```text
//!   run_tool(id) ─→ ConfigStore ─→ RunBook gates ─→ TokenStore
//!                                                     │
//!                     ResultRecord ←─ normalize ←─ AnalysisBackend
//! ```

pub mod config_store;
pub mod coordinator;
pub mod reconciler;
pub mod state;

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::backend::{AnalysisBackend, FileTokenStore, HttpBackend, TokenStore};
use crate::session::SessionContext;
use crate::tools::{builtin_registry, ToolDescriptor, ToolRegistry};
use crate::types::{Config, Result};

pub use config_store::{ConfigStore, ToolConfig};
pub use coordinator::{BatchOutcome, BatchReport, ExecutionCoordinator, PendingRun};
pub use reconciler::{normalize, normalize_with, AllocationDelta, ResultRecord};
pub use state::{RunBook, ToolRunState, ToolStatus};

/// Mutable workflow state, guarded as one unit.
#[derive(Debug)]
pub struct WorkflowState {
    pub configs: ConfigStore,
    pub runs: RunBook,
}

impl WorkflowState {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            runs: RunBook::new(registry.list_ids()),
            configs: ConfigStore::new(registry),
        }
    }
}

/// Injectable workflow facade. Clones share the same state.
#[derive(Clone, Debug)]
pub struct WorkflowStore {
    registry: Arc<ToolRegistry>,
    state: Arc<Mutex<WorkflowState>>,
    coordinator: ExecutionCoordinator,
}

impl WorkflowStore {
    pub fn new(
        registry: ToolRegistry,
        backend: Arc<dyn AnalysisBackend>,
        tokens: Arc<dyn TokenStore>,
        endpoints: HashMap<String, String>,
    ) -> Self {
        let registry = Arc::new(registry);
        let state = Arc::new(Mutex::new(WorkflowState::new(Arc::clone(&registry))));
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            backend,
            tokens,
            endpoints,
        );
        Self {
            registry,
            state,
            coordinator,
        }
    }

    /// Built-in catalog over HTTP, token read from the configured file.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(&config.backend)?;
        let tokens = FileTokenStore::new(&config.auth.token_file);
        Ok(Self::new(
            builtin_registry()?,
            Arc::new(backend),
            Arc::new(tokens),
            config.backend.endpoints.clone(),
        ))
    }

    // =========================================================================
    // Registry
    // =========================================================================

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn list_tools(&self) -> &[ToolDescriptor] {
        self.registry.list_tools()
    }

    pub fn get_tool(&self, tool_id: &str) -> Result<&ToolDescriptor> {
        self.registry.get_tool(tool_id)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn get_config(&self, tool_id: &str) -> Result<ToolConfig> {
        self.state.lock().await.configs.get_config(tool_id)
    }

    pub async fn update_config(
        &self,
        tool_id: &str,
        partial: Map<String, Value>,
    ) -> Result<ToolConfig> {
        self.state.lock().await.configs.update_config(tool_id, partial)
    }

    pub async fn confirm_config(
        &self,
        tool_id: &str,
        partial: Map<String, Value>,
    ) -> Result<ToolConfig> {
        let result = self.state.lock().await.configs.confirm_config(tool_id, partial);
        match &result {
            Ok(_) => tracing::info!(tool_id, "tool_config_confirmed"),
            Err(e) => tracing::debug!(tool_id, "tool_config_rejected: {}", e),
        }
        result
    }

    pub async fn reset_config(&self, tool_id: &str) -> Result<ToolConfig> {
        self.state.lock().await.configs.reset_config(tool_id)
    }

    pub async fn is_configured(&self, tool_id: &str) -> Result<bool> {
        self.state.lock().await.configs.is_configured(tool_id)
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub async fn run_tool(&self, tool_id: &str, ctx: &SessionContext) -> Result<ResultRecord> {
        self.coordinator.run_tool(tool_id, ctx).await
    }

    pub async fn start_tool(&self, tool_id: &str, ctx: &SessionContext) -> Result<PendingRun> {
        self.coordinator.start_tool(tool_id, ctx).await
    }

    pub async fn run_all<I, S>(&self, tool_ids: I, ctx: &SessionContext) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.coordinator.run_all(tool_ids, ctx).await
    }

    pub async fn run_state(&self, tool_id: &str) -> Result<ToolRunState> {
        self.state.lock().await.runs.get(tool_id).cloned()
    }

    pub async fn run_states(&self) -> HashMap<String, ToolRunState> {
        self.state.lock().await.runs.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockAnalysisBackend, StaticTokenStore};
    use crate::tools::builtin::{BUDGET_SENSITIVITY, MULTI_YEAR, OPTIMIZATION};
    use crate::types::{Error, SessionId};
    use serde_json::json;

    fn ctx() -> SessionContext {
        SessionContext::new(SessionId::from_string("sess-7".to_string()).unwrap(), "Ghana", 2025)
    }

    fn store(backend: MockAnalysisBackend) -> WorkflowStore {
        WorkflowStore::new(
            builtin_registry().unwrap(),
            Arc::new(backend),
            Arc::new(StaticTokenStore::new("tok")),
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let mut backend = MockAnalysisBackend::new();
        backend
            .expect_invoke()
            .times(1)
            .returning(|_| Ok(json!({"optimization_results": {"original_fsfvi": 0.04}})));
        let store = store(backend);
        let other = store.clone();

        store.run_tool(OPTIMIZATION, &ctx()).await.unwrap();

        let state = other.run_state(OPTIMIZATION).await.unwrap();
        assert_eq!(state.status, ToolStatus::Completed);
        assert_eq!(state.result.unwrap().baseline_score, 0.04);
        assert_eq!(other.run_states().await.len(), other.list_tools().len());
    }

    #[tokio::test]
    async fn test_configure_then_run_after_dependency() {
        let mut backend = MockAnalysisBackend::new();
        backend.expect_invoke().times(2).returning(|req| {
            if req.tool_id == BUDGET_SENSITIVITY {
                assert_eq!(req.field("budget_variations"), Some("[-20.0,20.0]"));
            }
            Ok(json!({"budget_sensitivity": {"budget_elasticity": 0.8}}))
        });
        let store = store(backend);
        let variations = json!({"budget_variations": [-20.0, 20.0]});

        let err = store.run_tool(BUDGET_SENSITIVITY, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationRequired(_)));

        store
            .confirm_config(BUDGET_SENSITIVITY, variations.as_object().cloned().unwrap())
            .await
            .unwrap();
        assert!(store.is_configured(BUDGET_SENSITIVITY).await.unwrap());

        let err = store.run_tool(BUDGET_SENSITIVITY, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::DependencyNotSatisfied { .. }));

        store.run_tool(OPTIMIZATION, &ctx()).await.unwrap();
        let record = store.run_tool(BUDGET_SENSITIVITY, &ctx()).await.unwrap();
        assert_eq!(record.metric("elasticity"), 0.8);
    }

    #[tokio::test]
    async fn test_reset_config_clears_confirmation() {
        let store = store(MockAnalysisBackend::new());
        store
            .confirm_config(
                BUDGET_SENSITIVITY,
                json!({"budget_variations": [10.0]}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        store.reset_config(BUDGET_SENSITIVITY).await.unwrap();
        assert!(!store.is_configured(BUDGET_SENSITIVITY).await.unwrap());
        assert!(store.is_configured(MULTI_YEAR).await.unwrap());
    }

    #[test]
    fn test_from_config() {
        let store = WorkflowStore::from_config(&Config::default()).unwrap();
        assert_eq!(store.list_tools().len(), 12);
        assert!(store.get_tool("nope").is_err());
    }
}

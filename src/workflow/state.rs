//! Per-tool run state and its transition rules.
//!
//! ```text
//! PENDING → RUNNING → {COMPLETED | ERROR}
//!              ↑            │
//!              └────────────┘  (re-run)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::reconciler::ResultRecord;
use crate::types::{Error, Result, RunId};

/// Execution status of one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    /// Check if transition is valid.
    pub fn can_transition_to(self, to: ToolStatus) -> bool {
        matches!(
            (self, to),
            (ToolStatus::Pending, ToolStatus::Running)
                | (ToolStatus::Running, ToolStatus::Completed)
                | (ToolStatus::Running, ToolStatus::Error)
                | (ToolStatus::Completed, ToolStatus::Running)
                | (ToolStatus::Error, ToolStatus::Running)
        )
    }

    /// Settled states: a run finished one way or the other.
    pub fn is_settled(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Running => "running",
            ToolStatus::Completed => "completed",
            ToolStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run state of one tool, as rendered by the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRunState {
    pub status: ToolStatus,
    /// Latest successful result; replaced wholesale on each success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub run_count: u32,
}

impl ToolRunState {
    pub fn is_completed(&self) -> bool {
        self.status == ToolStatus::Completed
    }

    /// Wall-clock duration of the latest settled run.
    pub fn elapsed_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) if self.status.is_settled() => {
                Some((end - start).num_milliseconds())
            }
            _ => None,
        }
    }
}

/// Run-state table: exactly one entry per registered tool.
#[derive(Debug, Default)]
pub struct RunBook {
    states: HashMap<String, ToolRunState>,
}

impl RunBook {
    pub fn new<I, S>(tool_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            states: tool_ids
                .into_iter()
                .map(|id| (id.into(), ToolRunState::default()))
                .collect(),
        }
    }

    pub fn get(&self, tool_id: &str) -> Result<&ToolRunState> {
        self.states
            .get(tool_id)
            .ok_or_else(|| Error::unknown_tool(tool_id))
    }

    pub fn status(&self, tool_id: &str) -> ToolStatus {
        self.states
            .get(tool_id)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, ToolRunState> {
        self.states.clone()
    }

    fn get_mut(&mut self, tool_id: &str) -> Result<&mut ToolRunState> {
        self.states
            .get_mut(tool_id)
            .ok_or_else(|| Error::unknown_tool(tool_id))
    }

    /// Transition to RUNNING. Rejects a tool already in flight.
    pub fn begin(&mut self, tool_id: &str, run_id: RunId) -> Result<()> {
        let state = self.get_mut(tool_id)?;
        if state.status == ToolStatus::Running {
            return Err(Error::already_running(tool_id));
        }
        transition(tool_id, state, ToolStatus::Running)?;

        state.run_id = Some(run_id);
        state.started_at = Some(Utc::now());
        state.finished_at = None;
        state.run_count += 1;
        Ok(())
    }

    /// Transition RUNNING → COMPLETED and store the result.
    pub fn complete(&mut self, tool_id: &str, run_id: &RunId, record: ResultRecord) -> Result<()> {
        let state = self.current_run(tool_id, run_id)?;
        transition(tool_id, state, ToolStatus::Completed)?;

        state.result = Some(record);
        state.last_error = None;
        state.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Transition RUNNING → ERROR. A previous result stays visible.
    pub fn fail(&mut self, tool_id: &str, run_id: &RunId, message: String) -> Result<()> {
        let state = self.current_run(tool_id, run_id)?;
        transition(tool_id, state, ToolStatus::Error)?;

        state.last_error = Some(message);
        state.finished_at = Some(Utc::now());
        Ok(())
    }

    fn current_run(&mut self, tool_id: &str, run_id: &RunId) -> Result<&mut ToolRunState> {
        let state = self.get_mut(tool_id)?;
        if state.run_id.as_ref() != Some(run_id) {
            return Err(Error::state_transition(format!(
                "run {} is not the current run of {}",
                run_id, tool_id
            )));
        }
        Ok(state)
    }
}

fn transition(tool_id: &str, state: &mut ToolRunState, to: ToolStatus) -> Result<()> {
    if !state.status.can_transition_to(to) {
        return Err(Error::state_transition(format!(
            "cannot move {} from {} to {}",
            tool_id, state.status, to
        )));
    }
    state.status = to;
    Ok(())
}

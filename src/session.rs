//! Session context passed to every tool invocation.

use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Identifying data for the uploaded dataset being analysed.
///
/// Read-only from the orchestrator's point of view; produced by the upload
/// flow, which lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub country: String,
    pub fiscal_year: i32,
    /// Total budget in millions of `currency`.
    pub total_budget: f64,
    pub currency: String,
}

impl SessionContext {
    pub fn new(session_id: SessionId, country: impl Into<String>, fiscal_year: i32) -> Self {
        Self {
            session_id,
            country: country.into(),
            fiscal_year,
            total_budget: 0.0,
            currency: "USD".to_string(),
        }
    }

    pub fn with_budget(mut self, total_budget: f64, currency: impl Into<String>) -> Self {
        self.total_budget = total_budget;
        self.currency = currency.into();
        self
    }

    /// Form fields identifying the session on every backend call.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("session_id".to_string(), self.session_id.to_string()),
            ("country_name".to_string(), self.country.clone()),
            ("fiscal_year".to_string(), self.fiscal_year.to_string()),
            ("total_budget".to_string(), self.total_budget.to_string()),
            ("currency".to_string(), self.currency.clone()),
        ]
    }
}

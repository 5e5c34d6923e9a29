//! # FSFVI Workflow - Analysis Orchestrator
//!
//! Client-side orchestration for the Food System Financing Vulnerability
//! Index analysis service:
//! - Tool registry with parameter definitions and dependency metadata
//! - Per-tool configuration with validation before confirmation
//! - Dependency- and configuration-gated execution with run-state tracking
//! - Reconciliation of heterogeneous backend payloads into one record shape
//! - Summary projection and number formatting for display
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────┐
//!   UI / CLI  →      │          WorkflowStore           │
//!                    │  ┌───────────┐ ┌─────────────┐   │
//!                    │  │  Config   │ │   RunBook   │   │
//!                    │  │  Store    │ │ (run state) │   │
//!                    │  └───────────┘ └─────────────┘   │
//!                    │  ┌──────────────────────────┐    │
//!                    │  │  ExecutionCoordinator    │────┼──→ AnalysisBackend (HTTP)
//!                    │  └──────────────────────────┘    │
//!                    └──────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod backend;
pub mod projection;
pub mod session;
pub mod tools;
pub mod types;
pub mod workflow;

// Internal utilities
pub mod observability;

pub use session::SessionContext;
pub use types::{Config, Error, Result};
pub use workflow::{ResultRecord, ToolStatus, WorkflowStore};

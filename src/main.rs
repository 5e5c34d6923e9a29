//! FSFVI workflow command-line client.
//!
//! Drives the analysis service from a terminal: list tools, validate a
//! configuration, run a tool (with its prerequisites) or a batch, and check
//! service health.

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;

use fsfvi_workflow::backend::HttpBackend;
use fsfvi_workflow::projection::{format_amount, format_percent, headline};
use fsfvi_workflow::types::SessionId;
use fsfvi_workflow::workflow::{BatchOutcome, BatchReport};
use fsfvi_workflow::{Config, Error, Result, SessionContext, WorkflowStore};

#[derive(Parser)]
#[command(name = "fsfvi-workflow")]
#[command(about = "FSFVI analysis workflow client")]
struct Cli {
    /// Settings file (JSON).
    #[arg(long, global = true, env = "FSFVI_CONFIG")]
    config: Option<PathBuf>,
    /// Machine-readable output.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SessionArgs {
    #[arg(long, env = "FSFVI_SESSION_ID")]
    session_id: String,
    #[arg(long, default_value = "Unknown")]
    country: String,
    #[arg(long, default_value_t = 2024)]
    fiscal_year: i32,
    /// Total budget in millions.
    #[arg(long, default_value_t = 0.0)]
    budget: f64,
    #[arg(long, default_value = "USD")]
    currency: String,
}

impl SessionArgs {
    fn context(&self) -> Result<SessionContext> {
        let session_id = SessionId::from_string(self.session_id.clone())
            .map_err(|e| Error::config(e.to_string()))?;
        Ok(
            SessionContext::new(session_id, self.country.clone(), self.fiscal_year)
                .with_budget(self.budget, self.currency.clone()),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the analysis tools.
    Tools,
    /// Validate a tool configuration given as a JSON object.
    Config { tool: String, params: String },
    /// Run a tool after its prerequisites.
    Run {
        tool: String,
        /// Tool parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Run several tools in order (all tools when none are named).
    RunAll {
        tools: Vec<String>,
        /// JSON object mapping tool id to its parameters.
        #[arg(long)]
        params_file: Option<PathBuf>,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Check that the analysis service is reachable.
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };
    fsfvi_workflow::observability::init_tracing_with(&config.observability);

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(code = e.code(), "command_failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let store = WorkflowStore::from_config(&config)?;

    match cli.command {
        Commands::Tools => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(store.list_tools())?);
            } else {
                println!("{}", store.registry().describe());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { tool, params } => {
            match store.confirm_config(&tool, parse_object(&params)?).await {
                Ok(config) => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(Error::Validation { issues, .. }) => {
                    for issue in issues {
                        eprintln!("- {}", issue);
                    }
                    Ok(ExitCode::from(2))
                }
                Err(e) => Err(e),
            }
        }
        Commands::Run {
            tool,
            params,
            session,
        } => {
            let ctx = session.context()?;
            if let Some(params) = params {
                store.confirm_config(&tool, parse_object(&params)?).await?;
            }
            let mut order = prerequisites(&store, &tool)?;
            order.push(tool);
            let report = store.run_all(&order, &ctx).await;
            print_report(&report, &ctx.currency, cli.json)?;
            Ok(exit_code(&report))
        }
        Commands::RunAll {
            tools,
            params_file,
            session,
        } => {
            let ctx = session.context()?;
            if let Some(path) = params_file {
                let raw = tokio::fs::read_to_string(&path).await?;
                for (tool_id, params) in parse_object(&raw)? {
                    let params = params.as_object().cloned().ok_or_else(|| {
                        Error::config(format!("parameters for {} must be an object", tool_id))
                    })?;
                    store.confirm_config(&tool_id, params).await?;
                }
            }
            let tools = if tools.is_empty() {
                store.registry().list_ids()
            } else {
                tools
            };
            let report = store.run_all(&tools, &ctx).await;
            print_report(&report, &ctx.currency, cli.json)?;
            Ok(exit_code(&report))
        }
        Commands::Health => {
            let backend = HttpBackend::new(&config.backend)?;
            let body = backend.health().await?;
            if cli.json {
                println!("{}", body);
            } else {
                println!("{} is up", backend.base_url());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Transitive dependencies of `tool_id`, prerequisites first.
fn prerequisites(store: &WorkflowStore, tool_id: &str) -> Result<Vec<String>> {
    let mut order: Vec<String> = Vec::new();
    let mut stack = vec![tool_id.to_string()];
    while let Some(id) = stack.pop() {
        for dep in store.registry().dependencies_of(&id)? {
            if !order.contains(dep) {
                order.push(dep.clone());
                stack.push(dep.clone());
            }
        }
    }
    // Registration order is a valid execution order.
    let ids = store.registry().list_ids();
    order.sort_by_key(|id| ids.iter().position(|known| known == id));
    Ok(order)
}

fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::config(format!("expected a JSON object, got {}", other))),
    }
}

fn exit_code(report: &BatchReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &BatchReport, currency: &str, as_json: bool) -> Result<()> {
    if as_json {
        let rows: Vec<Value> = report
            .outcomes
            .iter()
            .map(|(tool_id, outcome)| match outcome {
                BatchOutcome::Skipped => json!({"tool_id": tool_id, "outcome": "skipped"}),
                BatchOutcome::Completed(record) => {
                    json!({"tool_id": tool_id, "outcome": "completed", "result": record})
                }
                BatchOutcome::Failed(e) => json!({
                    "tool_id": tool_id,
                    "outcome": "failed",
                    "code": e.code(),
                    "message": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (tool_id, outcome) in &report.outcomes {
        match outcome {
            BatchOutcome::Skipped => println!("{:<22} skipped (already completed)", tool_id),
            BatchOutcome::Completed(record) => {
                println!("{:<22} {}", tool_id, headline(record, currency));
                if record.reallocation_amount != 0.0 {
                    println!(
                        "{:<22} reallocates {} ({} of budget), utilization {}",
                        "",
                        format_amount(record.reallocation_amount, currency),
                        format_percent(record.reallocation_intensity_percent),
                        format_percent(record.budget_utilization_percent)
                    );
                }
                for delta in &record.allocation_deltas {
                    println!(
                        "{:<22}   {:<32} {} → {} ({})",
                        "",
                        delta.component,
                        format_amount(delta.current, currency),
                        format_amount(delta.optimized, currency),
                        format_percent(delta.change_percent)
                    );
                }
                if !record.success {
                    println!("{:<22} service reported an unsuccessful run", "");
                }
            }
            BatchOutcome::Failed(e) => println!("{:<22} failed: {}", tool_id, e),
        }
    }
    println!(
        "{} completed, {} failed",
        report.completed_count(),
        report.failed_count()
    );
    Ok(())
}

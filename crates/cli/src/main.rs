use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use eva_core::events::EventLog;
use eva_core::storage::{JsonlEventLog, NullEventLog};
use eva_core::workflow::WorkflowExecutor;
use eva_core::{Workflow, WorkflowCatalog, WorkflowDag};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod tools;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "eva")]
#[command(about = "Run EVA tool workflows from a template catalog", long_about = None)]
struct Args {
    /// Path to the workflow catalog
    #[arg(long, default_value = "workflows.toml", env = "EVA_CATALOG")]
    catalog: PathBuf,

    /// Path to configuration file
    #[arg(short, long, default_value = "eva.toml")]
    config: PathBuf,

    /// Append workflow events to this JSONL file
    #[arg(long)]
    event_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog templates
    List,

    /// Show the waves a template would run in
    Plan {
        template: String,
    },

    /// Instantiate a template and execute it against simulated tools
    Run {
        template: String,

        /// Template parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eva=info,eva_core=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = CliConfig::load(&args.config)?;
    let catalog = WorkflowCatalog::load(&args.catalog)?;

    match args.command {
        Command::List => list(&catalog),
        Command::Plan { template } => plan(&catalog, &template),
        Command::Run { template, params } => {
            run(&catalog, &config, args.event_log, &template, params).await
        }
    }
}

fn list(catalog: &WorkflowCatalog) -> Result<()> {
    for template in catalog.list() {
        println!(
            "{:<24} {:<12} {} ({} steps)",
            template.id,
            template.category,
            template.name,
            template.steps.len()
        );
    }
    Ok(())
}

fn plan(catalog: &WorkflowCatalog, template_id: &str) -> Result<()> {
    let template = catalog
        .get(template_id)
        .with_context(|| format!("Template '{}' not found", template_id))?;
    let skeleton = template.skeleton();
    let dag = WorkflowDag::from_workflow(&skeleton);

    println!("{} ({})", template.name, template.id);
    for (i, wave) in dag.waves().iter().enumerate() {
        let steps: Vec<String> = wave
            .iter()
            .filter_map(|id| skeleton.step(id))
            .map(|s| format!("{} [{}]", s.id, s.tool_id))
            .collect();
        println!("  wave {}: {}", i + 1, steps.join(", "));
    }
    Ok(())
}

async fn run(
    catalog: &WorkflowCatalog,
    config: &CliConfig,
    event_log_path: Option<PathBuf>,
    template_id: &str,
    params: Vec<(String, String)>,
) -> Result<()> {
    let params: HashMap<String, String> = params.into_iter().collect();
    let mut workflow = catalog.instantiate(template_id, &params)?;

    let registry = tools::simulated_registry(catalog.tool_ids(), &config.simulation);
    tracing::info!("Registered {} simulated tools", registry.len());

    let jsonl = match event_log_path {
        Some(path) => Some(Arc::new(JsonlEventLog::new(path)?)),
        None => None,
    };
    let event_log: Arc<dyn EventLog> = match &jsonl {
        Some(log) => log.clone(),
        None => Arc::new(NullEventLog),
    };

    let executor =
        WorkflowExecutor::with_config(Arc::new(registry), event_log, config.executor.clone());
    let result = executor.execute(&mut workflow).await;

    if let Some(log) = &jsonl {
        log.flush().await?;
    }

    print_snapshot(&workflow)?;

    if let Err(e) = result {
        bail!("Workflow '{}' failed: {}", workflow.name, e);
    }
    Ok(())
}

fn print_snapshot(workflow: &Workflow) -> Result<()> {
    let json = serde_json::to_string_pretty(workflow).context("Failed to serialize workflow")?;
    println!("{}", json);
    Ok(())
}

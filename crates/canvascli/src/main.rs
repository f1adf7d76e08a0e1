// crates/canvascli/src/main.rs

use anyhow::{Context, Result};
use canvascore::{ExecutionEvent, Node, NodeEvent, NodeStatus, RunState, Workflow};
use canvasruntime::{
    load_workflow, validate, ExecutorRegistry, RunOutcome, RunReport, RuntimeConfig, Schedule,
    WorkflowRuntime,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "canvas")]
#[command(about = "Canvas workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Delay of simulated nodes in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Prefix used by remote calls with useProxy set
        #[arg(long)]
        proxy_prefix: Option<String>,

        /// Wall-clock limit for each code node in milliseconds
        #[arg(long)]
        script_timeout_ms: Option<u64>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            verbose,
            json,
            delay_ms,
            proxy_prefix,
            script_timeout_ms,
        } => {
            init_logging(verbose);

            let mut config = RuntimeConfig::from_env();
            if let Some(ms) = delay_ms {
                config.simulated_delay = Duration::from_millis(ms);
            }
            if let Some(prefix) = proxy_prefix {
                config.proxy_prefix = prefix;
            }
            if let Some(ms) = script_timeout_ms {
                config.script_timeout = Duration::from_millis(ms);
            }

            let report = run_workflow(file, config, json).await?;
            if !report.is_completed() {
                std::process::exit(1);
            }
        }

        Commands::Validate { file } => {
            init_logging(false);
            if !validate_workflow(file)? {
                std::process::exit(1);
            }
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn create_registry(config: &RuntimeConfig) -> ExecutorRegistry {
    canvasnodes::standard_registry(config)
}

async fn run_workflow(file: PathBuf, config: RuntimeConfig, json: bool) -> Result<RunReport> {
    let workflow = load_workflow(&file)
        .with_context(|| format!("Failed to load workflow from {}", file.display()))?;

    if !json {
        println!("🚀 Loaded workflow from: {}", file.display());
        if let Some(name) = &workflow.name {
            println!("📋 Workflow: {}", name);
        }
        println!("   Nodes: {}", workflow.nodes.len());
        println!("   Edges: {}", workflow.edges.len());
        println!();
    }

    let labels: std::collections::HashMap<String, String> = workflow
        .nodes
        .iter()
        .map(|node| (node.id.clone(), node.display_name().to_string()))
        .collect();

    tracing::debug!(?config, "Runtime configuration");
    let runtime = WorkflowRuntime::new(create_registry(&config), config);
    let mut handle = runtime.spawn(workflow);
    let cancel = handle.cancellation_token();

    // Ctrl-C cancels the run; the event loop below drains until it ends
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(event) = handle.events.recv().await {
        if json {
            continue;
        }
        let name = |id: &str| labels.get(id).cloned().unwrap_or_else(|| id.to_string());
        match event {
            ExecutionEvent::ExecutionStateChanged { state, .. } => match state {
                RunState::Running => println!("▶️  Workflow started"),
                RunState::Idle => println!("⏹  Workflow idle"),
                RunState::Paused => println!("⏸  Workflow paused"),
            },
            ExecutionEvent::NodeStatusChanged {
                node_id, status, ..
            } => match status {
                NodeStatus::Running => println!("  ⚡ Running node: {}", name(&node_id)),
                NodeStatus::Success => println!("  ✅ Node {} succeeded", name(&node_id)),
                NodeStatus::Error => println!("  ❌ Node {} failed", name(&node_id)),
                NodeStatus::Idle => {}
            },
            ExecutionEvent::NodeResult {
                node_id, result, ..
            } => {
                println!("     📤 [{}] {}", name(&node_id), result);
            }
            ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                NodeEvent::Info { message } => {
                    println!("     ℹ️  [{}] {}", name(&node_id), message);
                }
                NodeEvent::Warning { message } => {
                    println!("     ⚠️  [{}] {}", name(&node_id), message);
                }
            },
        }
    }

    let report = handle.join().await.context("Workflow task failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report);
    }

    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!(
        "   Completed: {}/{} nodes",
        report.results.len(),
        report.sequence.len()
    );
    if !report.excluded.is_empty() {
        println!("   Skipped (cycle): {}", report.excluded.join(", "));
    }
    match &report.outcome {
        RunOutcome::Completed => println!("✨ Workflow completed successfully"),
        RunOutcome::Halted { node_id, error } => {
            println!("💥 Halted at node {}: {}", node_id, error)
        }
        RunOutcome::Cancelled => println!("🛑 Workflow cancelled"),
    }

    Ok(report)
}

fn validate_workflow(file: PathBuf) -> Result<bool> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)
        .with_context(|| format!("Failed to load workflow from {}", file.display()))?;
    let registry = create_registry(&RuntimeConfig::default());
    let schedule = Schedule::build(&workflow.nodes, &workflow.edges);
    let issues = validate(&workflow, &registry);

    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!("   Execution order: {}", schedule.sequence.join(" → "));

    if issues.is_empty() {
        println!("✅ Workflow is valid");
        return Ok(true);
    }

    println!("⚠️  Found {} issue(s):", issues.len());
    for issue in &issues {
        println!("   • {}", issue);
    }
    Ok(false)
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = create_registry(&RuntimeConfig::default());

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
    if let Some(metadata) = registry.fallback_metadata() {
        println!("  • any other type");
        println!("    {}", metadata.description);
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Example HTTP Workflow");

    let fetch = workflow.add_node(
        Node::new("1", "http-request")
            .with_label("Fetch Todo")
            .with_data("url", "https://jsonplaceholder.typicode.com/todos/1")
            .with_data("method", "GET"),
    );
    let summarize = workflow.add_node(
        Node::new("2", "code").with_label("Summarize").with_data(
            "code",
            "const todo = $node[\"Fetch Todo\"].data;\nreturn { title: todo.title, done: todo.completed };",
        ),
    );
    let notify = workflow.add_node(Node::new("3", "webhook").with_label("Notify"));

    workflow.connect(fetch.clone(), summarize.clone());
    workflow.connect(summarize, notify);

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  canvas run --file {}", output.display());

    Ok(())
}

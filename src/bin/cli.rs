use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use replay_actions::engine::BatchResult;
use replay_actions::io::{read_rows, write_csv_report, write_json_report};
use replay_actions::workflow::{RowContext, RunnerConfig, WorkflowDefinition, WorkflowLoader};
use replay_actions::{PlaywrightFactory, RowDriver};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replay-actions")]
#[command(about = "Replay recorded browser workflows once per CSV row", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow for every row of a CSV file
    Run {
        /// Input rows (header line = column names)
        #[arg(value_name = "CSV")]
        csv: PathBuf,

        /// Workflow definition (JSON)
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,

        /// Path to runner.yaml config file (default: ./runner.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rows in flight at once; above 1 switches to concurrent mode
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Report file prefix (overrides config)
        #[arg(short, long)]
        output: Option<String>,

        /// Also write a JSON report
        #[arg(long)]
        json: bool,

        /// Attach to a running browser instead of launching one
        #[arg(long, value_name = "URL")]
        cdp_endpoint: Option<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Check a workflow definition without running it
    Validate {
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,
    },

    /// Print every step, resolved against the first CSV row
    Show {
        #[arg(value_name = "WORKFLOW")]
        workflow: PathBuf,

        /// Rows to resolve templates against
        #[arg(long, value_name = "CSV")]
        csv: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "replay_actions=debug"
    } else {
        "replay_actions=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            csv,
            workflow,
            config,
            batch_size,
            output,
            json,
            cdp_endpoint,
            headed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(size) = batch_size {
                config = config.with_batch_size(size);
            }
            if let Some(prefix) = output {
                config.output.prefix = prefix;
            }
            if json {
                config.output.json = true;
            }
            if cdp_endpoint.is_some() {
                config.driver.cdp_endpoint = cdp_endpoint;
            }
            if headed {
                config.driver.headless = false;
            }
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

            run_rows(&csv, &workflow, config).await
        }
        Commands::Validate { workflow } => validate(&workflow),
        Commands::Show { workflow, csv } => show(&workflow, csv.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RunnerConfig> {
    match path {
        Some(path) => {
            println!("Using config: {}", path.display());
            Ok(RunnerConfig::load(path)?)
        }
        None => {
            let default = Path::new("runner.yaml");
            if default.exists() {
                println!("Using config: {}", default.display());
                Ok(RunnerConfig::load(default)?)
            } else {
                Ok(RunnerConfig::default())
            }
        }
    }
}

async fn run_rows(csv: &Path, workflow_path: &Path, config: RunnerConfig) -> anyhow::Result<bool> {
    let workflow = WorkflowLoader::load_file(workflow_path)?;
    let rows = read_rows(csv)?;

    println!(
        "Running '{}' ({} steps) for {} rows from {}\n",
        workflow.name,
        workflow.steps.len(),
        rows.len(),
        csv.display()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing rows in flight");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let factory =
        Arc::new(PlaywrightFactory::launch(&config.driver, config.timeouts.action()).await?);

    let batch = RowDriver::from_config(workflow, factory.clone(), &config)
        .with_shutdown(shutdown)
        .run(rows)
        .await;

    if let Err(e) = factory.shutdown().await {
        tracing::warn!("Failed to close browser: {}", e);
    }
    let batch = batch?;

    let report = write_csv_report(&batch.rows, &config.output.prefix)?;
    println!("Report: {}", report.display());
    if config.output.json {
        let report = write_json_report(&batch, &config.output.prefix)?;
        println!("JSON report: {}", report.display());
    }

    print_batch_result(&batch);
    Ok(batch.is_success())
}

fn validate(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    let workflow = WorkflowLoader::load_file(path)?;
    let issues = workflow.validate();

    if issues.is_empty() {
        println!(
            "✓ {} is valid ({} steps, {} conditional)",
            path.display(),
            workflow.steps.len(),
            workflow.conditional_count()
        );
        return Ok(true);
    }

    for issue in &issues {
        println!("✗ {}", issue);
    }
    Ok(false)
}

fn show(path: &Path, csv: Option<&Path>) -> anyhow::Result<bool> {
    let workflow = WorkflowLoader::load_file(path)?;
    let ctx = match csv {
        Some(csv) => read_rows(csv)?.into_iter().next().unwrap_or_default(),
        None => RowContext::new(),
    };
    print_workflow(&workflow, &ctx);
    Ok(true)
}

fn print_workflow(workflow: &WorkflowDefinition, ctx: &RowContext) {
    println!("Workflow: {}", workflow.name);
    if let Some(desc) = &workflow.description {
        println!("  {}", desc);
    }
    println!();

    for (i, step) in workflow.steps.iter().enumerate() {
        println!("{:>3}. {}", i + 1, step.preview(ctx));
        if !step.description().is_empty() {
            println!("       # {}", step.description());
        }
    }
}

fn print_batch_result(batch: &BatchResult) {
    println!("\n=== Batch Result ===\n");
    println!("Workflow: {}", batch.workflow_name);
    println!("Run ID: {}", batch.run_id);
    println!(
        "Rows: {} total, {} successful, {} errors\n",
        batch.rows.len(),
        batch.success_count(),
        batch.error_count()
    );

    for row in &batch.rows {
        let status = if row.is_success() { "✓" } else { "✗" };
        println!("{} Row {}: {}", status, row.row_index + 1, row.summary());
        for outcome in row.step_outcomes.iter().filter(|o| !o.succeeded) {
            println!(
                "    ✗ Step {}: {}",
                outcome.step_index + 1,
                outcome.error_message.as_deref().unwrap_or("")
            );
        }
    }
}

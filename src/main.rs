//! Orchestrator CLI Entry Point
//!
//! Loads a workflow configuration, compiles every workflow, and executes one
//! request. The response is written to stdout as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow with a JSON payload
//! orchestrator workflows.yaml --workflow subject-matching --input '{"subjectId": 42}'
//!
//! # List the workflows a configuration declares
//! orchestrator workflows.yaml --list
//!
//! # Allow up to 8 parallel steps per run
//! orchestrator workflows.yaml --workflow subject-matching --parallel 8
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use orchestrator::dispatch::{Dispatcher, WorkflowRequest};
use orchestrator::execution::Engine;
use orchestrator::registry::{ProcessorRegistry, StepRegistry};
use orchestrator::remote::{HttpTransport, Protocol, RemoteTransport, TransportRegistry};
use orchestrator::workflow::load_config;
use orchestrator::{APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "orchestrator", version)]
#[command(about = "Execute sequential, parallel and composite workflows", long_about = None)]
struct Cli {
    /// Path to the workflow configuration (YAML or JSON)
    config: PathBuf,

    /// ID of the workflow to execute
    #[arg(short, long, required_unless_present = "list")]
    workflow: Option<String>,

    /// Request payload as JSON
    #[arg(short, long, default_value = "null")]
    input: String,

    /// Maximum parallel steps per run (overrides the config file)
    #[arg(short, long)]
    parallel: Option<usize>,

    /// List registered workflows and exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    info!("{} v{}", APP_NAME, VERSION);

    let config = load_config(&cli.config)?;
    let settings = &config.settings;

    let http: Arc<dyn RemoteTransport> = Arc::new(HttpTransport::new(Duration::from_secs(
        settings.http_timeout_seconds,
    ))?);
    let transports = TransportRegistry::new().with(Protocol::Http, http);

    let steps = StepRegistry::new(ProcessorRegistry::with_builtins(), transports)
        .with_default_timeout(settings.default_timeout_seconds);

    let engine = match cli.parallel.or(settings.max_parallel) {
        Some(max_parallel) => Engine::with_max_parallel(max_parallel),
        None => Engine::new(),
    };
    info!("Max parallel steps: {}", engine.max_parallel());

    let dispatcher = Dispatcher::from_config(&config, &steps, engine)?;

    if cli.list {
        for id in dispatcher.list_workflows() {
            println!("{}", id);
        }
        return Ok(true);
    }

    let workflow_id = cli.workflow.ok_or("--workflow is required")?;
    let input_data: Value = serde_json::from_str(&cli.input)
        .map_err(|e| format!("Invalid --input JSON: {}", e))?;

    let response = dispatcher.execute(&WorkflowRequest::new(workflow_id, input_data));
    println!("{}", serde_json::to_string_pretty(&response)?);

    let status = response.status.to_string();
    if response.is_success() {
        eprintln!("{} {}", "✓".green(), status.green().bold());
    } else {
        eprintln!("{} {}", "✗".red(), status.red().bold());
        if let Some(message) = response.error() {
            error!("{}", message);
        }
    }

    Ok(response.is_success())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use orion_error::ErrorCode;

use flow_config::FlowConfig;
use flow_core::atom::Services;
use flow_core::ext::{Ed25519Signer, NullStorage, SystemClock};
use flow_core::registry::AtomRegistry;
use flow_runtime::coordinator::{wait_for_signal, Coordinator};
use flow_runtime::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "flowctl", about = "Signal-driven workflow runtime launcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a workflow until cancelled.
    Run {
        /// Path to the workflow definition JSON file.
        #[arg(long)]
        workflow: PathBuf,
        /// Path to a signed license token JSON file. Omit to run free-tier.
        #[arg(long)]
        license: Option<PathBuf>,
        /// Path to the runtime TOML config.
        #[arg(long)]
        config: PathBuf,
        /// Identifier recorded on every emitted signal. Defaults to a
        /// timestamp-derived value.
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let Commands::Run { workflow, license, config, run_id } = cli.command;

    match run(workflow, license, config, run_id).await {
        Ok(()) => std::process::exit(0),
        Err(CliError::Bootstrap(e)) => {
            eprintln!("error: {e}");
            std::process::exit(4);
        }
        Err(CliError::Runtime(err)) => {
            eprintln!("error: {err}");
            std::process::exit(exit_code_for(err.error_code()));
        }
    }
}

enum CliError {
    /// Failures before the coordinator exists: bad paths, unreadable
    /// config, malformed TOML/JSON.
    Bootstrap(anyhow::Error),
    Runtime(flow_runtime::error::RuntimeError),
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        Self::Bootstrap(e)
    }
}

/// Maps the runtime's stable error codes (`flow-core`/`flow-runtime`'s
/// `error.rs`) onto process exit codes: 1 validation failure, 2 license
/// invalid, 3 throttled exit, 4 everything else.
fn exit_code_for(code: i32) -> i32 {
    match code {
        1001 | 1002 => 1,
        1003 | 1004 => 2,
        1005 => 3,
        _ => 4,
    }
}

async fn run(
    workflow_path: PathBuf,
    license_path: Option<PathBuf>,
    config_path: PathBuf,
    run_id: Option<String>,
) -> Result<(), CliError> {
    let config_path = config_path
        .canonicalize()
        .with_context(|| format!("config path '{}'", config_path.display()))?;
    let config = FlowConfig::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .expect("config path must have a parent directory");

    let _tracing_guard = init_tracing(&config.logging, base_dir)?;

    let workflow_json = std::fs::read_to_string(&workflow_path)
        .with_context(|| format!("reading workflow '{}'", workflow_path.display()))?;
    let license_json = license_path
        .as_ref()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("reading license '{}'", p.display())))
        .transpose()?;

    let mut registry = AtomRegistry::new();
    flow_core::register_builtin_atoms(&mut registry).context("registering built-in atoms")?;

    let services = Arc::new(Services {
        clock: Arc::new(SystemClock),
        storage: Some(Arc::new(NullStorage)),
        llm: None,
    });

    let run_id = run_id.unwrap_or_else(|| {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("run-{millis}")
    });

    let coordinator = Coordinator::start(
        run_id,
        &workflow_json,
        license_json.as_deref(),
        Arc::new(registry),
        services,
        Arc::new(Ed25519Signer),
        config,
    )
    .await
    .map_err(CliError::Runtime)?;

    tracing::info!("workflow running, press ctrl-c to stop");
    wait_for_signal(coordinator.cancel_token()).await;
    coordinator.shutdown();
    coordinator.wait().await.map_err(CliError::Runtime)?;

    Ok(())
}

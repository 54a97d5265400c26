//! pve-ontap-snapshot
//!
//! ONTAP volume snapshots, FlexClone mounts and disk object clones for
//! Proxmox VE storage pools. One invocation runs one command and exits.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pve_ontap_snapshot::cli::{self, Args};
use pve_ontap_snapshot::{BackendFactory, Config, Orchestrator, ProxmoxClient, Result};

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse_from(cli::normalize_args(std::env::args()));

    init_logging(&args);
    debug!(version = pve_ontap_snapshot::VERSION, config = %args.config.display(), "starting");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, code = err.exit_code(), "command failed");
            ExitCode::from(&err)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Arc::new(Config::load(&args.config)?);

    let manager = ProxmoxClient::connect(&config.proxmox).await?;
    let orchestrator = Orchestrator::new(
        Arc::new(manager),
        Arc::new(BackendFactory::new(config.clone())),
    );

    let outcome = args.command.execute(&orchestrator, cli::terminal_confirm).await?;
    println!("{}", outcome.render(args.output)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

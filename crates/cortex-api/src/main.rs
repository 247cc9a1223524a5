//! Cortex CLI entry point.
//!
//! Binary name: `cortex`
//!
//! Parses CLI arguments, initializes tracing, the database and services, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use cortex_infra::filesystem::resolve_data_dir;
use cortex_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,cortex=debug",
        _ => "trace",
    };
    init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "cortex", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli.data_dir.unwrap_or_else(resolve_data_dir);
    let state = AppState::init(data_dir).await?;
    let json = cli.json;

    match cli.command {
        Commands::Identity { action } => {
            cli::identity::handle_identity_command(action, &state, json).await
        }
        Commands::Memory { action } => cli::memory::handle_memory_command(action, &state, json).await,
        Commands::Failure { action } => {
            cli::failure::handle_failure_command(action, &state, json).await
        }
        Commands::Prepare(args) => cli::prepare::prepare(&state, args, json).await,
        Commands::Maintain => cli::memory::maintain(&state, json).await,
        Commands::Status => cli::status::status(&state, json).await,
        Commands::Completions { .. } => Ok(()),
    }
}

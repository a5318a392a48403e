//! Recall CLI entry point.
//!
//! Binary name: `recall`
//!
//! Parses CLI arguments, opens the memory service on the data directory,
//! dispatches to the command handler, then drains background work and
//! flushes the store before exiting.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = log_filter(cli.verbose, cli.quiet);
    if let Err(e) = recall_observe::tracing_setup::init_tracing(filter, cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "recall", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.data_dir.clone()).await?;
    let outcome = run(&state, cli).await;

    // Always flush, even when the command failed part way.
    let flushed = state.shutdown().await;
    recall_observe::tracing_setup::shutdown_tracing();

    outcome?;
    flushed
}

/// Default tracing directive for the given verbosity flags.
fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,recall=debug",
        _ => "trace",
    }
}

async fn run(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Record {
            user,
            prompt,
            response,
            username,
        } => {
            cli::memory::record(
                state,
                &user,
                prompt,
                response,
                username.as_deref(),
                cli.json,
            )
            .await
        }
        Commands::Summary { user } => cli::memory::summary(state, &user, cli.json).await,
        Commands::Context { user } => cli::memory::context(state, &user, cli.json).await,
        Commands::Forget { user, force } => {
            cli::memory::forget(state, &user, force, cli.json).await
        }
        Commands::Export { user, output } => {
            cli::transfer::export_user(state, &user, output.as_deref()).await
        }
        Commands::Import { user, file } => {
            cli::transfer::import_user(state, &user, &file, cli.json).await
        }
        Commands::ExportAll { caller, output } => {
            cli::transfer::export_all(state, &caller, output.as_deref()).await
        }
        Commands::ImportAll { caller, file } => {
            cli::transfer::import_all(state, &caller, &file, cli.json).await
        }
        Commands::Prune => cli::memory::prune(state, cli.json).await,
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_follows_flags() {
        assert_eq!(log_filter(0, true), "error");
        assert_eq!(log_filter(0, false), "warn");
        assert_eq!(log_filter(1, false), "info,recall=debug");
        assert_eq!(log_filter(3, false), "trace");
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["recall", "--quiet", "-v", "prune"]).is_err());
        let cli = Cli::try_parse_from(["recall", "--quiet", "prune"]).unwrap();
        assert!(cli.quiet);
    }
}

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod chat;
mod cli;
mod config;
mod edit;
mod run_log;
mod tools;
mod transcript;
mod util;
mod workflow;

use cli::EditArgs;
use workflow::RunResult;

fn main() -> Result<()> {
    let args = EditArgs::parse();
    init_tracing(args.verbose);

    match workflow::run_edit(&args)? {
        RunResult::Written { kind, path } => {
            tracing::debug!(%kind, path = %path.display(), "run complete");
        }
        RunResult::DryRun { kind } => tracing::debug!(%kind, "dry run complete"),
        RunResult::NoChange => tracing::debug!("run complete without changes"),
        RunResult::Failed => tracing::debug!("run complete after a failed request"),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "codemend=debug"
    } else {
        "codemend=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

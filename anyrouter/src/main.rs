use clap::Parser;
use std::process::ExitCode;

use anyrouter::cli::Cli;
use anyrouter::{commands, logging, AppContext};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::load(&cli.command)?;
    let (log_path, _guard) = logging::init_logging(&ctx.paths.logs_dir(), &cli.log_level)?;
    tracing::debug!(log_file = %log_path.display(), "Logging initialized");

    commands::execute(cli.command, &ctx).await
}

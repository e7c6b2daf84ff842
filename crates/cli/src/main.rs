use anyhow::Result;
use clap::Parser;

use reviews_loader::cli::{Cli, Commands};
use reviews_loader::commands::{run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let format: observability::LogFormat = cli.log_format.into();
    let level = cli.log_level();

    match &cli.command {
        None => run_pipeline(&cli.run, format, level).await,
        Some(Commands::Run(args)) => run_pipeline(args, format, level).await,
        Some(Commands::Validate(args)) => {
            observability::init_console(format, level)?;
            run_validate(args)
        }
        Some(Commands::Info(args)) => {
            observability::init_console(format, level)?;
            run_info(args)
        }
    }
}

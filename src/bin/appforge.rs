use anyhow::Result;
use appforge::cli::{run_build, run_toolchains, Cli, Command};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let exit_code = match cli.command {
        Command::Build(args) => run_build(args).await?,
        Command::Toolchains(args) => run_toolchains(args).await?,
    };
    std::process::exit(exit_code);
}

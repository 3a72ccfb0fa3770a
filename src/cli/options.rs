use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "appforge")]
#[command(about = "Synthesize and build native Android/iOS projects from compiled app payloads")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Synthesize the native project and drive the platform toolchain
    Build(BuildArgs),
    /// Probe the installed platform toolchains and report their versions
    Toolchains(ToolchainArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Application payload archive (compiled classes, resources, libraries)
    pub payload: PathBuf,

    /// Build settings properties file (key=value lines)
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// What to produce: apk, aab, android-source, ipa, or ios-source
    #[arg(short, long, default_value = "apk")]
    pub target: String,

    /// Directory for the generated project and intermediate state
    #[arg(short, long, default_value = "target/appforge")]
    pub build_dir: PathBuf,

    /// Extra settings as key=value, overriding the settings file
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ToolchainArgs {
    /// Only probe one platform: android or ios
    #[arg(long)]
    pub platform: Option<String>,
}

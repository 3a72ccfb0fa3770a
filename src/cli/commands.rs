use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use crate::config::BuildConfig;
use crate::driver::BuildDriver;
use crate::exec::{BuildLog, CancelFlag, Orchestrator};
use crate::synth::BuildTarget;

use super::options::{BuildArgs, ToolchainArgs};
use super::output::print_outcome;

/// Runs a full build and returns the process exit code.
pub async fn run_build(args: BuildArgs) -> Result<i32> {
    let mut config = match &args.settings {
        Some(path) => BuildConfig::from_properties_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => BuildConfig::new(),
    };
    for entry in &args.overrides {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("override {entry} is not KEY=VALUE"))?;
        config.put(key.trim(), value.trim());
    }

    let target = BuildTarget::parse(&args.target)
        .ok_or_else(|| anyhow!("unknown build target {}", args.target))?;
    if !args.payload.exists() {
        bail!("payload archive {} does not exist", args.payload.display());
    }
    std::fs::create_dir_all(&args.build_dir)
        .with_context(|| format!("creating build dir {}", args.build_dir.display()))?;

    let driver = BuildDriver::new(config, target);
    let outcome = driver.run(&args.payload, &args.build_dir).await;
    print_outcome(&outcome, args.json)?;
    Ok(if outcome.succeeded() { 0 } else { 1 })
}

/// Probes the installed toolchains and prints a short report, without
/// requiring a payload.
pub async fn run_toolchains(args: ToolchainArgs) -> Result<i32> {
    let orchestrator = Orchestrator::new(BuildLog::new(), CancelFlag::new());
    let cwd = std::env::current_dir().context("resolving working directory")?;
    let platform = args.platform.as_deref();

    if platform.is_none() || platform == Some("android") {
        report_probe(
            &orchestrator,
            &cwd,
            "Gradle",
            &["gradle".to_string(), "--version".to_string()],
            |out| {
                crate::synth::android::toolchain::parse_gradle_version(out)
                    .map(|v| v.to_string())
            },
        )
        .await;
        match std::env::var("ANDROID_HOME") {
            Ok(sdk) => println!("Android SDK: {sdk}"),
            Err(_) => println!("Android SDK: ANDROID_HOME not set"),
        }
    }
    if platform.is_none() || platform == Some("ios") {
        report_probe(
            &orchestrator,
            &cwd,
            "Xcode",
            &["xcodebuild".to_string(), "-version".to_string()],
            |out| crate::synth::ios::toolchain::parse_xcode_version(out).map(|v| v.to_string()),
        )
        .await;
        report_probe(
            &orchestrator,
            &cwd,
            "CocoaPods",
            &["pod".to_string(), "--version".to_string()],
            |out| Some(out.trim().to_string()),
        )
        .await;
    }
    Ok(0)
}

async fn report_probe(
    orchestrator: &Orchestrator,
    cwd: &Path,
    tool: &str,
    argv: &[String],
    parse: impl Fn(&str) -> Option<String>,
) {
    match orchestrator
        .run_capturing_output(cwd, &HashMap::new(), argv, None)
        .await
    {
        Ok(output) => match parse(&output) {
            Some(version) => println!("{tool}: {version}"),
            None => println!("{tool}: installed, version not recognized"),
        },
        Err(err) => {
            info!("{tool} probe failed: {err}");
            println!("{tool}: not found");
        }
    }
}

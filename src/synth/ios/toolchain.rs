use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::exec::Orchestrator;
use crate::synth::SynthError;
use crate::version::DottedVersion;

/// Oldest Xcode major version whose project format we emit.
pub const MIN_XCODE_MAJOR: u64 = 11;

static XCODE_VERSION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Xcode\s+(\S+)").expect("static regex"));

#[derive(Debug, Clone)]
pub struct IosToolchain {
    pub xcode_version: DottedVersion,
    pub pods_version: Option<DottedVersion>,
}

/// Probes Xcode and, when pods are requested, CocoaPods. There is no
/// managed-download remediation on this platform: Xcode cannot be fetched
/// by a build tool, so a version below the floor fails immediately with
/// install guidance.
pub async fn discover(
    orchestrator: &Orchestrator,
    need_pods: bool,
    working_dir: &Path,
) -> Result<IosToolchain, SynthError> {
    let xcode_output = orchestrator
        .run_capturing_output(
            working_dir,
            &HashMap::new(),
            &["xcodebuild".to_string(), "-version".to_string()],
            None,
        )
        .await
        .map_err(|err| SynthError::ToolchainMissing {
            tool: "xcodebuild".to_string(),
            guidance: format!(
                "Install Xcode and its command line tools (xcode-select --install). Probe error: {err}"
            ),
        })?;
    let xcode_version = parse_xcode_version(&xcode_output).ok_or_else(|| {
        SynthError::ToolchainMissing {
            tool: "xcodebuild".to_string(),
            guidance: "xcodebuild -version produced no recognizable version line.".to_string(),
        }
    })?;
    if xcode_version.major() < MIN_XCODE_MAJOR {
        return Err(SynthError::ToolchainVersion {
            tool: "Xcode".to_string(),
            found: xcode_version.to_string(),
            required: MIN_XCODE_MAJOR.to_string(),
        });
    }
    info!("Using Xcode {xcode_version}");

    let pods_version = if need_pods {
        let output = orchestrator
            .run_capturing_output(
                working_dir,
                &HashMap::new(),
                &["pod".to_string(), "--version".to_string()],
                None,
            )
            .await
            .map_err(|err| SynthError::ToolchainMissing {
                tool: "CocoaPods".to_string(),
                guidance: format!(
                    "Install CocoaPods to build projects with pod dependencies, \
                     e.g. 'sudo gem install cocoapods'. Probe error: {err}"
                ),
            })?;
        let version = DottedVersion::parse(output.trim());
        debug!("Found CocoaPods {version}");
        Some(version)
    } else {
        None
    };

    Ok(IosToolchain {
        xcode_version,
        pods_version,
    })
}

pub(crate) fn parse_xcode_version(output: &str) -> Option<DottedVersion> {
    XCODE_VERSION_LINE
        .captures(output)
        .map(|captures| DottedVersion::parse(&captures[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xcodebuild_output() {
        let output = "Xcode 14.3.1\nBuild version 14E300c\n";
        assert_eq!(parse_xcode_version(output).unwrap().major(), 14);
    }

    #[test]
    fn rejects_unrelated_output() {
        assert!(parse_xcode_version("xcode-select: error").is_none());
    }
}

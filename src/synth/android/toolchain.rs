use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::exec::Orchestrator;
use crate::synth::SynthError;
use crate::version::DottedVersion;

/// Oldest Gradle major version the generated project builds with.
pub const MIN_GRADLE_MAJOR: u64 = 6;

/// Distribution installed into the managed home when nothing usable is
/// found. Overridable through `android.gradleDistributionUrl`.
pub const GRADLE_DISTRIBUTION_URL: &str =
    "https://services.gradle.org/distributions/gradle-6.8.3-bin.zip";

static GRADLE_VERSION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Gradle\s+(\S+)").expect("static regex"));

#[derive(Debug, Clone)]
pub struct AndroidToolchain {
    pub sdk_dir: PathBuf,
    pub gradle_exe: PathBuf,
    pub gradle_version: DottedVersion,
}

/// Where to look for the SDK and Gradle. Configuration overrides beat
/// environment variables, which beat the managed install and PATH.
#[derive(Debug, Clone)]
pub struct ToolchainSearch {
    pub sdk_override: Option<PathBuf>,
    pub gradle_override: Option<PathBuf>,
    pub managed_home: PathBuf,
    pub distribution_url: String,
}

impl ToolchainSearch {
    pub fn from_config(config: &BuildConfig) -> Result<Self, SynthError> {
        let managed_home = dirs::home_dir()
            .map(|home| home.join(".appforge").join("gradle"))
            .ok_or_else(|| SynthError::ToolchainMissing {
                tool: "gradle".to_string(),
                guidance: "Cannot determine a home directory for the managed Gradle install."
                    .to_string(),
            })?;
        Ok(Self {
            sdk_override: config.get_opt("android.sdkPath").map(PathBuf::from),
            gradle_override: config.get_opt("android.gradlePath").map(PathBuf::from),
            managed_home,
            distribution_url: config.get(
                "android.gradleDistributionUrl",
                GRADLE_DISTRIBUTION_URL,
            ),
        })
    }
}

/// Locates the Android SDK and a Gradle new enough to build the generated
/// project. When the best available Gradle is below the floor, exactly one
/// remediation is attempted: install the pinned distribution into the
/// managed home and re-probe.
pub async fn discover(
    orchestrator: &Orchestrator,
    search: &ToolchainSearch,
    working_dir: &Path,
) -> Result<AndroidToolchain, SynthError> {
    let sdk_dir = locate_sdk(search)?;
    info!("Using Android SDK at {}", sdk_dir.display());

    let mut gradle_exe = locate_gradle(search);
    let mut version = probe_gradle_version(orchestrator, &gradle_exe, working_dir).await;
    debug!("Found Gradle {version} at {}", gradle_exe.display());

    if version.major() < MIN_GRADLE_MAJOR {
        // A previously managed install may still beat whatever PATH offered.
        let managed_exe = gradle_executable(&search.managed_home);
        if managed_exe != gradle_exe && managed_exe.exists() {
            gradle_exe = managed_exe;
            version = probe_gradle_version(orchestrator, &gradle_exe, working_dir).await;
        }
    }

    if version.major() < MIN_GRADLE_MAJOR {
        warn!(
            "Gradle {version} is below the required major {MIN_GRADLE_MAJOR}, \
             installing managed distribution"
        );
        orchestrator.log().append(&format!(
            "Downloading Gradle distribution from {}",
            search.distribution_url
        ));
        install_managed_gradle(&search.distribution_url, &search.managed_home).await?;

        gradle_exe = gradle_executable(&search.managed_home);
        version = probe_gradle_version(orchestrator, &gradle_exe, working_dir).await;
        if version.major() < MIN_GRADLE_MAJOR {
            return Err(SynthError::ToolchainVersion {
                tool: "gradle".to_string(),
                found: version.to_string(),
                required: MIN_GRADLE_MAJOR.to_string(),
            });
        }
    }

    Ok(AndroidToolchain {
        sdk_dir,
        gradle_exe,
        gradle_version: version,
    })
}

fn locate_sdk(search: &ToolchainSearch) -> Result<PathBuf, SynthError> {
    let sdk = search
        .sdk_override
        .clone()
        .or_else(|| std::env::var_os("ANDROID_HOME").map(PathBuf::from))
        .or_else(default_sdk_path);
    match sdk {
        Some(dir) if dir.exists() => Ok(dir),
        Some(dir) => Err(SynthError::ToolchainMissing {
            tool: "Android SDK".to_string(),
            guidance: format!(
                "No SDK at {}. Install Android Studio or point ANDROID_HOME at your SDK directory.",
                dir.display()
            ),
        }),
        None => Err(SynthError::ToolchainMissing {
            tool: "Android SDK".to_string(),
            guidance: "Set the ANDROID_HOME environment variable.".to_string(),
        }),
    }
}

fn default_sdk_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    let path = if cfg!(target_os = "macos") {
        home.join("Library").join("Android").join("sdk")
    } else if cfg!(windows) {
        home.join("AppData").join("Local").join("Android").join("sdk")
    } else {
        home.join("Android").join("Sdk")
    };
    Some(path)
}

fn gradle_executable(gradle_home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "gradle.bat" } else { "gradle" };
    gradle_home.join("bin").join(name)
}

fn locate_gradle(search: &ToolchainSearch) -> PathBuf {
    if let Some(exe) = &search.gradle_override {
        return exe.clone();
    }
    if let Some(exe) = std::env::var_os("GRADLE_PATH") {
        return PathBuf::from(exe);
    }
    if let Some(home) = std::env::var_os("GRADLE_HOME") {
        return gradle_executable(Path::new(&home));
    }
    if search.managed_home.exists() {
        return gradle_executable(&search.managed_home);
    }
    which::which("gradle").unwrap_or_else(|_| PathBuf::from("gradle"))
}

/// Probes `gradle --version` and parses the version line. Any probe failure
/// reads as version zero, which routes into the remediation path.
async fn probe_gradle_version(
    orchestrator: &Orchestrator,
    gradle_exe: &Path,
    working_dir: &Path,
) -> DottedVersion {
    let argv = vec![gradle_exe.display().to_string(), "--version".to_string()];
    match orchestrator
        .run_capturing_output(working_dir, &HashMap::new(), &argv, None)
        .await
    {
        Ok(output) => parse_gradle_version(&output).unwrap_or_else(|| DottedVersion::parse("0")),
        Err(err) => {
            debug!("Gradle probe failed: {err}");
            DottedVersion::parse("0")
        }
    }
}

pub(crate) fn parse_gradle_version(output: &str) -> Option<DottedVersion> {
    GRADLE_VERSION_LINE
        .captures(output)
        .map(|captures| DottedVersion::parse(&captures[1]))
}

/// Downloads and extracts the distribution, then atomically moves it into
/// the managed home. A concurrent build winning the final rename is fine;
/// the loser just uses the install that appeared.
async fn install_managed_gradle(url: &str, managed_home: &Path) -> Result<(), SynthError> {
    let url = url.to_string();
    let managed_home = managed_home.to_path_buf();
    tokio::task::spawn_blocking(move || install_managed_gradle_blocking(&url, &managed_home))
        .await
        .map_err(|e| SynthError::RemediationFailed {
            tool: "gradle".to_string(),
            reason: format!("installer task failed: {e}"),
        })?
}

fn install_managed_gradle_blocking(url: &str, managed_home: &Path) -> Result<(), SynthError> {
    let remediation = |reason: String| SynthError::RemediationFailed {
        tool: "gradle".to_string(),
        reason,
    };

    let parent = managed_home
        .parent()
        .ok_or_else(|| remediation("managed home has no parent directory".to_string()))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| remediation(format!("cannot create {}: {e}", parent.display())))?;

    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| remediation(format!("download from {url} failed: {e}")))?;
    let bytes = response
        .bytes()
        .map_err(|e| remediation(format!("download from {url} failed: {e}")))?;

    let mut archive_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| remediation(format!("cannot stage download: {e}")))?;
    archive_file
        .write_all(&bytes)
        .map_err(|e| remediation(format!("cannot stage download: {e}")))?;

    let extract_dir = tempfile::tempdir_in(parent)
        .map_err(|e| remediation(format!("cannot stage extraction: {e}")))?;
    let reopened = archive_file
        .reopen()
        .map_err(|e| remediation(format!("cannot reopen staged download: {e}")))?;
    let mut archive = zip::ZipArchive::new(reopened)
        .map_err(|e| remediation(format!("distribution is not a readable archive: {e}")))?;
    archive
        .extract(extract_dir.path())
        .map_err(|e| remediation(format!("extraction failed: {e}")))?;

    // The distribution zip wraps everything in a gradle-<version> directory.
    let extracted_root = std::fs::read_dir(extract_dir.path())
        .map_err(|e| remediation(format!("cannot inspect extraction: {e}")))?
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_name().to_string_lossy().starts_with("gradle") && entry.path().is_dir()
        })
        .ok_or_else(|| remediation("no gradle directory inside the distribution".to_string()))?;

    match std::fs::rename(extracted_root.path(), managed_home) {
        Ok(()) => {}
        Err(_) if managed_home.exists() => {
            // Another build installed it first.
            debug!("Managed Gradle already present, keeping the existing install");
        }
        Err(e) => {
            return Err(remediation(format!(
                "cannot move distribution into {}: {e}",
                managed_home.display()
            )))
        }
    }

    if !gradle_executable(managed_home).exists() {
        return Err(remediation(format!(
            "no gradle executable under {} after install",
            managed_home.display()
        )));
    }
    Ok(())
}

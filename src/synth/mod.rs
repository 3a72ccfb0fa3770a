//! Platform project synthesis: turning the unpacked payload, the derived
//! capability flags, and the build configuration into a native project tree
//! and driving it to an installable artifact.

pub mod android;
pub mod ios;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::BuildConfig;
use crate::exec::{ExecError, Orchestrator};
use crate::payload::NativeAppPayload;
use crate::remap::RemapError;
use crate::scan::{CapabilityFlags, NativeInterfaceDesc};

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Conflicting build options {first} and {second}: {reason}")]
    ConflictingOptions {
        first: String,
        second: String,
        reason: String,
    },

    #[error("Required toolchain missing: {tool}. {guidance}")]
    ToolchainMissing { tool: String, guidance: String },

    #[error("{tool} version {found} is below the required {required}")]
    ToolchainVersion {
        tool: String,
        found: String,
        required: String,
    },

    #[error("Toolchain remediation failed for {tool}: {reason}")]
    RemediationFailed { tool: String, reason: String },

    #[error("{tool} failed with exit code {exit_code}")]
    ToolFailure {
        tool: String,
        exit_code: i32,
        output: String,
    },

    #[error("{tool} timed out")]
    StepTimeout { tool: String },

    #[error("Expected build artifact not found at {0}")]
    ArtifactNotFound(String),

    #[error("Template definition error: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    #[error("Template rendering error: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Remap(#[from] RemapError),
}

/// What the build should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    AndroidApk,
    AndroidAab,
    AndroidSource,
    IosIpa,
    IosSource,
}

impl BuildTarget {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "apk" => Some(Self::AndroidApk),
            "aab" => Some(Self::AndroidAab),
            "android-source" => Some(Self::AndroidSource),
            "ipa" => Some(Self::IosIpa),
            "ios-source" => Some(Self::IosSource),
            _ => None,
        }
    }

    /// Export targets stop after rendering and hand back the project tree.
    pub fn is_export(&self) -> bool {
        matches!(self, Self::AndroidSource | Self::IosSource)
    }

    pub fn is_android(&self) -> bool {
        matches!(
            self,
            Self::AndroidApk | Self::AndroidAab | Self::AndroidSource
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    AndroidPackage,
    AndroidBundle,
    IosPackage,
    ProjectTree,
}

#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Identity of the application being built, resolved once from
/// configuration before synthesis starts.
#[derive(Debug, Clone)]
pub struct AppMetadata {
    pub main_class: String,
    pub package_name: String,
    pub display_name: String,
    pub version: String,
    pub build_id: String,
}

impl AppMetadata {
    pub fn from_config(config: &BuildConfig) -> Result<Self, SynthError> {
        let main_class = config
            .get_opt("app.mainClass")
            .ok_or_else(|| SynthError::MissingInput("app.mainClass".to_string()))?;
        let package_name = config
            .get_opt("app.packageName")
            .ok_or_else(|| SynthError::MissingInput("app.packageName".to_string()))?;
        let display_name = config.get("app.displayName", &simple_name(&main_class));
        let version = config.get("app.version", "1.0");
        Ok(Self {
            main_class,
            package_name,
            display_name,
            version,
            build_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Simple (unqualified) name of the main class.
    pub fn simple_name(&self) -> String {
        simple_name(&self.main_class)
    }
}

fn simple_name(qualified: &str) -> String {
    qualified
        .rsplit_once('.')
        .map(|(_, simple)| simple.to_string())
        .unwrap_or_else(|| qualified.to_string())
}

/// Everything the six synthesis phases read. Owned by the build driver for
/// the duration of one synthesis.
pub struct SynthesisContext<'a> {
    pub config: &'a BuildConfig,
    pub flags: &'a CapabilityFlags,
    pub payload: &'a NativeAppPayload,
    pub interfaces: &'a [NativeInterfaceDesc],
    pub orchestrator: &'a Orchestrator,
    pub build_dir: &'a Path,
    pub target: BuildTarget,
    pub app: AppMetadata,
}

/// The six synthesis phases as explicit steps, implemented independently
/// per platform and composed by [`run_synthesis`]. Phase order is part of
/// the contract: each phase's output is input to the next.
#[async_trait]
pub trait PlatformSynthesizer: Send {
    fn platform(&self) -> &'static str;

    /// Rejects documented mutually-exclusive option combinations before any
    /// expensive work happens.
    fn check_conflicts(&self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError>;

    /// Creates the native project skeleton and places the payload buckets.
    fn layout(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError>;

    /// Locates the platform toolchain, probing versions and applying at most
    /// one remediation before giving up.
    async fn discover_toolchain(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError>;

    /// Decides every optional capability from configuration, scanner flags,
    /// and defaults, in that priority order.
    fn resolve_features(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError>;

    /// Synthesizes adapter source for declared native interfaces.
    fn generate_glue(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError>;

    /// Renders the manifest/build descriptors from the resolved options.
    fn render_descriptors(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError>;

    /// Drives the external toolchain to the final artifact, or returns the
    /// project tree for export targets.
    async fn invoke_build(&mut self, ctx: &SynthesisContext<'_>)
        -> Result<BuiltArtifact, SynthError>;
}

/// Runs the phases strictly in order.
pub async fn run_synthesis(
    synthesizer: &mut dyn PlatformSynthesizer,
    ctx: &SynthesisContext<'_>,
) -> Result<BuiltArtifact, SynthError> {
    let platform = synthesizer.platform();
    synthesizer.check_conflicts(ctx)?;

    info!("[{platform}] laying out project skeleton");
    synthesizer.layout(ctx)?;

    info!("[{platform}] discovering toolchain");
    synthesizer.discover_toolchain(ctx).await?;

    info!("[{platform}] resolving features and permissions");
    synthesizer.resolve_features(ctx)?;

    info!("[{platform}] generating native glue");
    synthesizer.generate_glue(ctx)?;

    info!("[{platform}] rendering descriptors");
    synthesizer.render_descriptors(ctx)?;

    info!("[{platform}] invoking platform build");
    synthesizer.invoke_build(ctx).await
}

/// Subprocess outcomes that are tolerated and logged rather than failing
/// the build, e.g. re-registering an already-known resource.
const BENIGN_FAILURE_PATTERNS: &[&str] = &[
    "already exists",
    "Warning: Mapping new ns",
    "has been registered already",
];

pub(crate) fn is_benign_failure(output: &str) -> bool {
    let mut saw_benign = false;
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let benign = BENIGN_FAILURE_PATTERNS.iter().any(|p| line.contains(p));
        let noise = line.starts_with("Note:") || line.starts_with("warning:");
        if benign {
            saw_benign = true;
        } else if line.to_lowercase().contains("error") && !noise {
            return false;
        }
    }
    saw_benign
}

pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SynthError + '_ {
    move |source| SynthError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), SynthError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    std::fs::write(path, contents).map_err(io_err(path))
}

/// Documented find-and-replace toggle for pre-templated feature switches.
/// Replaces every occurrence of `marker` in an already-rendered file.
pub(crate) fn replace_in_file(path: &Path, marker: &str, value: &str) -> Result<(), SynthError> {
    let text = std::fs::read_to_string(path).map_err(io_err(path))?;
    if text.contains(marker) {
        std::fs::write(path, text.replace(marker, value)).map_err(io_err(path))?;
    }
    Ok(())
}

pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<(), SynthError> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| SynthError::Io {
            path: src.display().to_string(),
            source: e.into(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| entry.path());
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(io_err(&target))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            std::fs::copy(entry.path(), &target).map_err(io_err(&target))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parsing() {
        assert_eq!(BuildTarget::parse("apk"), Some(BuildTarget::AndroidApk));
        assert_eq!(
            BuildTarget::parse("ios-source"),
            Some(BuildTarget::IosSource)
        );
        assert!(BuildTarget::parse("war").is_none());
        assert!(BuildTarget::parse("android-source").unwrap().is_export());
    }

    #[test]
    fn benign_failure_detection() {
        assert!(is_benign_failure(
            "resource already exists\nWarning: Mapping new ns"
        ));
        assert!(!is_benign_failure("error: compilation failed"));
        assert!(!is_benign_failure(
            "resource already exists\nerror: bad manifest"
        ));
        assert!(!is_benign_failure("all good"));
    }

    #[test]
    fn app_metadata_requires_main_class() {
        let config = BuildConfig::new();
        assert!(matches!(
            AppMetadata::from_config(&config),
            Err(SynthError::MissingInput(_))
        ));

        let mut config = BuildConfig::new();
        config.put("app.mainClass", "com.mycompany.ChatApp");
        config.put("app.packageName", "com.mycompany.chat");
        let app = AppMetadata::from_config(&config).unwrap();
        assert_eq!(app.simple_name(), "ChatApp");
        assert_eq!(app.display_name, "ChatApp");
    }
}

//! The build driver: owns the wall-clock deadline and the cooperative
//! cancellation flag around one whole synthesis, runs the pipeline on a
//! worker task, and reports a terminal outcome with the accumulated log.

mod error;

pub use error::{BuildError, Result};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::BuildConfig;
use crate::exec::{BuildLog, CancelFlag, ExecError, Orchestrator};
use crate::payload::NativeAppPayload;
use crate::remap::{remap_tree, RemapContext, RemappingTable};
use crate::scan::{
    extract_native_interfaces, scan_tree, CapabilityFlags, FlagObserver,
};
use crate::synth::android::manifest::DEFAULT_TARGET_SDK;
use crate::synth::android::AndroidSynthesizer;
use crate::synth::ios::IosSynthesizer;
use crate::synth::{
    run_synthesis, AppMetadata, BuildTarget, BuiltArtifact, PlatformSynthesizer, SynthError,
    SynthesisContext,
};

/// Default ceiling over the entire build, independent of any per-process
/// timeout inside it.
const DEFAULT_BUILD_TIMEOUT_HOURS: u64 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

/// Terminal result of one build invocation.
#[derive(Debug)]
pub struct BuildOutcome {
    pub state: BuildState,
    pub log: String,
    pub artifact: Option<BuiltArtifact>,
    pub error: Option<BuildError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == BuildState::Succeeded
    }
}

pub struct BuildDriver {
    config: BuildConfig,
    target: BuildTarget,
    timeout: Duration,
    log: BuildLog,
    cancel: CancelFlag,
    state: Arc<Mutex<BuildState>>,
}

impl BuildDriver {
    pub fn new(config: BuildConfig, target: BuildTarget) -> Self {
        let hours = config
            .get_opt("build.timeoutHours")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BUILD_TIMEOUT_HOURS);
        Self {
            config,
            target,
            timeout: Duration::from_secs(hours * 60 * 60),
            log: BuildLog::new(),
            cancel: CancelFlag::new(),
            state: Arc::new(Mutex::new(BuildState::Idle)),
        }
    }

    /// Clone handle for callers that want to cancel from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> BuildState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs the whole synthesis on a worker task under the wall-clock
    /// deadline. Always returns an outcome; never panics outward.
    pub async fn run(self, payload_archive: &Path, build_dir: &Path) -> BuildOutcome {
        let started_at = Utc::now();
        set_state(&self.state, BuildState::Running);
        self.log.append(&format!(
            "Build started for target {:?} with a {}h ceiling",
            self.target,
            self.timeout.as_secs() / 3600
        ));

        let job = SynthesisJob {
            config: self.config.clone(),
            target: self.target,
            payload_archive: payload_archive.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            log: self.log.clone(),
            cancel: self.cancel.clone(),
        };
        let mut worker = tokio::spawn(job.run());

        let (state, artifact, error) = match tokio::time::timeout(self.timeout, &mut worker).await {
            Err(_elapsed) => {
                warn!("Build exceeded the wall-clock ceiling, cancelling");
                self.cancel.cancel();
                worker.abort();
                self.log.append("Build timed out at the wall-clock ceiling");
                (BuildState::TimedOut, None, None)
            }
            Ok(Err(join_error)) => {
                error!("Build worker aborted: {join_error}");
                (
                    BuildState::Failed,
                    None,
                    Some(BuildError::Worker(join_error.to_string())),
                )
            }
            Ok(Ok(Ok(artifact))) => {
                self.log
                    .append(&format!("Build succeeded: {}", artifact.path.display()));
                (BuildState::Succeeded, Some(artifact), None)
            }
            Ok(Ok(Err(err))) => {
                if self.cancel.is_cancelled() || is_cancellation(&err) {
                    self.log.append("Build cancelled");
                    (BuildState::Cancelled, None, Some(err))
                } else {
                    self.log.append(&format!("Build failed: {err}"));
                    (BuildState::Failed, None, Some(err))
                }
            }
        };

        set_state(&self.state, state);
        BuildOutcome {
            state,
            log: self.log.contents(),
            artifact,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn set_state(state: &Arc<Mutex<BuildState>>, value: BuildState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

fn is_cancellation(err: &BuildError) -> bool {
    matches!(
        err,
        BuildError::Synthesis(SynthError::Exec(ExecError::Cancelled { .. }))
    )
}

/// Owned inputs for the worker task: unpack, remap, scan, then hand off to
/// the platform synthesizer.
struct SynthesisJob {
    config: BuildConfig,
    target: BuildTarget,
    payload_archive: PathBuf,
    build_dir: PathBuf,
    log: BuildLog,
    cancel: CancelFlag,
}

impl SynthesisJob {
    async fn run(self) -> Result<BuiltArtifact> {
        let app = AppMetadata::from_config(&self.config).map_err(BuildError::Synthesis)?;
        info!("Building {} ({})", app.display_name, app.build_id);

        let payload_dir = self.build_dir.join("payload");
        let payload = NativeAppPayload::unpack(&self.payload_archive, &payload_dir)?;

        // The always-on compatibility shims apply before anything inspects
        // the classes.
        remap_tree(&payload.classes_dir, &RemappingTable::default_compat())?;

        if self.config.get_bool("android.useAndroidX", true) && self.target.is_android() {
            let table = self.migration_table()?;
            let rewritten = remap_tree(&payload.classes_dir, &table)?
                + remap_tree(&payload.libs_dir, &table)?;
            self.log
                .append(&format!("Migrated {rewritten} units to the AndroidX namespace"));
        }

        let target_sdk = self
            .config
            .get_opt("android.targetSDKVersion")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TARGET_SDK);
        let blanket = self.config.get_bool("android.includeGPlayServices", false);
        // Application classes and bundled library archives are both part of
        // the compiled form; capabilities and native interfaces can hide in
        // either.
        let mut flags = CapabilityFlags::new();
        {
            let mut observer = FlagObserver::new(&mut flags, target_sdk, blanket);
            scan_tree(&payload.classes_dir, &mut observer)?;
            scan_tree(&payload.libs_dir, &mut observer)?;
        }
        let mut interfaces = extract_native_interfaces(&payload.classes_dir)?;
        interfaces.extend(extract_native_interfaces(&payload.libs_dir)?);
        self.log.append(&format!(
            "Capability scan complete; {} native interfaces found",
            interfaces.len()
        ));

        let orchestrator = Orchestrator::new(self.log.clone(), self.cancel.clone());
        let ctx = SynthesisContext {
            config: &self.config,
            flags: &flags,
            payload: &payload,
            interfaces: &interfaces,
            orchestrator: &orchestrator,
            build_dir: &self.build_dir,
            target: self.target,
            app,
        };

        let mut synthesizer: Box<dyn PlatformSynthesizer> = if self.target.is_android() {
            Box::new(AndroidSynthesizer::new().map_err(BuildError::Synthesis)?)
        } else {
            Box::new(IosSynthesizer::new().map_err(BuildError::Synthesis)?)
        };
        let artifact = run_synthesis(synthesizer.as_mut(), &ctx).await?;
        Ok(artifact)
    }

    /// Loads the migration table: the bundled data, or the data files named
    /// by configuration, memoized per build through [`RemapContext`].
    fn migration_table(&self) -> Result<RemappingTable> {
        let class_csv = self.config.get_opt("android.androidXClassMappingFile");
        let artifact_csv = self.config.get_opt("android.androidXArtifactMappingFile");
        match (class_csv, artifact_csv) {
            (Some(class_csv), Some(artifact_csv)) => {
                let mut context = RemapContext::new();
                let table = context.migration_table(
                    Path::new(&class_csv),
                    Path::new(&artifact_csv),
                )?;
                Ok((*table).clone())
            }
            _ => Ok(RemappingTable::embedded_migration()?),
        }
    }
}

//! Android project synthesis: Gradle tree layout, SDK/Gradle discovery,
//! permission and dependency resolution, glue generation, descriptor
//! rendering, and the Gradle invocation itself.

pub mod gradle;
pub mod manifest;
pub mod permissions;
pub mod stubs;
pub mod toolchain;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use handlebars::Handlebars;
use tracing::{info, warn};

use crate::remap::{migrate_sources, RemappingTable};
use crate::synth::{
    copy_tree, io_err, is_benign_failure, replace_in_file, write_file, ArtifactKind,
    BuildTarget, BuiltArtifact, PlatformSynthesizer, SynthError, SynthesisContext,
};

use manifest::ResolvedAndroidOptions;
use toolchain::{AndroidToolchain, ToolchainSearch};

/// Gradle gets hours, not minutes: a cold dependency resolution plus a
/// full assemble is routinely enormous.
const GRADLE_BUILD_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

pub struct AndroidSynthesizer {
    handlebars: Handlebars<'static>,
    project_dir: PathBuf,
    app_dir: PathBuf,
    toolchain: Option<AndroidToolchain>,
    options: Option<ResolvedAndroidOptions>,
}

impl AndroidSynthesizer {
    pub fn new() -> Result<Self, SynthError> {
        let mut handlebars = Handlebars::new();
        manifest::register_templates(&mut handlebars)?;
        Ok(Self {
            handlebars,
            project_dir: PathBuf::new(),
            app_dir: PathBuf::new(),
            toolchain: None,
            options: None,
        })
    }

    fn options(&self) -> Result<&ResolvedAndroidOptions, SynthError> {
        self.options
            .as_ref()
            .ok_or_else(|| SynthError::MissingInput("feature resolution did not run".to_string()))
    }

    fn toolchain(&self) -> Result<&AndroidToolchain, SynthError> {
        self.toolchain
            .as_ref()
            .ok_or_else(|| SynthError::MissingInput("toolchain discovery did not run".to_string()))
    }

    fn gradle_task(&self, target: BuildTarget, release: bool) -> &'static str {
        match (target, release) {
            (BuildTarget::AndroidAab, _) => "bundleRelease",
            (_, true) => "assembleRelease",
            (_, false) => "assembleDebug",
        }
    }

    fn artifact_path(&self, target: BuildTarget, release: bool) -> (PathBuf, ArtifactKind) {
        match target {
            BuildTarget::AndroidAab => (
                self.app_dir
                    .join("build/outputs/bundle/release/app-release.aab"),
                ArtifactKind::AndroidBundle,
            ),
            _ => {
                let profile = if release { "release" } else { "debug" };
                (
                    self.app_dir
                        .join("build/outputs/apk")
                        .join(profile)
                        .join(format!("app-{profile}.apk")),
                    ArtifactKind::AndroidPackage,
                )
            }
        }
    }
}

#[async_trait]
impl PlatformSynthesizer for AndroidSynthesizer {
    fn platform(&self) -> &'static str {
        "android"
    }

    fn check_conflicts(&self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let messaging = ctx.config.get_opt("android.messagingService");
        if messaging.as_deref() == Some("fcm") && ctx.config.get_bool("android.forceGCM", false) {
            return Err(SynthError::ConflictingOptions {
                first: "android.messagingService=fcm".to_string(),
                second: "android.forceGCM=true".to_string(),
                reason: "only one messaging transport can be wired into the manifest".to_string(),
            });
        }
        if let Some(value) = &messaging {
            if value != "fcm" && value != "gcm" {
                return Err(SynthError::MissingInput(format!(
                    "android.messagingService must be fcm or gcm, got {value}"
                )));
            }
        }
        Ok(())
    }

    fn layout(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        self.project_dir = ctx.build_dir.join("android-project");
        self.app_dir = self.project_dir.join("app");
        let main_dir = self.app_dir.join("src").join("main");
        for dir in [
            main_dir.join("java"),
            main_dir.join("res").join("values"),
            main_dir.join("assets"),
            self.app_dir.join("libs"),
        ] {
            std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        }

        // Payload buckets land in their Gradle-native homes.
        copy_tree(&ctx.payload.sources_dir, &main_dir.join("java"))?;
        copy_tree(&ctx.payload.resources_dir, &main_dir.join("assets"))?;
        copy_jars(&ctx.payload.libs_dir, &self.app_dir.join("libs"))?;
        jar_directory(
            &ctx.payload.classes_dir,
            &self.app_dir.join("libs").join("app-classes.jar"),
        )?;

        // FCM expects the services file at the module root.
        if let Some(services) = ctx.payload.find_resource("google-services.json") {
            let target = self.app_dir.join("google-services.json");
            std::fs::copy(&services, &target).map_err(io_err(&target))?;
        }
        info!("Android project skeleton at {}", self.project_dir.display());
        Ok(())
    }

    async fn discover_toolchain(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let search = ToolchainSearch::from_config(ctx.config)?;
        let toolchain = toolchain::discover(ctx.orchestrator, &search, &self.project_dir).await?;
        ctx.orchestrator.log().append(&format!(
            "Using Gradle {} at {}",
            toolchain.gradle_version,
            toolchain.gradle_exe.display()
        ));
        self.toolchain = Some(toolchain);
        Ok(())
    }

    fn resolve_features(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let options = manifest::resolve_options(ctx.config, ctx.flags, &ctx.app, ctx.target)?;
        if options.use_fcm && !self.app_dir.join("google-services.json").exists() {
            return Err(SynthError::MissingInput(
                "google-services.json is required when android.messagingService=fcm; \
                 add it to the application payload"
                    .to_string(),
            ));
        }
        ctx.orchestrator.log().append(&format!(
            "Resolved {} permission declarations, Play Services {}",
            options.permissions.len(),
            options.play_services_version
        ));
        self.options = Some(options);
        Ok(())
    }

    fn generate_glue(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let mut registrations = Vec::new();
        let java_root = self.app_dir.join("src").join("main").join("java");
        for interface in ctx.interfaces {
            let package_dir = interface
                .package
                .split('.')
                .filter(|s| !s.is_empty())
                .fold(java_root.clone(), |dir, part| dir.join(part));
            let stub_path = package_dir.join(format!("{}Stub.java", interface.name));
            write_file(&stub_path, &stubs::render_java_stub(interface))?;
            registrations.push(stubs::registration_line(interface));
            info!("Generated native stub {}", stub_path.display());
        }
        let options = self
            .options
            .as_mut()
            .ok_or_else(|| SynthError::MissingInput("feature resolution did not run".to_string()))?;
        options.native_registrations = registrations;
        Ok(())
    }

    fn render_descriptors(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let options = self.options()?.clone();
        let main_dir = self.app_dir.join("src").join("main");

        write_file(
            &main_dir.join("AndroidManifest.xml"),
            &manifest::render_manifest(&self.handlebars, &options)?,
        )?;
        write_file(
            &self.app_dir.join("build.gradle"),
            &manifest::render_build_gradle(&self.handlebars, &options)?,
        )?;
        write_file(
            &self.project_dir.join("settings.gradle"),
            &manifest::render_settings_gradle(&self.handlebars, &options)?,
        )?;
        write_file(
            &self.project_dir.join("gradle.properties"),
            &manifest::render_gradle_properties(&self.handlebars, &options)?,
        )?;
        write_file(
            &main_dir.join("res").join("values").join("strings.xml"),
            &manifest::render_strings_xml(&self.handlebars, &options)?,
        )?;
        let activity_path = options
            .package_name
            .split('.')
            .fold(main_dir.join("java"), |dir, part| dir.join(part))
            .join(format!("{}.java", options.activity_name));
        write_file(
            &activity_path,
            &manifest::render_main_activity(&self.handlebars, &options)?,
        )?;

        // Pre-templated toggle: release builds may opt into shrinking.
        if ctx.config.get_bool("android.minify", false) {
            replace_in_file(
                &self.app_dir.join("build.gradle"),
                "minifyEnabled false",
                "minifyEnabled true",
            )?;
        }

        // The generated tree still speaks the support-library dialect when
        // AndroidX is on; migrate the rendered text in place.
        if options.use_androidx {
            let table = RemappingTable::embedded_migration()?;
            migrate_sources(&self.project_dir, &table)?;
        }
        Ok(())
    }

    async fn invoke_build(
        &mut self,
        ctx: &SynthesisContext<'_>,
    ) -> Result<BuiltArtifact, SynthError> {
        if ctx.target.is_export() {
            info!("Export build, returning generated project tree");
            return Ok(BuiltArtifact {
                path: self.project_dir.clone(),
                kind: ArtifactKind::ProjectTree,
            });
        }

        let toolchain = self.toolchain()?.clone();
        let options = self.options()?;
        let task = self.gradle_task(ctx.target, options.release);

        let mut argv = vec![
            toolchain.gradle_exe.display().to_string(),
            task.to_string(),
        ];
        if let Some(extra) = ctx.config.get_opt("android.gradleArgs") {
            argv.extend(shell_words::split(&extra).unwrap_or_default());
        }
        let mut env = HashMap::new();
        env.insert(
            "ANDROID_HOME".to_string(),
            toolchain.sdk_dir.display().to_string(),
        );

        let result = ctx
            .orchestrator
            .run(&self.project_dir, &env, &argv, Some(GRADLE_BUILD_TIMEOUT))
            .await?;
        if result.timed_out {
            return Err(SynthError::StepTimeout {
                tool: "gradle".to_string(),
            });
        }
        if !result.success() {
            if is_benign_failure(&result.output) {
                warn!("Tolerating benign Gradle failure (exit {})", result.exit_code);
            } else {
                return Err(SynthError::ToolFailure {
                    tool: "gradle".to_string(),
                    exit_code: result.exit_code,
                    output: result.output,
                });
            }
        }

        let (artifact, kind) = self.artifact_path(ctx.target, options.release);
        if !artifact.exists() {
            return Err(SynthError::ArtifactNotFound(
                artifact.display().to_string(),
            ));
        }
        Ok(BuiltArtifact {
            path: artifact,
            kind,
        })
    }
}

fn copy_jars(libs_dir: &Path, target_dir: &Path) -> Result<(), SynthError> {
    for entry in walkdir::WalkDir::new(libs_dir) {
        let entry = entry.map_err(|e| SynthError::Io {
            path: libs_dir.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(".jar") {
            let target = target_dir.join(entry.file_name());
            std::fs::copy(entry.path(), &target).map_err(io_err(&target))?;
        }
    }
    Ok(())
}

/// Packs the compiled (and by now remapped) application classes into a jar
/// the Gradle build consumes from `libs/`.
fn jar_directory(classes_dir: &Path, jar_path: &Path) -> Result<(), SynthError> {
    let file = std::fs::File::create(jar_path).map_err(io_err(jar_path))?;
    let mut writer = zip::ZipWriter::new(file);
    let options: zip::write::SimpleFileOptions = Default::default();

    for entry in walkdir::WalkDir::new(classes_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| SynthError::Io {
            path: classes_dir.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(classes_dir)
            .unwrap_or_else(|_| entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read(entry.path()).map_err(io_err(entry.path()))?;
        writer
            .start_file(name, options)
            .and_then(|_| writer.write_all(&data).map_err(Into::into))
            .map_err(|e| SynthError::Io {
                path: jar_path.display().to_string(),
                source: std::io::Error::other(e),
            })?;
    }
    writer.finish().map_err(|e| SynthError::Io {
        path: jar_path.display().to_string(),
        source: std::io::Error::other(e),
    })?;
    Ok(())
}

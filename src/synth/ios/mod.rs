//! iOS project synthesis: Xcode tree layout, toolchain probing, usage
//! description resolution, Objective-C glue generation, plist/Podfile
//! rendering, and the archive/export invocation.

pub mod project;
pub mod stubs;
pub mod toolchain;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use handlebars::Handlebars;
use tracing::{info, warn};

use crate::synth::{
    copy_tree, io_err, is_benign_failure, write_file, ArtifactKind, BuiltArtifact,
    PlatformSynthesizer, SynthError, SynthesisContext,
};

use project::ResolvedIosOptions;
use toolchain::IosToolchain;

const POD_INSTALL_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const XCODEBUILD_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

pub struct IosSynthesizer {
    handlebars: Handlebars<'static>,
    project_dir: PathBuf,
    app_dir: PathBuf,
    toolchain: Option<IosToolchain>,
    options: Option<ResolvedIosOptions>,
    source_files: Vec<String>,
}

impl IosSynthesizer {
    pub fn new() -> Result<Self, SynthError> {
        let mut handlebars = Handlebars::new();
        project::register_templates(&mut handlebars)?;
        Ok(Self {
            handlebars,
            project_dir: PathBuf::new(),
            app_dir: PathBuf::new(),
            toolchain: None,
            options: None,
            source_files: Vec::new(),
        })
    }

    fn options(&self) -> Result<&ResolvedIosOptions, SynthError> {
        self.options
            .as_ref()
            .ok_or_else(|| SynthError::MissingInput("feature resolution did not run".to_string()))
    }

    fn collect_source_files(&mut self) -> Result<(), SynthError> {
        self.source_files.clear();
        for entry in walkdir::WalkDir::new(&self.app_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| SynthError::Io {
                path: self.app_dir.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(".m") || name.ends_with(".h") {
                self.source_files.push(name.into_owned());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformSynthesizer for IosSynthesizer {
    fn platform(&self) -> &'static str {
        "ios"
    }

    fn check_conflicts(&self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        // Disabling WKWebView while also banning UIWebView leaves no web
        // view implementation at all.
        let wk_disabled = ctx.config.is_set("ios.useWKWebView")
            && !ctx.config.get_bool("ios.useWKWebView", true);
        let ui_banned =
            ctx.config.is_set("ios.noUIWebView") && ctx.config.get_bool("ios.noUIWebView", true);
        if wk_disabled && ui_banned {
            return Err(SynthError::ConflictingOptions {
                first: "ios.useWKWebView=false".to_string(),
                second: "ios.noUIWebView=true".to_string(),
                reason: "the generated app would have no web view implementation".to_string(),
            });
        }
        Ok(())
    }

    fn layout(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        self.project_dir = ctx.build_dir.join("ios-project");
        let app_name = ctx.app.simple_name();
        self.app_dir = self.project_dir.join(&app_name);
        let xcodeproj = self.project_dir.join(format!("{app_name}.xcodeproj"));
        let resources = self.app_dir.join("Resources");
        let libs = self.project_dir.join("libs");
        for dir in [&self.app_dir, &xcodeproj, &resources, &libs] {
            std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        copy_tree(&ctx.payload.sources_dir, &self.app_dir)?;
        copy_tree(&ctx.payload.resources_dir, &resources)?;
        for entry in walkdir::WalkDir::new(&ctx.payload.libs_dir) {
            let entry = entry.map_err(|e| SynthError::Io {
                path: ctx.payload.libs_dir.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".a") || name.ends_with(".dylib") {
                let target = libs.join(&name);
                std::fs::copy(entry.path(), &target).map_err(io_err(&target))?;
            }
        }
        info!("iOS project skeleton at {}", self.project_dir.display());
        Ok(())
    }

    async fn discover_toolchain(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let need_pods = !ctx.config.get("ios.pods", "").trim().is_empty();
        let toolchain =
            toolchain::discover(ctx.orchestrator, need_pods, &self.project_dir).await?;
        ctx.orchestrator
            .log()
            .append(&format!("Using Xcode {}", toolchain.xcode_version));
        self.toolchain = Some(toolchain);
        Ok(())
    }

    fn resolve_features(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let options = project::resolve_options(ctx.config, ctx.flags, &ctx.app)?;
        ctx.orchestrator.log().append(&format!(
            "Resolved {} usage descriptions, {} pods",
            options.usage_descriptions.len(),
            options.pods.len()
        ));
        self.options = Some(options);
        Ok(())
    }

    fn generate_glue(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        for interface in ctx.interfaces {
            let header = self.app_dir.join(format!("{}Stub.h", interface.name));
            let implementation = self.app_dir.join(format!("{}Stub.m", interface.name));
            write_file(&header, &stubs::render_objc_header(interface))?;
            write_file(&implementation, &stubs::render_objc_impl(interface))?;
            info!("Generated native stub {}", implementation.display());
        }
        Ok(())
    }

    fn render_descriptors(&mut self, ctx: &SynthesisContext<'_>) -> Result<(), SynthError> {
        let options = self.options()?.clone();
        let app_name = &options.app_simple_name;

        write_file(
            &self.app_dir.join("Info.plist"),
            &project::render_info_plist(&self.handlebars, &options)?,
        )?;
        if options.aps_environment.is_some() {
            write_file(
                &self.app_dir.join(format!("{app_name}.entitlements")),
                &project::render_entitlements(&self.handlebars, &options)?,
            )?;
        }
        if !options.pods.is_empty() {
            write_file(
                &self.project_dir.join("Podfile"),
                &project::render_podfile(&self.handlebars, &options)?,
            )?;
        }
        if !ctx.target.is_export() {
            write_file(
                &self.project_dir.join("exportOptions.plist"),
                &project::render_export_options(&self.handlebars, &options)?,
            )?;
        }

        self.collect_source_files()?;
        let pbxproj = self
            .project_dir
            .join(format!("{app_name}.xcodeproj"))
            .join("project.pbxproj");
        write_file(
            &pbxproj,
            &project::render_pbxproj(&options, &self.source_files),
        )?;
        Ok(())
    }

    async fn invoke_build(
        &mut self,
        ctx: &SynthesisContext<'_>,
    ) -> Result<BuiltArtifact, SynthError> {
        if ctx.target.is_export() {
            info!("Export build, returning generated Xcode project");
            return Ok(BuiltArtifact {
                path: self.project_dir.clone(),
                kind: ArtifactKind::ProjectTree,
            });
        }

        let toolchain = self
            .toolchain
            .as_ref()
            .ok_or_else(|| SynthError::MissingInput("toolchain discovery did not run".to_string()))?;
        if toolchain.pods_version.is_none() && !self.options()?.pods.is_empty() {
            return Err(SynthError::ToolchainMissing {
                tool: "CocoaPods".to_string(),
                guidance: "pods were requested after toolchain discovery ran without them"
                    .to_string(),
            });
        }
        let options = self.options()?.clone();
        let app_name = options.app_simple_name.clone();
        let env = HashMap::new();

        if !options.pods.is_empty() {
            let result = ctx
                .orchestrator
                .run(
                    &self.project_dir,
                    &env,
                    &["pod".to_string(), "install".to_string()],
                    Some(POD_INSTALL_TIMEOUT),
                )
                .await?;
            if result.timed_out {
                return Err(SynthError::StepTimeout {
                    tool: "pod install".to_string(),
                });
            }
            if !result.success() {
                if is_benign_failure(&result.output) {
                    warn!("Tolerating benign pod install failure");
                } else {
                    return Err(SynthError::ToolFailure {
                        tool: "pod install".to_string(),
                        exit_code: result.exit_code,
                        output: result.output,
                    });
                }
            }
        }

        let archive_path = self.project_dir.join("build").join(format!("{app_name}.xcarchive"));
        let archive_argv = vec![
            "xcodebuild".to_string(),
            "-project".to_string(),
            format!("{app_name}.xcodeproj"),
            "-scheme".to_string(),
            app_name.clone(),
            "-configuration".to_string(),
            "Release".to_string(),
            "-archivePath".to_string(),
            archive_path.display().to_string(),
            "archive".to_string(),
        ];
        run_xcodebuild(ctx, &self.project_dir, &env, archive_argv).await?;

        let export_dir = self.project_dir.join("build").join("export");
        let export_argv = vec![
            "xcodebuild".to_string(),
            "-exportArchive".to_string(),
            "-archivePath".to_string(),
            archive_path.display().to_string(),
            "-exportOptionsPlist".to_string(),
            self.project_dir.join("exportOptions.plist").display().to_string(),
            "-exportPath".to_string(),
            export_dir.display().to_string(),
        ];
        run_xcodebuild(ctx, &self.project_dir, &env, export_argv).await?;

        let ipa = walkdir::WalkDir::new(&export_dir)
            .into_iter()
            .filter_map(Result::ok)
            .find(|e| {
                e.file_type().is_file() && e.file_name().to_string_lossy().ends_with(".ipa")
            })
            .map(|e| e.into_path())
            .ok_or_else(|| SynthError::ArtifactNotFound(export_dir.display().to_string()))?;
        Ok(BuiltArtifact {
            path: ipa,
            kind: ArtifactKind::IosPackage,
        })
    }
}

async fn run_xcodebuild(
    ctx: &SynthesisContext<'_>,
    working_dir: &std::path::Path,
    env: &HashMap<String, String>,
    argv: Vec<String>,
) -> Result<(), SynthError> {
    let result = ctx
        .orchestrator
        .run(working_dir, env, &argv, Some(XCODEBUILD_TIMEOUT))
        .await?;
    if result.timed_out {
        return Err(SynthError::StepTimeout {
            tool: "xcodebuild".to_string(),
        });
    }
    if !result.success() {
        return Err(SynthError::ToolFailure {
            tool: "xcodebuild".to_string(),
            exit_code: result.exit_code,
            output: result.output,
        });
    }
    Ok(())
}

use std::collections::BTreeMap;

use handlebars::Handlebars;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::BuildConfig;
use crate::scan::CapabilityFlags;
use crate::synth::{AppMetadata, SynthError};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UsageDescription {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PodDecl {
    pub name: String,
    pub version: Option<String>,
}

/// Everything the iOS descriptor templates consume.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedIosOptions {
    pub bundle_id: String,
    pub display_name: String,
    pub app_simple_name: String,
    pub version: String,
    pub build_version: String,
    pub deployment_target: String,
    pub usage_descriptions: Vec<UsageDescription>,
    pub background_modes: Vec<String>,
    pub aps_environment: Option<String>,
    pub pods: Vec<PodDecl>,
    pub export_method: String,
    pub team_id: String,
    pub use_wkwebview: bool,
}

/// One optional usage-description capability: the configuration key that
/// overrides the text, the flag consulted when configuration is silent,
/// and the Info.plist key it lands under.
struct UsageRule {
    plist_key: &'static str,
    config_key: &'static str,
    flag: fn(&CapabilityFlags) -> bool,
    default_text: &'static str,
}

const USAGE_RULES: &[UsageRule] = &[
    UsageRule {
        plist_key: "NSLocationWhenInUseUsageDescription",
        config_key: "ios.locationUsageDescription",
        flag: |f| f.uses_location,
        default_text: "This app uses your location to provide location aware functionality",
    },
    UsageRule {
        plist_key: "NSLocationAlwaysAndWhenInUseUsageDescription",
        config_key: "ios.backgroundLocationUsageDescription",
        flag: |f| f.uses_background_location,
        default_text: "This app tracks your location in the background",
    },
    UsageRule {
        plist_key: "NSCameraUsageDescription",
        config_key: "ios.cameraUsageDescription",
        flag: |f| f.uses_capture,
        default_text: "This app takes photos with the camera",
    },
    UsageRule {
        plist_key: "NSMicrophoneUsageDescription",
        config_key: "ios.microphoneUsageDescription",
        flag: |f| f.uses_record_audio,
        default_text: "This app records audio with the microphone",
    },
    UsageRule {
        plist_key: "NSContactsUsageDescription",
        config_key: "ios.contactsUsageDescription",
        flag: |f| f.uses_contacts_read || f.uses_contacts_write,
        default_text: "This app accesses your contacts",
    },
];

/// Resolves iOS options from configuration, scanner flags, and defaults.
/// Usage descriptions deduplicate by Info.plist key regardless of source.
pub fn resolve_options(
    config: &BuildConfig,
    flags: &CapabilityFlags,
    app: &AppMetadata,
) -> Result<ResolvedIosOptions, SynthError> {
    let mut descriptions: BTreeMap<String, UsageDescription> = BTreeMap::new();
    for rule in USAGE_RULES {
        let decl = match config.get_opt(rule.config_key) {
            Some(text) if text.is_empty() => None,
            Some(text) => Some(text),
            None if (rule.flag)(flags) => Some(rule.default_text.to_string()),
            None => None,
        };
        if let Some(text) = decl {
            descriptions
                .entry(rule.plist_key.to_string())
                .or_insert_with(|| UsageDescription {
                    key: rule.plist_key.to_string(),
                    text,
                });
        }
    }
    if config.get_bool("ios.enableGalleryMultiselect", false) {
        descriptions
            .entry("NSPhotoLibraryUsageDescription".to_string())
            .or_insert_with(|| UsageDescription {
                key: "NSPhotoLibraryUsageDescription".to_string(),
                text: config.get(
                    "ios.photoLibraryUsageDescription",
                    "This app selects images from your photo library",
                ),
            });
    }

    let push = match config.get_opt("ios.includePush") {
        Some(value) => value == "true",
        None => flags.uses_push,
    };
    let mut background_modes = Vec::new();
    if push {
        background_modes.push("remote-notification".to_string());
    }
    if descriptions.contains_key("NSLocationAlwaysAndWhenInUseUsageDescription") {
        background_modes.push("location".to_string());
    }
    if flags.uses_remote_control {
        background_modes.push("audio".to_string());
    }

    Ok(ResolvedIosOptions {
        bundle_id: app.package_name.clone(),
        display_name: app.display_name.clone(),
        app_simple_name: app.simple_name(),
        version: app.version.clone(),
        build_version: config.get("ios.buildVersion", &app.version),
        deployment_target: config.get("ios.minDeploymentTarget", "12.0"),
        usage_descriptions: descriptions.into_values().collect(),
        background_modes,
        aps_environment: push.then(|| config.get("ios.apsEnvironment", "development")),
        pods: parse_pods(&config.get("ios.pods", "")),
        export_method: config.get("ios.exportMethod", "development"),
        team_id: config.get("ios.teamId", ""),
        use_wkwebview: config.get_bool("ios.useWKWebView", true),
    })
}

/// `ios.pods` is a comma-separated list of `Name` or `Name <requirement>`
/// entries, e.g. `GoogleMaps,FBSDKCoreKit ~> 5.6`.
fn parse_pods(value: &str) -> Vec<PodDecl> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(' ') {
            Some((name, requirement)) => PodDecl {
                name: name.to_string(),
                version: Some(requirement.trim().to_string()),
            },
            None => PodDecl {
                name: entry.to_string(),
                version: None,
            },
        })
        .collect()
}

pub fn register_templates(hb: &mut Handlebars) -> Result<(), SynthError> {
    hb.register_template_string("info_plist", include_str!("../templates/info_plist.hbs"))
        .map_err(Box::new)?;
    hb.register_template_string("podfile", include_str!("../templates/podfile.hbs"))
        .map_err(Box::new)?;
    hb.register_template_string(
        "export_options",
        include_str!("../templates/export_options.hbs"),
    )
    .map_err(Box::new)?;
    hb.register_template_string(
        "entitlements",
        include_str!("../templates/entitlements.hbs"),
    )
    .map_err(Box::new)?;
    Ok(())
}

pub fn render_info_plist(
    hb: &Handlebars,
    options: &ResolvedIosOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("info_plist", options)?)
}

pub fn render_podfile(hb: &Handlebars, options: &ResolvedIosOptions) -> Result<String, SynthError> {
    Ok(hb.render("podfile", options)?)
}

pub fn render_export_options(
    hb: &Handlebars,
    options: &ResolvedIosOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("export_options", options)?)
}

pub fn render_entitlements(
    hb: &Handlebars,
    options: &ResolvedIosOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("entitlements", options)?)
}

/// Renders the Xcode project descriptor. File reference identifiers are
/// digests of the file names, so regenerating the project is stable.
pub fn render_pbxproj(options: &ResolvedIosOptions, source_files: &[String]) -> String {
    let app = &options.app_simple_name;
    let mut file_refs = String::new();
    let mut build_files = String::new();
    let mut source_ids = Vec::new();

    for file in source_files {
        let file_id = object_id("file", file);
        let build_id = object_id("build", file);
        file_refs.push_str(&format!(
            "\t\t{file_id} /* {file} */ = {{isa = PBXFileReference; path = \"{file}\"; \
             sourceTree = \"<group>\"; }};\n"
        ));
        if file.ends_with(".m") {
            build_files.push_str(&format!(
                "\t\t{build_id} /* {file} in Sources */ = {{isa = PBXBuildFile; \
                 fileRef = {file_id}; }};\n"
            ));
            source_ids.push(build_id);
        }
    }

    let target_id = object_id("target", app);
    let project_id = object_id("project", app);
    format!(
        "// !$*UTF8*$!\n{{\n\tarchiveVersion = 1;\n\tobjectVersion = 50;\n\tobjects = {{\n\
         {file_refs}{build_files}\
         \t\t{target_id} /* {app} */ = {{isa = PBXNativeTarget; name = {app}; \
         productType = \"com.apple.product-type.application\"; \
         sources = ({source_list}); }};\n\
         \t\t{project_id} /* Project */ = {{isa = PBXProject; targets = ({target_id}); }};\n\
         \t}};\n\trootObject = {project_id};\n}}\n",
        source_list = source_ids.join(", "),
    )
}

fn object_id(kind: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    digest[..12]
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_app() -> AppMetadata {
        let mut config = BuildConfig::new();
        config.put("app.mainClass", "com.mycompany.ChatApp");
        config.put("app.packageName", "com.mycompany.chat");
        AppMetadata::from_config(&config).unwrap()
    }

    #[test]
    fn location_flag_adds_usage_description_once() {
        let mut config = BuildConfig::new();
        config.put("ios.locationUsageDescription", "We show nearby friends");
        let mut flags = CapabilityFlags::new();
        flags.uses_location = true;
        let options = resolve_options(&config, &flags, &test_app()).unwrap();
        let matches: Vec<_> = options
            .usage_descriptions
            .iter()
            .filter(|d| d.key == "NSLocationWhenInUseUsageDescription")
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "We show nearby friends");
    }

    #[test]
    fn push_adds_background_mode_and_entitlement() {
        let config = BuildConfig::new();
        let mut flags = CapabilityFlags::new();
        flags.uses_push = true;
        let options = resolve_options(&config, &flags, &test_app()).unwrap();
        assert!(options
            .background_modes
            .contains(&"remote-notification".to_string()));
        assert_eq!(options.aps_environment.as_deref(), Some("development"));
    }

    #[test]
    fn pods_parse_with_optional_requirement() {
        let pods = parse_pods("GoogleMaps,FBSDKCoreKit ~> 5.6");
        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].name, "GoogleMaps");
        assert!(pods[0].version.is_none());
        assert_eq!(pods[1].version.as_deref(), Some("~> 5.6"));
    }

    #[test]
    fn pbxproj_lists_compiled_sources() {
        let config = BuildConfig::new();
        let options =
            resolve_options(&config, &CapabilityFlags::new(), &test_app()).unwrap();
        let text = render_pbxproj(
            &options,
            &["main.m".to_string(), "CameraStub.m".to_string(), "CameraStub.h".to_string()],
        );
        assert!(text.contains("CameraStub.m in Sources"));
        assert!(!text.contains("CameraStub.h in Sources"));
    }
}

use handlebars::Handlebars;
use serde::Serialize;

use crate::config::BuildConfig;
use crate::scan::CapabilityFlags;
use crate::synth::{AppMetadata, BuildTarget, SynthError};

use super::gradle::{resolve_dependencies, resolve_play_services_version};
use super::permissions::{resolve_features, resolve_permissions, FeatureDecl, PermissionDecl};

pub const DEFAULT_TARGET_SDK: u64 = 30;
pub const DEFAULT_MIN_SDK: u64 = 21;

#[derive(Debug, Clone, Serialize)]
pub struct SigningConfig {
    pub keystore_path: String,
    pub keystore_password: String,
    pub key_alias: String,
    pub key_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StringRes {
    pub name: String,
    pub value: String,
}

/// Everything the Android descriptor templates consume, resolved once from
/// configuration, capability flags, and app identity. Rendering is pure
/// string composition over this record.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAndroidOptions {
    pub package_name: String,
    pub app_name: String,
    pub app_simple_name: String,
    pub activity_name: String,
    pub main_class: String,
    pub version_name: String,
    pub version_code: String,
    pub min_sdk: u64,
    pub target_sdk: u64,
    pub build_tools_version: String,
    pub gradle_plugin_version: String,
    pub use_androidx: bool,
    pub multidex: bool,
    pub release: bool,
    pub use_fcm: bool,
    pub permissions: Vec<PermissionDecl>,
    pub features: Vec<FeatureDecl>,
    pub play_services_version: String,
    pub dependencies: Vec<String>,
    pub top_level_classpath: Vec<String>,
    pub plugins: Vec<String>,
    pub manifest_entries: Vec<String>,
    pub signing: Option<SigningConfig>,
    pub native_registrations: Vec<String>,
    pub extra_strings: Vec<StringRes>,
}

/// Resolves every optional Android capability and build switch, in the
/// documented priority order: explicit configuration, then scanner flags,
/// then defaults.
pub fn resolve_options(
    config: &BuildConfig,
    flags: &CapabilityFlags,
    app: &AppMetadata,
    target: BuildTarget,
) -> Result<ResolvedAndroidOptions, SynthError> {
    let target_sdk = parse_sdk_level(config, "android.targetSDKVersion", DEFAULT_TARGET_SDK);
    let min_sdk = parse_sdk_level(config, "android.minSDKVersion", DEFAULT_MIN_SDK);
    let use_androidx = config.get_bool("android.useAndroidX", true);
    let release = target == BuildTarget::AndroidAab || config.get_bool("android.release", false);

    let push_enabled = match config.get_opt("android.pushPermission") {
        Some(value) => value == "true",
        None => flags.uses_push,
    };
    let use_fcm =
        push_enabled && config.get("android.messagingService", "fcm").as_str() == "fcm";

    let mut top_level_classpath = Vec::new();
    let mut plugins = Vec::new();
    if use_fcm {
        top_level_classpath.push("com.google.gms:google-services:4.3.15".to_string());
        plugins.push("com.google.gms.google-services".to_string());
    }

    let mut manifest_entries = Vec::new();
    if use_fcm {
        manifest_entries.push(
            "<service android:name=\"com.appforge.android.PushMessagingService\" \
             android:exported=\"false\"><intent-filter><action \
             android:name=\"com.google.firebase.MESSAGING_EVENT\"/></intent-filter></service>"
                .to_string(),
        );
    }
    if flags.uses_remote_control {
        manifest_entries.push(
            "<service android:name=\"com.appforge.android.RemoteControlService\" \
             android:exported=\"false\"/>"
                .to_string(),
        );
    }
    if let Some(extra) = config.get_opt("android.xapplication") {
        manifest_entries.extend(
            extra
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }

    let signing = if release && !target.is_export() {
        Some(resolve_signing(config)?)
    } else {
        None
    };

    Ok(ResolvedAndroidOptions {
        package_name: app.package_name.clone(),
        app_name: app.display_name.clone(),
        app_simple_name: app.simple_name(),
        activity_name: format!("{}Activity", app.simple_name()),
        main_class: app.main_class.clone(),
        version_name: app.version.clone(),
        version_code: config.get("android.versionCode", "1"),
        min_sdk,
        target_sdk,
        build_tools_version: config.get("android.buildToolsVersion", "30.0.3"),
        gradle_plugin_version: config.get("android.gradlePluginVersion", "4.1.3"),
        use_androidx,
        multidex: config.get_bool("android.multidex", false),
        release,
        use_fcm,
        permissions: resolve_permissions(config, flags).into_sorted(),
        features: resolve_features(config, flags),
        play_services_version: resolve_play_services_version(config, flags),
        dependencies: resolve_dependencies(config, flags, use_fcm, use_androidx),
        top_level_classpath,
        plugins,
        manifest_entries,
        signing,
        native_registrations: Vec::new(),
        extra_strings: Vec::new(),
    })
}

fn parse_sdk_level(config: &BuildConfig, key: &str, default: u64) -> u64 {
    config
        .get_opt(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn resolve_signing(config: &BuildConfig) -> Result<SigningConfig, SynthError> {
    let keystore_path = config
        .get_opt("android.keystorePath")
        .ok_or_else(|| SynthError::MissingInput("android.keystorePath".to_string()))?;
    let key_alias = config
        .get_opt("android.keystoreAlias")
        .ok_or_else(|| SynthError::MissingInput("android.keystoreAlias".to_string()))?;
    let keystore_password = config
        .get_opt("android.keystorePassword")
        .ok_or_else(|| SynthError::MissingInput("android.keystorePassword".to_string()))?;
    let key_password = config.get("android.keyPassword", &keystore_password);
    Ok(SigningConfig {
        keystore_path,
        keystore_password,
        key_alias,
        key_password,
    })
}

pub fn register_templates(hb: &mut Handlebars) -> Result<(), SynthError> {
    hb.register_template_string(
        "android_manifest",
        include_str!("../templates/android_manifest.hbs"),
    )
    .map_err(Box::new)?;
    hb.register_template_string("build_gradle", include_str!("../templates/build_gradle.hbs"))
        .map_err(Box::new)?;
    hb.register_template_string(
        "settings_gradle",
        include_str!("../templates/settings_gradle.hbs"),
    )
    .map_err(Box::new)?;
    hb.register_template_string(
        "gradle_properties",
        include_str!("../templates/gradle_properties.hbs"),
    )
    .map_err(Box::new)?;
    hb.register_template_string("strings_xml", include_str!("../templates/strings_xml.hbs"))
        .map_err(Box::new)?;
    hb.register_template_string(
        "main_activity",
        include_str!("../templates/main_activity.hbs"),
    )
    .map_err(Box::new)?;
    Ok(())
}

pub fn render_manifest(
    hb: &Handlebars,
    options: &ResolvedAndroidOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("android_manifest", options)?)
}

pub fn render_build_gradle(
    hb: &Handlebars,
    options: &ResolvedAndroidOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("build_gradle", options)?)
}

pub fn render_settings_gradle(
    hb: &Handlebars,
    options: &ResolvedAndroidOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("settings_gradle", options)?)
}

pub fn render_gradle_properties(
    hb: &Handlebars,
    options: &ResolvedAndroidOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("gradle_properties", options)?)
}

pub fn render_strings_xml(
    hb: &Handlebars,
    options: &ResolvedAndroidOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("strings_xml", options)?)
}

pub fn render_main_activity(
    hb: &Handlebars,
    options: &ResolvedAndroidOptions,
) -> Result<String, SynthError> {
    Ok(hb.render("main_activity", options)?)
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

    fn hb() -> Handlebars<'static> {
        let mut hb = Handlebars::new();
        register_templates(&mut hb).unwrap();
        hb
    }

    #[test]
    fn manifest_contains_resolved_permissions() {
        let mut config = BuildConfig::new();
        config.put("app.mainClass", "com.mycompany.ChatApp");
        config.put("app.packageName", "com.mycompany.chat");
        let mut flags = CapabilityFlags::new();
        flags.uses_vibrate = true;
        let options = resolve_options(
            &config,
            &flags,
            &test_app(),
            BuildTarget::AndroidApk,
        )
        .unwrap();
        let manifest = render_manifest(&hb(), &options).unwrap();
        assert!(manifest.contains("android.permission.VIBRATE"));
        assert!(manifest.contains("package=\"com.mycompany.chat\""));
        assert!(manifest.contains("ChatAppActivity"));
    }

    #[test]
    fn release_without_keystore_is_an_input_error() {
        let mut config = BuildConfig::new();
        config.put("android.release", "true");
        let result = resolve_options(
            &config,
            &CapabilityFlags::new(),
            &test_app(),
            BuildTarget::AndroidApk,
        );
        assert!(matches!(result, Err(SynthError::MissingInput(_))));
    }

    #[test]
    fn fcm_wires_google_services_plugin() {
        let config = BuildConfig::new();
        let mut flags = CapabilityFlags::new();
        flags.uses_push = true;
        let options = resolve_options(
            &config,
            &flags,
            &test_app(),
            BuildTarget::AndroidSource,
        )
        .unwrap();
        assert!(options.use_fcm);
        assert!(options
            .plugins
            .iter()
            .any(|p| p == "com.google.gms.google-services"));
        let gradle = render_build_gradle(&hb(), &options).unwrap();
        assert!(gradle.contains("apply plugin: 'com.google.gms.google-services'"));
        assert!(gradle.contains("firebase-messaging"));
    }
}

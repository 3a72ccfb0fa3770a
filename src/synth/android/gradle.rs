use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::config::BuildConfig;
use crate::scan::CapabilityFlags;
use crate::version::DottedVersion;

/// Baseline Play Services version when neither configuration nor any
/// scanned capability raises it.
const DEFAULT_PLAY_SERVICES_VERSION: &str = "12.0.1";

/// Default versions for the optional Google modules, each overridable
/// through its configuration key.
static MODULE_VERSIONS: Lazy<BTreeMap<&'static str, ModuleVersion>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "play-services-location",
            ModuleVersion::new("android.playServicesLocationVersion", "21.0.1"),
        ),
        (
            "play-services-maps",
            ModuleVersion::new("android.playServicesMapsVersion", "18.2.0"),
        ),
        (
            "play-services-auth",
            ModuleVersion::new("android.playServicesAuthVersion", "20.7.0"),
        ),
        (
            "firebase-core",
            ModuleVersion::new("android.firebaseCoreVersion", "21.1.1"),
        ),
        (
            "firebase-messaging",
            ModuleVersion::new("android.firebaseMessagingVersion", "23.4.0"),
        ),
    ])
});

#[derive(Debug, Clone)]
struct ModuleVersion {
    config_key: &'static str,
    default: &'static str,
}

impl ModuleVersion {
    fn new(config_key: &'static str, default: &'static str) -> Self {
        Self {
            config_key,
            default,
        }
    }

    fn resolve(&self, config: &BuildConfig) -> String {
        config.get(self.config_key, self.default)
    }
}

pub fn module_version(config: &BuildConfig, module: &str) -> String {
    match MODULE_VERSIONS.get(module) {
        Some(version) => version.resolve(config),
        None => DEFAULT_PLAY_SERVICES_VERSION.to_string(),
    }
}

/// Resolves the effective Play Services version: explicit configuration
/// wins, then the scanner-raised floor, then the default; finally any
/// `*.minPlayServicesVersion` key sweeps the result upward.
pub fn resolve_play_services_version(config: &BuildConfig, flags: &CapabilityFlags) -> String {
    let mut version = match config.get_opt("android.playServicesVersion") {
        Some(explicit) => DottedVersion::parse(&explicit),
        None => flags
            .min_play_services
            .clone()
            .unwrap_or_else(|| DottedVersion::parse(DEFAULT_PLAY_SERVICES_VERSION)),
    };

    for key in config.keys().map(str::to_string).collect::<Vec<_>>() {
        if !key.ends_with(".minPlayServicesVersion") {
            continue;
        }
        if let Some(value) = config.get_opt(&key) {
            let floor = DottedVersion::parse(&value);
            if floor > version {
                debug!("Play Services version raised to {floor} by {key}");
                version = floor;
            }
        }
    }
    version.to_string()
}

/// Resolves the Gradle dependency lines: framework runtime, capability
/// modules, messaging, and any explicitly requested extras, deduplicated
/// by coordinate.
pub fn resolve_dependencies(
    config: &BuildConfig,
    flags: &CapabilityFlags,
    use_fcm: bool,
    use_androidx: bool,
) -> Vec<String> {
    let configuration = if use_androidx {
        "implementation"
    } else {
        "compile"
    };
    let mut lines: Vec<String> = Vec::new();
    let mut push_dep = |coordinate: String| {
        let line = format!("{configuration} \"{coordinate}\"");
        if !lines.contains(&line) {
            lines.push(line);
        }
    };

    push_dep(format!(
        "com.appforge:runtime-android:{}",
        config.get("android.runtimeVersion", "1.0.0")
    ));
    if use_androidx {
        push_dep("androidx.appcompat:appcompat:1.6.1".to_string());
        push_dep("androidx.core:core:1.12.0".to_string());
    } else {
        push_dep("com.android.support:appcompat-v7:28.0.0".to_string());
    }

    if config.get_bool("android.includeGPlayServices", false) {
        // Blanket Play Services: one umbrella artifact at the resolved
        // version floor.
        push_dep(format!(
            "com.google.android.gms:play-services:{}",
            resolve_play_services_version(config, flags)
        ));
    } else if flags.uses_play_services_location {
        push_dep(format!(
            "com.google.android.gms:play-services-location:{}",
            module_version(config, "play-services-location")
        ));
    }
    if config.get_bool("android.includeMaps", false) {
        push_dep(format!(
            "com.google.android.gms:play-services-maps:{}",
            module_version(config, "play-services-maps")
        ));
    }
    if flags.uses_accounts || config.get_bool("android.playServicesAuth", false) {
        push_dep(format!(
            "com.google.android.gms:play-services-auth:{}",
            module_version(config, "play-services-auth")
        ));
    }
    if use_fcm {
        push_dep(format!(
            "com.google.firebase:firebase-core:{}",
            module_version(config, "firebase-core")
        ));
        push_dep(format!(
            "com.google.firebase:firebase-messaging:{}",
            module_version(config, "firebase-messaging")
        ));
    }

    // Application-requested dependency lines are taken verbatim.
    if let Some(extra) = config.get_opt("android.gradleDependencies") {
        for line in extra.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !lines.iter().any(|existing| existing == line) {
                lines.push(line.to_string());
            }
        }
    }
    lines
}

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::BuildConfig;
use crate::scan::CapabilityFlags;

/// One `<uses-permission>` declaration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionDecl {
    pub name: String,
    pub max_sdk: Option<u64>,
}

/// One `<uses-feature>` declaration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeatureDecl {
    pub name: String,
    pub required: bool,
}

/// Accumulates permission declarations, suppressing duplicates by
/// normalized permission name regardless of which source requested them.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    permissions: BTreeMap<String, PermissionDecl>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str) {
        self.add_decl(PermissionDecl {
            name: name.to_string(),
            max_sdk: None,
        });
    }

    pub fn add_decl(&mut self, decl: PermissionDecl) {
        let key = decl.name.trim().to_string();
        if self.permissions.contains_key(&key) {
            debug!("Suppressing duplicate permission declaration {key}");
            return;
        }
        self.permissions.insert(key, decl);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.permissions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn into_sorted(self) -> Vec<PermissionDecl> {
        self.permissions.into_values().collect()
    }
}

/// One optional capability: the configuration key that can force it either
/// way, the scanner flag consulted when the configuration is silent, and
/// the permissions it implies.
struct CapabilityPermission {
    config_key: &'static str,
    flag: fn(&CapabilityFlags) -> bool,
    permissions: &'static [&'static str],
}

const CAPABILITY_PERMISSIONS: &[CapabilityPermission] = &[
    CapabilityPermission {
        config_key: "android.gpsPermission",
        flag: |f| f.uses_location,
        permissions: &[
            "android.permission.ACCESS_FINE_LOCATION",
            "android.permission.ACCESS_COARSE_LOCATION",
        ],
    },
    CapabilityPermission {
        config_key: "android.backgroundLocationPermission",
        flag: |f| f.uses_background_location,
        permissions: &["android.permission.ACCESS_BACKGROUND_LOCATION"],
    },
    CapabilityPermission {
        config_key: "android.capturePermission",
        flag: |f| f.uses_capture,
        permissions: &["android.permission.CAMERA"],
    },
    CapabilityPermission {
        config_key: "android.recordAudioPermission",
        flag: |f| f.uses_record_audio,
        permissions: &["android.permission.RECORD_AUDIO"],
    },
    CapabilityPermission {
        config_key: "android.pushPermission",
        flag: |f| f.uses_push,
        permissions: &[
            "com.google.android.c2dm.permission.RECEIVE",
            "android.permission.WAKE_LOCK",
        ],
    },
    CapabilityPermission {
        config_key: "android.foregroundServicePermission",
        flag: |f| f.needs_foreground_service,
        permissions: &["android.permission.FOREGROUND_SERVICE"],
    },
    CapabilityPermission {
        config_key: "android.readContactsPermission",
        flag: |f| f.uses_contacts_read,
        permissions: &["android.permission.READ_CONTACTS"],
    },
    CapabilityPermission {
        config_key: "android.writeContactsPermission",
        flag: |f| f.uses_contacts_write,
        permissions: &["android.permission.WRITE_CONTACTS"],
    },
    CapabilityPermission {
        config_key: "android.billingPermission",
        flag: |f| f.uses_billing,
        permissions: &["com.android.vending.BILLING"],
    },
    CapabilityPermission {
        config_key: "android.phonePermission",
        flag: |f| f.uses_phone,
        permissions: &["android.permission.READ_PHONE_STATE"],
    },
    CapabilityPermission {
        config_key: "android.vibratePermission",
        flag: |f| f.uses_vibrate,
        permissions: &["android.permission.VIBRATE"],
    },
    CapabilityPermission {
        config_key: "android.wakeLockPermission",
        flag: |f| f.uses_wake_lock,
        permissions: &["android.permission.WAKE_LOCK"],
    },
    CapabilityPermission {
        config_key: "android.bootCompletedPermission",
        flag: |f| f.uses_boot_completed,
        permissions: &["android.permission.RECEIVE_BOOT_COMPLETED"],
    },
    CapabilityPermission {
        config_key: "android.getAccountsPermission",
        flag: |f| f.uses_accounts,
        permissions: &["android.permission.GET_ACCOUNTS"],
    },
];

static XML_PERMISSION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"android:name\s*=\s*"([^"]+)""#).expect("static regex"));

/// Resolves the full permission set. For every capability the explicit
/// configuration key wins when present (either direction), otherwise the
/// scanner-derived flag decides, otherwise the capability stays off. The
/// baseline networking permissions are unconditional.
pub fn resolve_permissions(config: &BuildConfig, flags: &CapabilityFlags) -> PermissionSet {
    let mut set = PermissionSet::new();
    set.add("android.permission.INTERNET");
    set.add("android.permission.ACCESS_NETWORK_STATE");

    for capability in CAPABILITY_PERMISSIONS {
        let enabled = match config.get_opt(capability.config_key) {
            Some(value) => value == "true",
            None => (capability.flag)(flags),
        };
        if enabled {
            for permission in capability.permissions {
                set.add(permission);
            }
        }
    }

    // Raw extra declarations supplied by the application, deduplicated
    // against everything resolved above by parsing out the names.
    if let Some(extra) = config.get_opt("android.xpermissions") {
        for capture in XML_PERMISSION_NAME.captures_iter(&extra) {
            set.add(&capture[1]);
        }
    }

    set
}

pub fn resolve_features(config: &BuildConfig, flags: &CapabilityFlags) -> Vec<FeatureDecl> {
    let mut features = Vec::new();
    let camera = match config.get_opt("android.capturePermission") {
        Some(value) => value == "true",
        None => flags.uses_capture,
    };
    if camera {
        features.push(FeatureDecl {
            name: "android.hardware.camera".to_string(),
            required: false,
        });
    }
    let location = match config.get_opt("android.gpsPermission") {
        Some(value) => value == "true",
        None => flags.uses_location,
    };
    if location {
        features.push(FeatureDecl {
            name: "android.hardware.location.gps".to_string(),
            required: false,
        });
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_flag_enables_permission() {
        let config = BuildConfig::new();
        let mut flags = CapabilityFlags::new();
        flags.uses_location = true;
        let set = resolve_permissions(&config, &flags);
        assert!(set.contains("android.permission.ACCESS_FINE_LOCATION"));
    }

    #[test]
    fn explicit_config_overrides_scanner_flag() {
        let mut config = BuildConfig::new();
        config.put("android.gpsPermission", "false");
        let mut flags = CapabilityFlags::new();
        flags.uses_location = true;
        let set = resolve_permissions(&config, &flags);
        assert!(!set.contains("android.permission.ACCESS_FINE_LOCATION"));
    }

    #[test]
    fn duplicate_requests_produce_one_declaration() {
        let mut config = BuildConfig::new();
        config.put("android.gpsPermission", "true");
        config.put(
            "android.xpermissions",
            r#"<uses-permission android:name="android.permission.ACCESS_FINE_LOCATION"/>"#,
        );
        let mut flags = CapabilityFlags::new();
        flags.uses_location = true;
        let set = resolve_permissions(&config, &flags);
        let count = set
            .into_sorted()
            .iter()
            .filter(|p| p.name == "android.permission.ACCESS_FINE_LOCATION")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn baseline_permissions_always_present() {
        let set = resolve_permissions(&BuildConfig::new(), &CapabilityFlags::new());
        assert!(set.contains("android.permission.INTERNET"));
        assert!(set.contains("android.permission.ACCESS_NETWORK_STATE"));
    }
}

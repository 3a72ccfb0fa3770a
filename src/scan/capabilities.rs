use tracing::debug;

use crate::version::DottedVersion;

use super::UsageObserver;

/// Play Services floor forced by geofencing support.
const GEOFENCE_MIN_PLAY_SERVICES: &str = "12.0.1";

/// Per-build capability record, derived entirely from the usage scan.
/// Flags are monotonic: once a scan callback sets one, nothing resets it.
/// Downstream feature resolution reads this next to the explicit
/// configuration, with configuration taking precedence.
#[derive(Debug, Clone, Default)]
pub struct CapabilityFlags {
    pub uses_capture: bool,
    pub uses_push: bool,
    pub needs_foreground_service: bool,
    pub uses_location: bool,
    pub uses_background_location: bool,
    pub uses_play_services_location: bool,
    pub uses_contacts_read: bool,
    pub uses_contacts_write: bool,
    pub uses_billing: bool,
    pub uses_phone: bool,
    pub uses_vibrate: bool,
    pub uses_wake_lock: bool,
    pub uses_remote_control: bool,
    pub uses_record_audio: bool,
    pub uses_boot_completed: bool,
    pub uses_accounts: bool,
    pub min_play_services: Option<DottedVersion>,
}

impl CapabilityFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise_min_play_services(&mut self, version: &str) {
        let candidate = DottedVersion::parse(version);
        let raise = match &self.min_play_services {
            Some(current) => candidate > *current,
            None => true,
        };
        if raise {
            debug!("Raising Play Services floor to {candidate}");
            self.min_play_services = Some(candidate);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    /// Matches any reported type whose internal name starts with the prefix.
    TypePrefix(&'static str),
    /// Matches any reported type whose internal name contains the fragment.
    TypeContains(&'static str),
    /// Matches a reported (owner, method) pair: owner by prefix, method name
    /// by any of the given fragments.
    Method {
        owner_prefix: &'static str,
        name_fragments: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
enum Effect {
    Capture,
    BootCompleted,
    Phone,
    Location,
    Push,
    ContactsRead,
    ContactsWrite,
    Billing,
    Accounts,
    Vibrate,
    WakeLock,
    RemoteControl,
    RecordAudio,
    /// Foreground-service permission is only a thing from target SDK 28 on.
    ForegroundServiceWhenTarget28,
    /// Geofencing pulls in Play Services location unless Play Services are
    /// already blanket-enabled by configuration.
    GeofencePlayServices,
    BackgroundLocationWhenTarget29,
}

struct Rule {
    pattern: Pattern,
    effects: &'static [Effect],
}

/// The capability rule table: the translation from code shape to platform
/// feature usage. Rules fire independently and may fire many times.
const RULES: &[Rule] = &[
    Rule {
        pattern: Pattern::TypePrefix("com/appforge/notifications"),
        effects: &[Effect::BootCompleted],
    },
    Rule {
        pattern: Pattern::TypePrefix("com/appforge/capture"),
        effects: &[Effect::Capture],
    },
    Rule {
        pattern: Pattern::TypePrefix("com/appforge/ads"),
        effects: &[Effect::Phone],
    },
    Rule {
        pattern: Pattern::TypePrefix("com/appforge/components/Ads"),
        effects: &[Effect::Phone],
    },
    Rule {
        pattern: Pattern::TypePrefix("com/appforge/maps"),
        effects: &[Effect::Location],
    },
    Rule {
        pattern: Pattern::TypePrefix("com/appforge/location"),
        effects: &[Effect::Location],
    },
    Rule {
        pattern: Pattern::TypeContains("com/appforge/push"),
        effects: &[Effect::Push, Effect::ForegroundServiceWhenTarget28],
    },
    Rule {
        pattern: Pattern::TypeContains("com/appforge/contacts"),
        effects: &[Effect::ContactsRead],
    },
    Rule {
        pattern: Pattern::TypeContains("com/appforge/payment"),
        effects: &[Effect::Billing],
    },
    Rule {
        pattern: Pattern::TypeContains("com/appforge/location/Geofence"),
        effects: &[
            Effect::GeofencePlayServices,
            Effect::BackgroundLocationWhenTarget29,
        ],
    },
    Rule {
        pattern: Pattern::TypeContains("com/appforge/social"),
        effects: &[Effect::Accounts],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["vibrate", "notifyStatusBar"],
        },
        effects: &[Effect::Vibrate],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/media/MediaManager",
            name_fragments: &["createBackgroundMedia"],
        },
        effects: &[Effect::ForegroundServiceWhenTarget28],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["createBackgroundMedia"],
        },
        effects: &[Effect::ForegroundServiceWhenTarget28],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/location/LocationManager",
            name_fragments: &["addGeoFencing", "setBackgroundLocationListener"],
        },
        effects: &[Effect::BackgroundLocationWhenTarget29],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/location/LocationManager",
            name_fragments: &["addGeoFencing", "getLocationManager"],
        },
        effects: &[Effect::GeofencePlayServices],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/media/MediaManager",
            name_fragments: &["setRemoteControlListener"],
        },
        effects: &[Effect::WakeLock, Effect::RemoteControl],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["getUdid", "getMsisdn"],
        },
        effects: &[Effect::Phone],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["getAllContacts"],
        },
        effects: &[Effect::ContactsRead],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["lockScreen", "setScreenSaverEnabled"],
        },
        effects: &[Effect::WakeLock],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/media/MediaManager",
            name_fragments: &["createMediaRecorder"],
        },
        effects: &[Effect::RecordAudio],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["createMediaRecorder"],
        },
        effects: &[Effect::RecordAudio],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/ui/Display",
            name_fragments: &["createContact", "deleteContact"],
        },
        effects: &[Effect::ContactsWrite],
    },
    Rule {
        pattern: Pattern::Method {
            owner_prefix: "com/appforge/contacts/ContactsManager",
            name_fragments: &["createContact", "deleteContact"],
        },
        effects: &[Effect::ContactsWrite],
    },
];

/// Scanner observer that folds matched rules into a [`CapabilityFlags`]
/// record. Register one of these per scan.
pub struct FlagObserver<'a> {
    flags: &'a mut CapabilityFlags,
    target_sdk: u64,
    play_services_blanket: bool,
}

impl<'a> FlagObserver<'a> {
    /// `play_services_blanket` reflects an explicit configuration choice to
    /// enable Play Services wholesale, which makes the per-feature Play
    /// Services upgrades redundant.
    pub fn new(flags: &'a mut CapabilityFlags, target_sdk: u64, play_services_blanket: bool) -> Self {
        Self {
            flags,
            target_sdk,
            play_services_blanket,
        }
    }

    fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Capture => self.flags.uses_capture = true,
                Effect::BootCompleted => self.flags.uses_boot_completed = true,
                Effect::Phone => self.flags.uses_phone = true,
                Effect::Location => self.flags.uses_location = true,
                Effect::Push => self.flags.uses_push = true,
                Effect::ContactsRead => self.flags.uses_contacts_read = true,
                Effect::ContactsWrite => self.flags.uses_contacts_write = true,
                Effect::Billing => self.flags.uses_billing = true,
                Effect::Accounts => self.flags.uses_accounts = true,
                Effect::Vibrate => self.flags.uses_vibrate = true,
                Effect::WakeLock => self.flags.uses_wake_lock = true,
                Effect::RemoteControl => {
                    self.flags.uses_wake_lock = true;
                    self.flags.uses_remote_control = true;
                }
                Effect::RecordAudio => self.flags.uses_record_audio = true,
                Effect::ForegroundServiceWhenTarget28 => {
                    if self.target_sdk >= 28 {
                        self.flags.needs_foreground_service = true;
                    }
                }
                Effect::GeofencePlayServices => {
                    if !self.play_services_blanket {
                        self.flags.uses_play_services_location = true;
                        self.flags
                            .raise_min_play_services(GEOFENCE_MIN_PLAY_SERVICES);
                    }
                }
                Effect::BackgroundLocationWhenTarget29 => {
                    if !self.play_services_blanket && self.target_sdk >= 29 {
                        self.flags.uses_background_location = true;
                    }
                }
            }
        }
    }
}

impl UsageObserver for FlagObserver<'_> {
    fn on_type_used(&mut self, name: &str) {
        for rule in RULES {
            let matched = match rule.pattern {
                Pattern::TypePrefix(prefix) => name.starts_with(prefix),
                Pattern::TypeContains(fragment) => name.contains(fragment),
                Pattern::Method { .. } => false,
            };
            if matched {
                self.apply(rule.effects);
            }
        }
    }

    fn on_method_used(&mut self, owner: &str, method: &str) {
        for rule in RULES {
            if let Pattern::Method {
                owner_prefix,
                name_fragments,
            } = rule.pattern
            {
                if owner.starts_with(owner_prefix)
                    && name_fragments.iter().any(|f| method.contains(f))
                {
                    self.apply(rule.effects);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_type_sets_push_and_foreground_service_on_28() {
        let mut flags = CapabilityFlags::new();
        let mut observer = FlagObserver::new(&mut flags, 28, false);
        observer.on_type_used("com/appforge/push/PushListener");
        assert!(flags.uses_push);
        assert!(flags.needs_foreground_service);
    }

    #[test]
    fn push_type_on_old_target_skips_foreground_service() {
        let mut flags = CapabilityFlags::new();
        let mut observer = FlagObserver::new(&mut flags, 27, false);
        observer.on_type_used("com/appforge/push/PushListener");
        assert!(flags.uses_push);
        assert!(!flags.needs_foreground_service);
    }

    #[test]
    fn geofence_raises_play_services_floor_unless_blanket() {
        let mut flags = CapabilityFlags::new();
        let mut observer = FlagObserver::new(&mut flags, 29, false);
        observer.on_type_used("com/appforge/location/Geofence");
        assert!(flags.uses_play_services_location);
        assert!(flags.uses_background_location);
        assert_eq!(
            flags.min_play_services.as_ref().map(|v| v.as_str()),
            Some("12.0.1")
        );

        let mut flags = CapabilityFlags::new();
        let mut observer = FlagObserver::new(&mut flags, 29, true);
        observer.on_type_used("com/appforge/location/Geofence");
        assert!(!flags.uses_play_services_location);
        assert!(flags.min_play_services.is_none());
    }

    #[test]
    fn display_methods_map_to_flags() {
        let mut flags = CapabilityFlags::new();
        let mut observer = FlagObserver::new(&mut flags, 33, false);
        observer.on_method_used("com/appforge/ui/Display", "vibrate");
        observer.on_method_used("com/appforge/ui/Display", "getUdid");
        observer.on_method_used("com/appforge/ui/Display", "createContact");
        assert!(flags.uses_vibrate);
        assert!(flags.uses_phone);
        assert!(flags.uses_contacts_write);
        assert!(!flags.uses_location);
    }

    #[test]
    fn unrelated_types_set_nothing() {
        let mut flags = CapabilityFlags::new();
        let mut observer = FlagObserver::new(&mut flags, 33, false);
        observer.on_type_used("java/util/ArrayList");
        observer.on_method_used("java/util/ArrayList", "add");
        assert!(!flags.uses_push);
        assert!(!flags.uses_location);
        assert!(!flags.uses_phone);
    }
}

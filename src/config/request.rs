use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Flat build configuration: dotted keys (`android.targetSDKVersion`) mapped
/// to string values. Boolean-valued keys use the literal strings
/// `"true"`/`"false"`. Values may embed `${var.NAME}` or
/// `${var.NAME:default}` placeholders which are resolved recursively against
/// other keys on every read.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    args: BTreeMap<String, String>,
}

impl BuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a properties-style file: one `key=value` per line, `#` and `!`
    /// comment lines, blank lines ignored. A line without `=` becomes a key
    /// with an empty value.
    pub fn from_properties_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_properties(&text))
    }

    pub fn from_properties(text: &str) -> Self {
        let mut config = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => config.put(key.trim(), value.trim()),
                None => config.put(line, ""),
            }
        }
        config
    }

    /// Sets an argument, replacing any previous value. Used both at load time
    /// and by the capability scan when inferred usage upgrades a setting.
    pub fn put(&mut self, key: &str, value: &str) {
        self.args.insert(key.to_string(), value.to_string());
    }

    /// Returns the expanded value for `key`, or `default` when unset.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.get_opt(key)
            .unwrap_or_else(|| self.expand(default, &mut HashSet::new()))
    }

    /// Returns the expanded value for `key`, or `None` when unset.
    pub fn get_opt(&self, key: &str) -> Option<String> {
        let raw = self.args.get(key)?;
        // The key being read is already on the resolution path, so a value
        // referring back to itself reads as unset instead of recursing.
        let mut resolving = HashSet::new();
        resolving.insert(key.to_string());
        Some(self.expand(raw, &mut resolving))
    }

    /// `true` iff the key is set to the literal string `"true"`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_opt(key) {
            Some(v) => v == "true",
            None => default,
        }
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    /// Iterates raw key names, e.g. to sweep `*.minPlayServicesVersion`.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }

    /// Resolves `${var.NAME}` / `${var.NAME:default}` placeholders. Set keys
    /// substitute their (recursively expanded) value; unset keys substitute
    /// the expanded default when one is given, otherwise the placeholder is
    /// left verbatim. Self-referential chains terminate: a key already on
    /// the resolution path reads as unset.
    fn expand(&self, raw: &str, resolving: &mut HashSet<String>) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("${var.") {
            out.push_str(&rest[..start]);
            let body_start = start + "${var.".len();
            let Some(end) = rest[body_start..].find('}') else {
                // Unterminated placeholder, emit as-is.
                out.push_str(&rest[start..]);
                return out;
            };
            let body = &rest[body_start..body_start + end];
            let (name, default) = match body.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };
            let resolved = if resolving.contains(name) {
                None
            } else {
                self.args.get(name).map(|value| {
                    resolving.insert(name.to_string());
                    let expanded = self.expand(value, resolving);
                    resolving.remove(name);
                    expanded
                })
            };
            match resolved {
                Some(value) => out.push_str(&value),
                None => match default {
                    Some(default) => out.push_str(&self.expand(default, resolving)),
                    None => {
                        debug!("Leaving unresolved placeholder ${{var.{name}}} in place");
                        out.push_str(&rest[start..body_start + end + 1]);
                    }
                },
            }
            rest = &rest[body_start + end + 1..];
        }
        out.push_str(rest);
        out
    }
}

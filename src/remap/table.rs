use std::collections::BTreeMap;

use super::RemapError;

/// Old-name to new-name dictionary, immutable after load. Class names are
/// held in JVM internal form for pool rewriting; the dotted and artifact
/// views drive the source-text migration.
#[derive(Debug, Clone, Default)]
pub struct RemappingTable {
    classes: BTreeMap<String, String>,
    dotted_classes: BTreeMap<String, String>,
    artifacts: BTreeMap<String, String>,
}

impl RemappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The small always-on shim table correcting historically renamed
    /// framework compatibility classes.
    pub fn default_compat() -> Self {
        let mut table = Self::new();
        table.insert_class("java/util/Objects", "com/appforge/compat/java/util/Objects");
        table
    }

    /// The bundled support-library to AndroidX migration data.
    pub fn embedded_migration() -> Result<Self, RemapError> {
        Self::from_csv(
            include_str!("data/androidx-class-mapping.csv"),
            "androidx-class-mapping.csv",
            include_str!("data/androidx-artifact-mapping.csv"),
            "androidx-artifact-mapping.csv",
        )
    }

    /// Parses `old,new` CSV data (first line is a header). Dotted class
    /// names are accepted and indexed in both dotted and internal form. A
    /// malformed line fails the whole load: a half-applied migration is
    /// worse than none.
    pub fn from_csv(
        class_csv: &str,
        class_origin: &str,
        artifact_csv: &str,
        artifact_origin: &str,
    ) -> Result<Self, RemapError> {
        let mut table = Self::new();
        for (old, new) in parse_csv_pairs(class_csv, class_origin)? {
            table.insert_class(&old.replace('.', "/"), &new.replace('.', "/"));
        }
        for (old, new) in parse_csv_pairs(artifact_csv, artifact_origin)? {
            table.artifacts.insert(old, new);
        }
        Ok(table)
    }

    pub fn insert_class(&mut self, old: &str, new: &str) {
        self.classes.insert(old.to_string(), new.to_string());
        self.dotted_classes
            .insert(old.replace('/', "."), new.replace('/', "."));
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.artifacts.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Rewrites a `Class` entry name: a plain internal name, or an array
    /// descriptor when the constant refers to an array type.
    pub fn rewrite_class_name(&self, name: &str) -> Option<String> {
        if name.starts_with('[') {
            return self.rewrite_descriptor(name);
        }
        self.classes.get(name).cloned()
    }

    /// Rewrites every `L<name>;` token of a field or method descriptor.
    /// Returns `None` when nothing matched.
    pub fn rewrite_descriptor(&self, descriptor: &str) -> Option<String> {
        let mut out = String::with_capacity(descriptor.len());
        let mut changed = false;
        let mut rest = descriptor;
        while let Some(start) = rest.find('L') {
            let Some(end) = rest[start..].find(';') else {
                // Malformed tail; reproduce it untouched.
                out.push_str(rest);
                return changed.then_some(out);
            };
            out.push_str(&rest[..=start]);
            let name = &rest[start + 1..start + end];
            match self.classes.get(name) {
                Some(mapped) => {
                    out.push_str(mapped);
                    changed = true;
                }
                None => out.push_str(name),
            }
            out.push(';');
            rest = &rest[start + end + 1..];
        }
        out.push_str(rest);
        changed.then_some(out)
    }

    /// Rewrites class names inside a generic signature. Signatures extend
    /// descriptors with type arguments (`Ljava/util/List<Lcom/x/Y;>;`),
    /// type variables (`TT;`), and dotted inner-class suffixes.
    pub fn rewrite_signature(&self, signature: &str) -> Option<String> {
        let bytes = signature.as_bytes();
        let mut out = String::with_capacity(signature.len());
        let mut changed = false;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'L' => {
                    let name_start = i + 1;
                    let mut j = name_start;
                    while j < bytes.len() && bytes[j] != b';' && bytes[j] != b'<' {
                        j += 1;
                    }
                    let name = &signature[name_start..j];
                    out.push('L');
                    match self.map_signature_name(name) {
                        Some(mapped) => {
                            out.push_str(&mapped);
                            changed = true;
                        }
                        None => out.push_str(name),
                    }
                    i = j;
                }
                b'T' => {
                    // Type variable: copy through to its terminator.
                    let mut j = i;
                    while j < bytes.len() && bytes[j] != b';' {
                        j += 1;
                    }
                    out.push_str(&signature[i..j.min(bytes.len())]);
                    i = j;
                }
                c => {
                    out.push(c as char);
                    i += 1;
                }
            }
        }
        changed.then_some(out)
    }

    /// A signature class name may carry a dotted inner-class suffix that is
    /// not part of the mapped top-level name.
    fn map_signature_name(&self, name: &str) -> Option<String> {
        if let Some(mapped) = self.classes.get(name) {
            return Some(mapped.clone());
        }
        let (outer, inner) = name.split_once('.')?;
        let mapped = self.classes.get(outer)?;
        Some(format!("{mapped}.{inner}"))
    }

    /// Replaces dependency coordinates in build-script text.
    pub fn replace_artifacts(&self, text: &str) -> Option<String> {
        replace_all(text, &self.artifacts)
    }

    /// Replaces dotted class names in source and markup text.
    pub fn replace_dotted_classes(&self, text: &str) -> Option<String> {
        replace_all(text, &self.dotted_classes)
    }
}

fn replace_all(text: &str, replacements: &BTreeMap<String, String>) -> Option<String> {
    let mut out = text.to_string();
    let mut changed = false;
    for (old, new) in replacements {
        if out.contains(old.as_str()) {
            out = out.replace(old.as_str(), new);
            changed = true;
        }
    }
    changed.then_some(out)
}

fn parse_csv_pairs(csv: &str, origin: &str) -> Result<Vec<(String, String)>, RemapError> {
    let mut pairs = Vec::new();
    for (line_no, line) in csv.lines().enumerate() {
        let line = line.trim();
        if line_no == 0 || line.is_empty() {
            continue;
        }
        let Some((old, new)) = line.split_once(',') else {
            return Err(RemapError::MalformedMapping {
                origin: origin.to_string(),
                line: line_no + 1,
            });
        };
        let (old, new) = (old.trim(), new.trim());
        if old.is_empty() || new.is_empty() {
            return Err(RemapError::MalformedMapping {
                origin: origin.to_string(),
                line: line_no + 1,
            });
        }
        pairs.push((old.to_string(), new.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support_table() -> RemappingTable {
        let mut table = RemappingTable::new();
        table.insert_class(
            "android/support/v4/app/Fragment",
            "androidx/fragment/app/Fragment",
        );
        table
    }

    #[test]
    fn rewrites_plain_and_array_class_names() {
        let table = support_table();
        assert_eq!(
            table.rewrite_class_name("android/support/v4/app/Fragment"),
            Some("androidx/fragment/app/Fragment".to_string())
        );
        assert_eq!(
            table.rewrite_class_name("[Landroid/support/v4/app/Fragment;"),
            Some("[Landroidx/fragment/app/Fragment;".to_string())
        );
        assert_eq!(table.rewrite_class_name("com/other/Thing"), None);
    }

    #[test]
    fn rewrites_descriptor_tokens_only() {
        let table = support_table();
        assert_eq!(
            table.rewrite_descriptor("(ILandroid/support/v4/app/Fragment;)Ljava/lang/String;"),
            Some("(ILandroidx/fragment/app/Fragment;)Ljava/lang/String;".to_string())
        );
        assert_eq!(table.rewrite_descriptor("(IJ)V"), None);
    }

    #[test]
    fn rewrites_generic_signatures() {
        let table = support_table();
        assert_eq!(
            table.rewrite_signature("Ljava/util/List<Landroid/support/v4/app/Fragment;>;"),
            Some("Ljava/util/List<Landroidx/fragment/app/Fragment;>;".to_string())
        );
        assert_eq!(table.rewrite_signature("TT;"), None);
    }

    #[test]
    fn malformed_csv_fails_closed() {
        let result = RemappingTable::from_csv("header\nno-comma-here\n", "classes.csv", "", "a");
        assert!(matches!(
            result,
            Err(RemapError::MalformedMapping { line: 2, .. })
        ));
    }

    #[test]
    fn embedded_migration_data_parses() {
        let table = RemappingTable::embedded_migration().unwrap();
        assert!(table.class_count() > 10);
        assert!(table.artifact_count() > 5);
    }
}

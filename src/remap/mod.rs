//! Symbol remapping: pure renames of class references across a tree of
//! compiled units, plus the matching source-text migration for generated
//! files. Used always-on for a small compatibility shim table and opt-in
//! for the large support-library to AndroidX namespace migration.

mod table;

pub use table::RemappingTable;

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::classfile::{parse_code_attribute, ClassFileError, Constant, ObjectCodeUnit};

#[derive(Error, Debug)]
pub enum RemapError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed mapping data in {origin} at line {line}")]
    MalformedMapping { origin: String, line: usize },

    #[error("Failed to rewrite class file {path}: {source}")]
    ClassFile {
        path: String,
        source: ClassFileError,
    },

    #[error("Failed to rewrite archive {path}: {source}")]
    Archive {
        path: String,
        source: zip::result::ZipError,
    },
}

/// Build-scoped owner of loaded mapping tables. Tables are memoized by the
/// digest of their data files, so a table reloads only when the underlying
/// file actually changes.
#[derive(Default)]
pub struct RemapContext {
    cached: Option<(Vec<u8>, Arc<RemappingTable>)>,
}

impl RemapContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the namespace-migration table from CSV data files, reusing the
    /// previous load when the file contents are unchanged. Any malformed
    /// line fails the load before a single unit is rewritten.
    pub fn migration_table(
        &mut self,
        class_csv: &Path,
        artifact_csv: &Path,
    ) -> Result<Arc<RemappingTable>, RemapError> {
        let class_text = read_to_string(class_csv)?;
        let artifact_text = read_to_string(artifact_csv)?;
        let mut hasher = Sha256::new();
        hasher.update(class_text.as_bytes());
        hasher.update(artifact_text.as_bytes());
        let digest = hasher.finalize().to_vec();

        if let Some((cached_digest, table)) = &self.cached {
            if *cached_digest == digest {
                debug!("Reusing memoized migration table");
                return Ok(table.clone());
            }
        }

        let table = Arc::new(RemappingTable::from_csv(
            &class_text,
            &class_csv.display().to_string(),
            &artifact_text,
            &artifact_csv.display().to_string(),
        )?);
        info!(
            "Loaded migration table: {} class mappings, {} artifact mappings",
            table.class_count(),
            table.artifact_count()
        );
        self.cached = Some((digest, table.clone()));
        Ok(table)
    }
}

fn read_to_string(path: &Path) -> Result<String, RemapError> {
    std::fs::read_to_string(path).map_err(|source| RemapError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Rewrites every mapped reference in one unit's constant pool. Only UTF-8
/// entries in a class-name, descriptor, or signature role are touched; the
/// rest of the class file is reproduced byte for byte. Returns whether
/// anything changed.
pub fn remap_unit(
    unit: &mut ObjectCodeUnit,
    table: &RemappingTable,
) -> Result<bool, ClassFileError> {
    if table.is_empty() {
        return Ok(false);
    }

    let mut class_names: HashSet<u16> = HashSet::new();
    let mut descriptors: HashSet<u16> = HashSet::new();
    let mut signatures: HashSet<u16> = HashSet::new();

    for index in unit.pool.indices() {
        match unit.pool.entry(index) {
            Some(Constant::Class { name_index }) => {
                class_names.insert(*name_index);
            }
            Some(Constant::NameAndType {
                descriptor_index, ..
            })
            | Some(Constant::MethodType { descriptor_index }) => {
                descriptors.insert(*descriptor_index);
            }
            _ => {}
        }
    }

    collect_signature_indices(unit, &unit.attributes, &mut signatures);
    for member in unit.fields.iter().chain(unit.methods.iter()) {
        descriptors.insert(member.descriptor_index);
        collect_signature_indices(unit, &member.attributes, &mut signatures);
    }
    for method in &unit.methods {
        let Some(code) = unit.code_attribute(method) else {
            continue;
        };
        let code = parse_code_attribute(code)?;
        for &(name_index, data) in &code.attributes {
            match unit.pool.utf8(name_index).as_deref() {
                Some("LocalVariableTable") => {
                    collect_local_variable_indices(data, &mut descriptors)?;
                }
                Some("LocalVariableTypeTable") => {
                    collect_local_variable_indices(data, &mut signatures)?;
                }
                _ => {}
            }
        }
    }

    let mut changed = false;
    let mut apply = |index: u16, rewrite: &dyn Fn(&str) -> Option<String>| {
        let Some(current) = unit.pool.utf8(index).map(|c| c.into_owned()) else {
            return;
        };
        if let Some(rewritten) = rewrite(&current) {
            unit.pool.set_utf8(index, rewritten.into_bytes());
            changed = true;
        }
    };
    for index in class_names {
        apply(index, &|name| table.rewrite_class_name(name));
    }
    for index in descriptors {
        apply(index, &|desc| table.rewrite_descriptor(desc));
    }
    for index in signatures {
        apply(index, &|sig| table.rewrite_signature(sig));
    }
    Ok(changed)
}

fn collect_signature_indices(
    unit: &ObjectCodeUnit,
    attributes: &[crate::classfile::AttributeInfo],
    signatures: &mut HashSet<u16>,
) {
    for attr in attributes {
        if unit.attribute_name(attr).as_deref() == Some("Signature") && attr.data.len() >= 2 {
            signatures.insert(u16::from_be_bytes([attr.data[0], attr.data[1]]));
        }
    }
}

fn collect_local_variable_indices(
    data: &[u8],
    indices: &mut HashSet<u16>,
) -> Result<(), ClassFileError> {
    // Entry layout: start, length, name, descriptor-or-signature, slot.
    if data.len() < 2 {
        return Err(ClassFileError::MalformedCode(
            "truncated local variable table".to_string(),
        ));
    }
    let count = u16::from_be_bytes([data[0], data[1]]) as usize;
    let mut offset = 2;
    for _ in 0..count {
        if offset + 10 > data.len() {
            return Err(ClassFileError::MalformedCode(
                "truncated local variable table entry".to_string(),
            ));
        }
        indices.insert(u16::from_be_bytes([data[offset + 6], data[offset + 7]]));
        offset += 10;
    }
    Ok(())
}

/// Rewrites every `.class` file and every class inside a `.jar` archive
/// under `root` in place. Returns the number of units that changed.
pub fn remap_tree(root: &Path, table: &RemappingTable) -> Result<usize, RemapError> {
    if table.is_empty() {
        return Ok(0);
    }
    let mut changed_units = 0;
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| RemapError::Read {
            path: root.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(".class") {
            if remap_class_file(path, table)? {
                changed_units += 1;
            }
        } else if name.ends_with(".jar") {
            changed_units += remap_archive(path, table)?;
        }
    }
    debug!("Remapped {changed_units} units under {}", root.display());
    Ok(changed_units)
}

fn remap_class_file(path: &Path, table: &RemappingTable) -> Result<bool, RemapError> {
    let data = std::fs::read(path).map_err(|source| RemapError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut unit = ObjectCodeUnit::parse(&data).map_err(|source| RemapError::ClassFile {
        path: path.display().to_string(),
        source,
    })?;
    let changed = remap_unit(&mut unit, table).map_err(|source| RemapError::ClassFile {
        path: path.display().to_string(),
        source,
    })?;
    if changed {
        std::fs::write(path, unit.to_bytes()).map_err(|source| RemapError::Write {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(changed)
}

fn remap_archive(path: &Path, table: &RemappingTable) -> Result<usize, RemapError> {
    let file = std::fs::File::open(path).map_err(|source| RemapError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| RemapError::Archive {
        path: path.display().to_string(),
        source,
    })?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let staged = tempfile::NamedTempFile::new_in(parent).map_err(|source| RemapError::Write {
        path: path.display().to_string(),
        source,
    })?;
    let mut writer = zip::ZipWriter::new(staged);
    let options: zip::write::SimpleFileOptions = Default::default();

    let mut changed_units = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|source| RemapError::Archive {
                path: path.display().to_string(),
                source,
            })?;
        let entry_name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|source| RemapError::Read {
                path: format!("{}!{}", path.display(), entry_name),
                source,
            })?;

        if entry_name.ends_with(".class") {
            let origin = format!("{}!{}", path.display(), entry_name);
            let mut unit = ObjectCodeUnit::parse(&data).map_err(|source| {
                RemapError::ClassFile {
                    path: origin.clone(),
                    source,
                }
            })?;
            if remap_unit(&mut unit, table)
                .map_err(|source| RemapError::ClassFile { path: origin, source })?
            {
                data = unit.to_bytes();
                changed_units += 1;
            }
        }

        writer
            .start_file(entry_name.clone(), options)
            .and_then(|_| writer.write_all(&data).map_err(Into::into))
            .map_err(|source| RemapError::Archive {
                path: format!("{}!{}", path.display(), entry_name),
                source,
            })?;
    }

    let staged = writer.finish().map_err(|source| RemapError::Archive {
        path: path.display().to_string(),
        source,
    })?;
    if changed_units > 0 {
        staged.persist(path).map_err(|e| RemapError::Write {
            path: path.display().to_string(),
            source: e.error,
        })?;
    }
    Ok(changed_units)
}

/// Applies the table's source-text migration to generated project files:
/// dependency coordinates in build scripts, dotted class names in source and
/// markup. Pre-templated generated text only; compiled units go through
/// [`remap_tree`].
pub fn migrate_sources(root: &Path, table: &RemappingTable) -> Result<(), RemapError> {
    replace_in_tree(root, &["gradle"], |text| table.replace_artifacts(text))?;
    replace_in_tree(root, &["java", "kt", "xml"], |text| {
        table.replace_dotted_classes(text)
    })
}

fn replace_in_tree(
    root: &Path,
    extensions: &[&str],
    replace: impl Fn(&str) -> Option<String>,
) -> Result<(), RemapError> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RemapError::Read {
            path: root.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if !matches {
            continue;
        }
        let text = std::fs::read_to_string(path).map_err(|source| RemapError::Read {
            path: path.display().to_string(),
            source,
        })?;
        if let Some(rewritten) = replace(&text) {
            std::fs::write(path, rewritten).map_err(|source| RemapError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

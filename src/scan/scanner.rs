use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::classfile::{decode_code_refs, ClassFileError, CodeRef, ObjectCodeUnit};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to parse class file {path}: {source}")]
    MalformedUnit {
        path: String,
        source: ClassFileError,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to read archive {path}: {source}")]
    Archive {
        path: String,
        source: zip::result::ZipError,
    },
}

/// The scanner's only output channel. Names are JVM internal names
/// (`com/example/Foo`); duplicates are permitted.
pub trait UsageObserver {
    fn on_type_used(&mut self, name: &str);
    fn on_method_used(&mut self, owner: &str, name: &str);
}

/// Applies `visit` to every class file under `root`, recursing into `.jar`
/// archives. The visitor receives each parsed unit and its origin path; a
/// parse failure anywhere aborts the walk.
pub(crate) fn for_each_unit(
    root: &Path,
    visit: &mut dyn FnMut(&ObjectCodeUnit) -> Result<(), ClassFileError>,
) -> Result<(), ScanError> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ScanError::Read {
            path: root.display().to_string(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(".class") {
            let data = std::fs::read(path).map_err(|source| ScanError::Read {
                path: path.display().to_string(),
                source,
            })?;
            visit_class_bytes(&data, &path.display().to_string(), visit)?;
        } else if name.ends_with(".jar") {
            visit_archive(path, visit)?;
        }
    }
    Ok(())
}

fn visit_archive(
    path: &Path,
    visit: &mut dyn FnMut(&ObjectCodeUnit) -> Result<(), ClassFileError>,
) -> Result<(), ScanError> {
    debug!("Scanning archive {}", path.display());
    let file = std::fs::File::open(path).map_err(|source| ScanError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| ScanError::Archive {
        path: path.display().to_string(),
        source,
    })?;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|source| ScanError::Archive {
                path: path.display().to_string(),
                source,
            })?;
        if !entry.name().ends_with(".class") {
            continue;
        }
        let entry_name = format!("{}!{}", path.display(), entry.name());
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|source| ScanError::Read {
                path: entry_name.clone(),
                source,
            })?;
        visit_class_bytes(&data, &entry_name, visit)?;
    }
    Ok(())
}

fn visit_class_bytes(
    data: &[u8],
    origin: &str,
    visit: &mut dyn FnMut(&ObjectCodeUnit) -> Result<(), ClassFileError>,
) -> Result<(), ScanError> {
    let unit = ObjectCodeUnit::parse(data).map_err(|source| ScanError::MalformedUnit {
        path: origin.to_string(),
        source,
    })?;
    trace!("Visiting unit {}", unit.name());
    visit(&unit).map_err(|source| ScanError::MalformedUnit {
        path: origin.to_string(),
        source,
    })
}

/// Recursively scans every `.class` file under `root`, including classes
/// packed inside `.jar` archives, reporting each reference through the
/// observer. A malformed unit aborts the whole scan.
pub fn scan_tree(root: &Path, observer: &mut dyn UsageObserver) -> Result<(), ScanError> {
    for_each_unit(root, &mut |unit| scan_unit(unit, observer))
}

/// Reports every reference in one unit: superclass and interfaces, field
/// declared types, local-variable declared types, and per-instruction type
/// and call references. Constructor calls surface as a type usage but not a
/// named method usage.
pub fn scan_unit(
    unit: &ObjectCodeUnit,
    observer: &mut dyn UsageObserver,
) -> Result<(), ClassFileError> {
    if let Some(super_name) = unit.super_name() {
        observer.on_type_used(&super_name);
    }
    for interface in unit.interface_names() {
        observer.on_type_used(&interface);
    }

    for field in &unit.fields {
        if let Some(descriptor) = unit.member_descriptor(field) {
            if let Some(inner) = descriptor
                .strip_prefix('L')
                .and_then(|d| d.strip_suffix(';'))
            {
                observer.on_type_used(inner);
            }
        }
    }

    for method in &unit.methods {
        let Some(code) = unit.code_attribute(method) else {
            continue;
        };
        for code_ref in decode_code_refs(&unit.pool, code)? {
            match code_ref {
                CodeRef::Type(name) | CodeRef::ClassConstant(name) | CodeRef::LocalType(name) => {
                    observer.on_type_used(&name);
                }
                CodeRef::Call { owner, name } => {
                    observer.on_type_used(&owner);
                    if name != "<init>" {
                        observer.on_method_used(&owner, &name);
                    }
                }
            }
        }
    }
    Ok(())
}

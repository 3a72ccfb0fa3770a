//! Unpacking of the application payload archive into extension-keyed
//! destination buckets.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Failed to open payload {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Payload archive {path} is not readable: {source}")]
    Archive {
        path: String,
        source: zip::result::ZipError,
    },

    #[error("Failed to extract {entry}: {source}")]
    Extract {
        entry: String,
        source: std::io::Error,
    },

    #[error("Payload entry {0} escapes the extraction directory")]
    UnsafeEntry(String),
}

/// The unpacked application: compiled classes, handwritten native source
/// stubs, resources, and bundled libraries, partitioned by file extension.
/// Created once per build and discarded with the build directory.
#[derive(Debug)]
pub struct NativeAppPayload {
    pub classes_dir: PathBuf,
    pub sources_dir: PathBuf,
    pub resources_dir: PathBuf,
    pub libs_dir: PathBuf,
}

impl NativeAppPayload {
    /// Unpacks `archive` under `work_dir`, routing each entry by extension:
    /// `.class` files (other than `module-info.class`) into the classes
    /// bucket, handwritten source stubs into sources, library archives into
    /// libs, everything else (markup included) into resources.
    pub fn unpack(archive: &Path, work_dir: &Path) -> Result<Self, PayloadError> {
        let payload = Self {
            classes_dir: work_dir.join("classes"),
            sources_dir: work_dir.join("sources"),
            resources_dir: work_dir.join("resources"),
            libs_dir: work_dir.join("libs"),
        };
        for dir in [
            &payload.classes_dir,
            &payload.sources_dir,
            &payload.resources_dir,
            &payload.libs_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|source| PayloadError::Extract {
                entry: dir.display().to_string(),
                source,
            })?;
        }

        let file = std::fs::File::open(archive).map_err(|source| PayloadError::Open {
            path: archive.display().to_string(),
            source,
        })?;
        let mut zip = zip::ZipArchive::new(file).map_err(|source| PayloadError::Archive {
            path: archive.display().to_string(),
            source,
        })?;

        let mut extracted = 0usize;
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|source| PayloadError::Archive {
                path: archive.display().to_string(),
                source,
            })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let relative = sanitize(&name)?;
            if relative.file_name().and_then(|f| f.to_str()) == Some("module-info.class") {
                debug!("Skipping {name}");
                continue;
            }

            let destination = payload.bucket_for(&relative).join(&relative);
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(|source| PayloadError::Extract {
                    entry: name.clone(),
                    source,
                })?;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|source| PayloadError::Extract {
                    entry: name.clone(),
                    source,
                })?;
            std::fs::write(&destination, data).map_err(|source| PayloadError::Extract {
                entry: name.clone(),
                source,
            })?;
            extracted += 1;
        }
        info!(
            "Unpacked {extracted} payload entries into {}",
            work_dir.display()
        );
        Ok(payload)
    }

    fn bucket_for(&self, relative: &Path) -> &Path {
        let name = relative
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default();
        if name.ends_with(".class") {
            &self.classes_dir
        } else if [".java", ".m", ".h", ".cs"].iter().any(|e| name.ends_with(e)) {
            &self.sources_dir
        } else if [".jar", ".a", ".dylib"].iter().any(|e| name.ends_with(e)) {
            &self.libs_dir
        } else {
            &self.resources_dir
        }
    }

    /// Looks up a resource file by name anywhere in the resources bucket.
    pub fn find_resource(&self, file_name: &str) -> Option<PathBuf> {
        walkdir::WalkDir::new(&self.resources_dir)
            .into_iter()
            .filter_map(Result::ok)
            .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == file_name)
            .map(|e| e.into_path())
    }
}

fn sanitize(entry_name: &str) -> Result<PathBuf, PayloadError> {
    let path = Path::new(entry_name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(PayloadError::UnsafeEntry(entry_name.to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(PayloadError::UnsafeEntry(entry_name.to_string()));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize("../evil.class").is_err());
        assert!(sanitize("/abs/path").is_err());
        assert_eq!(
            sanitize("com/example/App.class").unwrap(),
            PathBuf::from("com/example/App.class")
        );
    }
}

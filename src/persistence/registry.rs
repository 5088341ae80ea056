//! Durable instance registry backed by a JSON file

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::core::{InstanceError, InstanceRecord};

/// File-backed store of every instance record
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<InstanceRecord>, InstanceError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No registry at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(InstanceError::io(
                    format!("reading registry {}", self.path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&data).map_err(|source| InstanceError::StoreCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the whole registry.
    ///
    /// Written to a sibling temp file then renamed over the target, so a
    /// concurrent reader sees either the previous or the new collection.
    pub fn save(&self, records: &[InstanceRecord]) -> Result<(), InstanceError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| {
            InstanceError::io(format!("creating registry dir {}", parent.display()), e)
        })?;

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| InstanceError::io("serializing registry", e.into()))?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .map_err(|e| InstanceError::io("creating temp registry file", e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| InstanceError::io("writing temp registry file", e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| InstanceError::io("syncing temp registry file", e))?;
        tmp.persist(&self.path).map_err(|e| {
            InstanceError::io(format!("replacing registry {}", self.path.display()), e.error)
        })?;

        info!("Registry saved with {} instances", records.len());
        Ok(())
    }

    /// Find a record by id in a loaded snapshot
    pub fn find(
        records: &[InstanceRecord],
        id: crate::core::InstanceId,
    ) -> Result<&InstanceRecord, InstanceError> {
        records
            .iter()
            .find(|r| r.id == id)
            .ok_or(InstanceError::InstanceNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InstanceId;
    use tempfile::TempDir;

    fn record(id: u32, sandbox: bool) -> InstanceRecord {
        InstanceRecord::new(
            InstanceId(id),
            None,
            PathBuf::from(format!("/srv/instance_{id}/config")),
            PathBuf::from(format!("/home/op/controller_{id}")),
            (7125 + 10 * id as u16, 7126 + 10 * id as u16),
            sandbox,
        )
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().join("instances.json"));
        assert!(registry.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().join("instances.json"));
        let records = vec![record(2, false), record(1, true)];

        registry.save(&records).unwrap();
        assert_eq!(registry.load().unwrap(), records);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state").join("instances.json");
        let registry = Registry::new(&path);

        registry.save(&[record(1, false)]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path().join("instances.json"));
        registry.save(&[record(1, false)]).unwrap();
        registry.save(&[record(1, false), record(2, false)]).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["instances.json"]);
    }

    #[test]
    fn unparsable_file_is_store_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instances.json");
        std::fs::write(&path, "[{\"id\": 1, \"name\": ").unwrap();

        let err = Registry::new(&path).load().unwrap_err();
        assert!(matches!(err, InstanceError::StoreCorrupt { .. }));
    }

    #[test]
    fn wrong_shape_is_store_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("instances.json");
        std::fs::write(&path, "[{\"id\": \"one\"}]").unwrap();

        let err = Registry::new(&path).load().unwrap_err();
        assert!(matches!(err, InstanceError::StoreCorrupt { .. }));
    }

    #[test]
    fn find_reports_missing_id() {
        let records = vec![record(1, false)];
        assert_eq!(Registry::find(&records, InstanceId(1)).unwrap().id, InstanceId(1));
        assert!(matches!(
            Registry::find(&records, InstanceId(4)),
            Err(InstanceError::InstanceNotFound(InstanceId(4)))
        ));
    }
}

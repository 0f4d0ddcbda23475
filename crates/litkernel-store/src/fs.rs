use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::error::{StoreError, StoreResult};
use crate::record::write_json_atomic;

/// Filesystem-backed checkpoint store.
///
/// Layout: `<root>/<document slug>_<stage>.json`, content is exactly the
/// stage payload.
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the checkpoint files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the file backing `key`.
    pub fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn load(&self, key: &CheckpointKey) -> StoreResult<Option<Value>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path,
                reason: e.to_string(),
            })
    }

    fn save(&self, key: &CheckpointKey, payload: &Value) -> StoreResult<()> {
        let path = self.path_for(key);
        write_json_atomic(&path, payload)?;
        debug!(checkpoint = %key, path = %path.display(), "checkpoint written");
        Ok(())
    }

    fn delete(&self, key: &CheckpointKey) -> StoreResult<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn exists(&self, key: &CheckpointKey) -> StoreResult<bool> {
        Ok(self.path_for(key).exists())
    }
}

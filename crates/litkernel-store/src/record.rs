//! Atomic JSON file helpers shared by checkpoints and final records.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Write `value` as pretty JSON to `path` atomically.
///
/// The bytes go to a temp file in the same directory, which is then renamed
/// over `path`. Readers see either the old file or the complete new one.
pub fn write_json_atomic(path: &Path, value: &Value) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read and parse a JSON file.
pub fn read_json_file(path: &Path) -> StoreResult<Value> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::Io(e)
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records").join("The_Giver_record_v3.json");
        let value = json!({ "schema_version": 3, "devices": [] });

        write_json_atomic(&path, &value).unwrap();
        assert_eq!(read_json_file(&path).unwrap(), value);
    }

    #[test]
    fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json");
        write_json_atomic(&path, &json!({ "v": 1 })).unwrap();
        write_json_atomic(&path, &json!({ "v": 2 })).unwrap();
        assert_eq!(read_json_file(&path).unwrap(), json!({ "v": 2 }));
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(read_json_file(&path), Err(StoreError::NotFound(_))));
    }
}

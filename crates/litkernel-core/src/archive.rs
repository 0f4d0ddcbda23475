//! Archive of superseded records and support files.
//!
//! Archived copies are named `<base>_v<major>_<minor>_<description>.<ext>`
//! and indexed in `archive_metadata.json` next to them, grouped by base name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use litkernel_store::{read_json_file, write_json_atomic, StoreError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::versioning::{RecordVersion, VersioningError};

pub const INDEX_FILE: &str = "archive_metadata.json";

const INDEX_FORMAT: &str = "1.0";
const MAX_DESCRIPTION_LEN: usize = 30;

/// One archived copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub archived_name: String,
    pub original_name: String,
    pub version: String,
    pub archived_at: DateTime<Utc>,
    pub reason: String,
    pub description: String,
    #[serde(default)]
    pub replaced_by: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub file_size: u64,
    pub source_path: String,
}

/// Contents of `archive_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveIndex {
    pub archive_version: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub files: BTreeMap<String, Vec<ArchiveEntry>>,
}

impl ArchiveIndex {
    fn empty() -> Self {
        let now = Utc::now();
        Self {
            archive_version: INDEX_FORMAT.to_string(),
            created: now,
            last_updated: now,
            files: BTreeMap::new(),
        }
    }

    pub fn total_versions(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// What to record about a file being archived.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub version: RecordVersion,
    pub reason: String,
    /// Short label for the file name; derived from `reason` when empty.
    pub description: String,
    pub replaced_by: Option<String>,
    pub notes: String,
}

impl ArchiveRequest {
    pub fn new(version: RecordVersion, reason: impl Into<String>) -> Self {
        Self {
            version,
            reason: reason.into(),
            description: String::new(),
            replaced_by: None,
            notes: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn replaced_by(mut self, replacement: impl Into<String>) -> Self {
        self.replaced_by = Some(replacement.into());
        self
    }
}

/// File name without extension or trailing version tag:
/// `run_stage1a_v5_1.py` -> `run_stage1a`.
pub fn base_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut parts: Vec<&str> = stem.split('_').collect();
    // Tags are `v5`, or `v5_1` split across two parts.
    if parts.len() > 2
        && parts[parts.len() - 1].bytes().all(|b| b.is_ascii_digit())
        && is_version_tag(parts[parts.len() - 2])
    {
        parts.truncate(parts.len() - 2);
    } else if parts.len() > 1 && is_version_tag(parts[parts.len() - 1]) {
        parts.pop();
    }
    parts.join("_")
}

fn is_version_tag(part: &str) -> bool {
    part.strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit() || b == b'.'))
}

fn clean_description(description: &str) -> String {
    let cleaned: String = description
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    if cleaned.is_empty() {
        "archived".to_string()
    } else {
        cleaned
    }
}

fn archived_name(base: &str, ext: &str, version: RecordVersion, description: &str) -> String {
    let mut name = format!("{base}_v{}_{}", version.file_tag(), clean_description(description));
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// A directory of archived files plus their index.
#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
}

impl Archive {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, VersioningError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| VersioningError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The index, or an empty one if nothing has been archived yet.
    pub fn index(&self) -> Result<ArchiveIndex, VersioningError> {
        let path = self.dir.join(INDEX_FILE);
        match read_json_file(&path) {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(StoreError::NotFound(_)) => Ok(ArchiveIndex::empty()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_index(&self, index: &ArchiveIndex) -> Result<(), VersioningError> {
        let value = serde_json::to_value(index)?;
        write_json_atomic(&self.dir.join(INDEX_FILE), &value)?;
        Ok(())
    }

    /// Copy `source` into the archive and record it in the index.
    pub fn archive(&self, source: &Path, request: &ArchiveRequest) -> Result<ArchiveEntry, VersioningError> {
        if !source.is_file() {
            return Err(VersioningError::SourceMissing(source.to_path_buf()));
        }
        let base = base_name(source);
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let description = if request.description.is_empty() {
            request
                .reason
                .to_lowercase()
                .replace(' ', "_")
                .chars()
                .take(MAX_DESCRIPTION_LEN)
                .collect()
        } else {
            request.description.clone()
        };

        let mut name = archived_name(&base, &ext, request.version, &description);
        let mut counter = 1;
        while self.dir.join(&name).exists() {
            name = archived_name(&base, &ext, request.version, &format!("{description}_{counter}"));
            counter += 1;
        }
        let target = self.dir.join(&name);
        let file_size = fs::copy(source, &target).map_err(|e| VersioningError::io(&target, e))?;

        let entry = ArchiveEntry {
            archived_name: name,
            original_name: source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            version: request.version.to_string(),
            archived_at: Utc::now(),
            reason: request.reason.clone(),
            description,
            replaced_by: request.replaced_by.clone(),
            notes: request.notes.clone(),
            file_size,
            source_path: source.display().to_string(),
        };

        let mut index = self.index()?;
        index.files.entry(base.clone()).or_default().push(entry.clone());
        index.last_updated = entry.archived_at;
        self.save_index(&index)?;

        info!(base = %base, archived = %entry.archived_name, version = %entry.version, "file archived");
        Ok(entry)
    }

    /// Archived copies of `base`, newest first.
    pub fn versions(&self, base: &str) -> Result<Vec<ArchiveEntry>, VersioningError> {
        let mut entries = self.index()?.files.remove(base).unwrap_or_default();
        // Entries are appended, so ties on the timestamp resolve to later entries.
        entries.reverse();
        entries.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(entries)
    }
}

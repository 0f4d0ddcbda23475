//! Editorial record versions and versioned record files.
//!
//! Independent of the schema version: `record_version` (`major.minor`)
//! counts editorial revisions of one document's record. Every patch bumps
//! the minor number, backs up the record it replaces and writes the result
//! under a versioned file name (`<stem>_v3_1.json`).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::Utc;
use litkernel_store::{read_json_file, write_json_atomic, StoreError};
use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::record::CURRENT_SCHEMA_VERSION;
use crate::migration::{metadata_mut, patch, schema_version_of, MigrationError};

#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    #[error("invalid record version {0:?} (expected MAJOR.MINOR)")]
    InvalidVersion(String),

    #[error("source file not found: {0:?}")]
    SourceMissing(PathBuf),

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VersioningError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        VersioningError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordVersion
// ---------------------------------------------------------------------------

/// `major.minor` editorial version of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordVersion {
    pub major: u32,
    pub minor: u32,
}

impl RecordVersion {
    /// Version stamped on a freshly assembled record.
    pub const INITIAL: RecordVersion = RecordVersion {
        major: CURRENT_SCHEMA_VERSION,
        minor: 0,
    };

    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The next minor version: 3.4 -> 3.5.
    pub fn next(self) -> Self {
        Self {
            major: self.major,
            minor: self.minor.saturating_add(1),
        }
    }

    /// `metadata.record_version` (or the legacy `kernel_version`) of a raw
    /// record.
    pub fn of_record(record: &Value) -> Option<Self> {
        let metadata = record.get("metadata")?;
        ["record_version", "kernel_version"]
            .iter()
            .filter_map(|key| metadata.get(*key))
            .find_map(|v| match v {
                Value::String(s) => s.parse().ok(),
                Value::Number(n) => n.to_string().parse().ok(),
                _ => None,
            })
    }

    /// File-name form: `3_4`.
    pub fn file_tag(&self) -> String {
        format!("{}_{}", self.major, self.minor)
    }
}

impl fmt::Display for RecordVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for RecordVersion {
    type Err = VersioningError;

    /// Accepts `3.4`, `v3.4`, `3_4` and `v3_4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersioningError::InvalidVersion(s.to_string());
        let body = s.trim();
        let body = body.strip_prefix(['v', 'V']).unwrap_or(body);
        let (major, minor) = body.split_once(['.', '_']).ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

// ---------------------------------------------------------------------------
// Versioned file names
// ---------------------------------------------------------------------------

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v(\d+)[._](\d+)").ok()).as_ref()
}

fn version_suffix_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_?v\d+(?:[._]\d+)?$").ok()).as_ref()
}

/// Version embedded in a file name such as `kernel_v3_4.json`.
pub fn version_in_file_name(path: &Path) -> Option<RecordVersion> {
    let name = path.file_name()?.to_str()?;
    let caps = version_regex()?.captures(name)?;
    Some(RecordVersion::new(caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// `path` with its trailing version tag replaced by `version`:
/// `X_record_v3.json` -> `X_record_v3_1.json`.
pub fn versioned_path(path: &Path, version: RecordVersion) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = match version_suffix_regex() {
        Some(re) => re.replace(&stem, "").into_owned(),
        None => stem,
    };
    let mut name = format!("{base}_v{}", version.file_tag());
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

/// Where to back up `path` before it is superseded. Falls back to a
/// timestamped name when the versioned name is taken.
pub fn backup_path(path: &Path, version: RecordVersion) -> PathBuf {
    let candidate = versioned_path(path, version);
    if !candidate.exists() {
        return candidate;
    }
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut name = format!("{stem}_{stamp}");
    if let Some(ext) = candidate.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    candidate.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Patching files
// ---------------------------------------------------------------------------

/// How [`patch_file`] should version and place its output.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Target version; the old record's version plus one when `None`.
    pub version: Option<RecordVersion>,
    /// Copy the old record aside before writing.
    pub backup: bool,
    /// Output path; the old path re-tagged with the target version when
    /// `None`.
    pub output: Option<PathBuf>,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            version: None,
            backup: true,
            output: None,
        }
    }
}

/// What [`patch_file`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    pub from_version: RecordVersion,
    pub to_version: RecordVersion,
    pub from_schema: u64,
    pub record: Value,
}

/// Patch `old` in memory from `new` and stamp `version` on the result.
pub fn patch_to_version(
    old: Value,
    new: Value,
    version: RecordVersion,
) -> Result<Value, VersioningError> {
    let mut patched = patch(old, new)?;
    if let Some(metadata) = metadata_mut(&mut patched) {
        metadata.insert("record_version".into(), json!(version.to_string()));
        metadata.remove("kernel_version");
    }
    Ok(patched)
}

/// Patch the record at `old` from the record at `new`, back up `old` and
/// write the result under the next version.
pub fn patch_file(
    old: &Path,
    new: &Path,
    options: &PatchOptions,
) -> Result<PatchOutcome, VersioningError> {
    if !old.exists() {
        return Err(VersioningError::SourceMissing(old.to_path_buf()));
    }
    let old_value = read_json_file(old)?;
    let new_value = read_json_file(new)?;

    let from_schema = schema_version_of(&old_value);
    let from_version = RecordVersion::of_record(&old_value)
        .or_else(|| version_in_file_name(old))
        .unwrap_or(RecordVersion::INITIAL);
    let to_version = options.version.unwrap_or_else(|| from_version.next());
    let record = patch_to_version(old_value, new_value, to_version)?;

    let backup = if options.backup {
        let path = backup_path(old, from_version);
        fs::copy(old, &path).map_err(|e| VersioningError::io(&path, e))?;
        Some(path)
    } else {
        None
    };

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| versioned_path(old, to_version));
    write_json_atomic(&output, &record)?;

    info!(
        from = %from_version,
        to = %to_version,
        from_schema,
        output = %output.display(),
        backup = ?backup,
        "record patched to new version"
    );
    Ok(PatchOutcome {
        output,
        backup,
        from_version,
        to_version,
        from_schema,
        record,
    })
}

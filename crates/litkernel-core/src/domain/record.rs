//! The final assembled record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::devices::ConsistencyReport;
use crate::domain::alignment::ChapterAlignment;
use crate::domain::device::Device;
use crate::domain::macro_profile::MacroProfile;

/// Current record schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Who/what the record describes and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub title: String,
    pub author: String,
    pub edition: String,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the document text.
    pub source_digest: String,
    pub total_chapters: u32,
    pub total_words: usize,
    /// Editorial version, `major.minor`; bumped on every patch.
    #[serde(default, alias = "kernel_version", skip_serializing_if = "Option::is_none")]
    pub record_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_method: Option<String>,
}

/// Alignment, macro profile and device catalog of one document.
///
/// Written once per run. Older records are brought forward with
/// [`crate::migration::patch`] rather than rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub schema_version: u32,
    pub metadata: RecordMetadata,
    pub alignment: ChapterAlignment,
    pub macro_profile: MacroProfile,
    pub devices: Vec<Device>,
    #[serde(default)]
    pub consistency_report: ConsistencyReport,
}

//! Artifact assembly: merge validated stage outputs into one record and
//! write it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use litkernel_store::{read_json_file, slugify, write_json_atomic};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::devices::{check_placement, PlacementViolation};
use crate::document::Document;
use crate::domain::alignment::ChapterAlignment;
use crate::domain::error::Result;
use crate::domain::macro_profile::MacroProfile;
use crate::domain::record::{PipelineRecord, RecordMetadata, CURRENT_SCHEMA_VERSION};
use crate::migration::migrate_to_current;
use crate::versioning::RecordVersion;
use crate::pipeline::outputs::{DeviceOutput, ExtractionOutput, StructureOutput};
use crate::structure::{misplaced_primaries, validate_alignment, MisplacedPrimary, StructureVerdict};

/// Bibliographic identity of the document being annotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub edition: String,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>, author: impl Into<String>, edition: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            edition: edition.into(),
        }
    }
}

/// The stage-0 alignment with each segment's stage-1 passage attached.
pub fn merged_alignment(structure: &StructureOutput, extraction: &ExtractionOutput) -> ChapterAlignment {
    let mut alignment = structure.alignment.clone();
    for (kind, extract) in &extraction.extracts {
        let segment = alignment.get_mut(*kind);
        segment.passage = Some(extract.passage.clone());
        segment.rationale = extract.rationale.clone();
    }
    alignment
}

/// Build the record from the four validated outputs.
pub fn assemble_record(
    book: &BookMetadata,
    document: &Document,
    run_id: Uuid,
    structure: &StructureOutput,
    extraction: &ExtractionOutput,
    macro_profile: &MacroProfile,
    devices: &DeviceOutput,
) -> PipelineRecord {
    PipelineRecord {
        schema_version: CURRENT_SCHEMA_VERSION,
        metadata: RecordMetadata {
            title: book.title.clone(),
            author: book.author.clone(),
            edition: book.edition.clone(),
            run_id,
            created_at: Utc::now(),
            source_digest: document.digest(),
            total_chapters: structure.total_chapters,
            total_words: document.word_count(),
            record_version: Some(RecordVersion::INITIAL.to_string()),
            patched_at: None,
            patch_method: None,
        },
        alignment: merged_alignment(structure, extraction),
        macro_profile: macro_profile.clone(),
        devices: devices.devices.clone(),
        consistency_report: devices.report.clone(),
    }
}

/// `<records_dir>/<slug>_record_v3.json`
pub fn record_path(records_dir: &Path, title: &str) -> PathBuf {
    records_dir.join(format!("{}_record_v{}.json", slugify(title), CURRENT_SCHEMA_VERSION))
}

pub fn write_record(path: &Path, record: &PipelineRecord) -> Result<()> {
    let value = serde_json::to_value(record)?;
    write_json_atomic(path, &value)?;
    Ok(())
}

/// Read a record of any known schema version, migrating it in memory.
pub fn read_record(path: &Path) -> Result<PipelineRecord> {
    let value = migrate_to_current(read_json_file(path)?)?;
    Ok(serde_json::from_value(value)?)
}

/// Re-check of a finished record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordVerification {
    pub structure: StructureVerdict,
    pub misplaced_primaries: Vec<MisplacedPrimary>,
    pub placement_violations: Vec<PlacementViolation>,
}

impl RecordVerification {
    /// Coverage and climax hold. Placement findings are advisory.
    pub fn is_valid(&self) -> bool {
        self.structure.is_valid()
    }
}

pub fn verify_record(record: &PipelineRecord) -> RecordVerification {
    let total = record.metadata.total_chapters;
    RecordVerification {
        structure: validate_alignment(&record.alignment, total),
        misplaced_primaries: misplaced_primaries(&record.alignment),
        placement_violations: check_placement(&record.devices, &record.alignment, total),
    }
}

//! Validated stage outputs and the parsers that build them from service
//! JSON.
//!
//! Each output type is also the exact checkpoint payload for its stage.
//! Parsers are tolerant of the field spellings the service is known to use
//! but never guess at missing structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::devices::{self, ConsistencyEngine, ConsistencyReport};
use crate::domain::alignment::{ChapterAlignment, NarrativeSegment};
use crate::domain::device::Device;
use crate::domain::error::{PipelineError, Result};
use crate::domain::macro_profile::MacroProfile;
use crate::domain::range::ChapterRange;
use crate::domain::segment::SegmentKind;
use crate::domain::stage::Stage;
use crate::position::{parse_chapter, parse_chapter_range};
use crate::structure::{self, validate_alignment};

// ---------------------------------------------------------------------------
// Stage 0: structure alignment
// ---------------------------------------------------------------------------

/// Stage-0 output: a certified alignment of `total_chapters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureOutput {
    pub total_chapters: u32,
    /// The service's own estimate, kept for comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chapters_estimate: Option<u32>,
    pub alignment: ChapterAlignment,
}

impl StructureOutput {
    /// Certify against the document's chapter count.
    pub fn validate(&self, total_chapters: u32) -> Result<()> {
        if self.total_chapters != total_chapters {
            return Err(PipelineError::malformed(
                Stage::Structure,
                format!(
                    "alignment was made for {} chapters, document has {}",
                    self.total_chapters, total_chapters
                ),
            ));
        }
        validate_alignment(&self.alignment, total_chapters).into_result(Stage::Structure)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!("{} chapters", self.total_chapters)];
        for seg in self.alignment.iter() {
            lines.push(format!(
                "  {:<15} chapters {:<7} primary {}",
                seg.kind.as_str(),
                seg.chapter_range.to_string(),
                seg.primary_chapter
            ));
        }
        lines.join("\n")
    }
}

fn chapter_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0),
        Value::String(s) => parse_chapter(s).ok(),
        _ => None,
    }
}

fn segment_range(kind: SegmentKind, obj: &Value) -> Result<ChapterRange> {
    let malformed = |reason: String| PipelineError::malformed(Stage::Structure, reason);

    if let Some(raw) = obj.get("chapter_range") {
        return match raw {
            Value::String(s) => parse_chapter_range(s)
                .map_err(|e| malformed(format!("{kind}: {e}"))),
            other => chapter_value(other)
                .and_then(|n| ChapterRange::single(n).ok())
                .ok_or_else(|| malformed(format!("{kind}: unreadable chapter_range {other}"))),
        };
    }

    let start = obj.get("chapter_start").and_then(chapter_value);
    let end = obj.get("chapter_end").and_then(chapter_value);
    match (start, end) {
        (Some(start), Some(end)) => ChapterRange::new(start, end)
            .map_err(|e| malformed(format!("{kind}: {e}"))),
        _ => Err(malformed(format!(
            "{kind}: needs chapter_range or chapter_start/chapter_end"
        ))),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_segment(kind: SegmentKind, obj: &Value) -> Result<NarrativeSegment> {
    let range = segment_range(kind, obj)?;
    let primary_chapter = match obj.get("primary_chapter").and_then(chapter_value) {
        Some(ch) => ch,
        None => {
            warn!(segment = %kind, "no primary chapter reported, using range midpoint");
            range.midpoint()
        }
    };

    let mut segment = NarrativeSegment::new(kind, range, primary_chapter);
    segment.description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    segment.key_events = string_list(obj.get("key_events"));
    Ok(segment)
}

/// Parse a stage-0 response for a document of `total_chapters`.
///
/// Segments may sit at the top level or under `alignment` /
/// `narrative_position_mapping`.
pub fn parse_structure(value: &Value, total_chapters: u32) -> Result<StructureOutput> {
    let root = ["alignment", "narrative_position_mapping"]
        .iter()
        .find_map(|key| value.get(*key).filter(|v| v.is_object()))
        .unwrap_or(value);
    if !root.is_object() {
        return Err(PipelineError::malformed(Stage::Structure, "expected a JSON object"));
    }

    let mut segments = Vec::with_capacity(5);
    for kind in SegmentKind::ALL {
        let obj = root.get(kind.as_str()).ok_or_else(|| {
            PipelineError::malformed(Stage::Structure, format!("missing {kind} segment"))
        })?;
        segments.push(parse_segment(kind, obj)?);
    }
    let [exposition, rising, climax, falling, resolution]: [NarrativeSegment; 5] = segments
        .try_into()
        .map_err(|_| PipelineError::malformed(Stage::Structure, "expected five segments"))?;

    let total_chapters_estimate = value
        .get("text_structure")
        .and_then(|ts| {
            ts.get("total_chapters_estimate")
                .or_else(|| ts.get("total_chapters"))
        })
        .and_then(chapter_value);
    if let Some(estimate) = total_chapters_estimate.filter(|e| *e != total_chapters) {
        warn!(estimate, total_chapters, "service chapter estimate differs from document");
    }

    let alignment = ChapterAlignment::new(exposition, rising, climax, falling, resolution);
    for misplaced in structure::misplaced_primaries(&alignment) {
        warn!(
            segment = %misplaced.segment,
            primary = misplaced.primary_chapter,
            range = %misplaced.chapter_range,
            "primary chapter outside its segment"
        );
    }

    Ok(StructureOutput {
        total_chapters,
        total_chapters_estimate,
        alignment,
    })
}

// ---------------------------------------------------------------------------
// Stage 1: segment extraction
// ---------------------------------------------------------------------------

/// One extracted passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentExtract {
    pub passage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub word_count: usize,
}

/// Stage-1 output: one passage per segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionOutput {
    pub extracts: BTreeMap<SegmentKind, SegmentExtract>,
}

impl ExtractionOutput {
    /// All five segments present, each with a non-empty passage.
    pub fn validate(&self) -> Result<()> {
        for kind in SegmentKind::ALL {
            match self.extracts.get(&kind) {
                Some(extract) if !extract.passage.trim().is_empty() => {}
                Some(_) => {
                    return Err(PipelineError::malformed(
                        Stage::Extraction,
                        format!("{kind}: passage is empty"),
                    ))
                }
                None => {
                    return Err(PipelineError::malformed(
                        Stage::Extraction,
                        format!("{kind}: no passage extracted"),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        self.extracts
            .iter()
            .map(|(kind, e)| format!("  {:<15} {} words", kind.as_str(), e.word_count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse one stage-1 response for `segment`.
pub fn parse_extract(value: &Value, segment: SegmentKind) -> Result<SegmentExtract> {
    let passage = value
        .get("passage")
        .or_else(|| value.get("text"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            PipelineError::malformed(Stage::Extraction, format!("{segment}: missing passage"))
        })?;

    Ok(SegmentExtract {
        passage: passage.to_string(),
        rationale: value
            .get("rationale")
            .and_then(Value::as_str)
            .map(str::to_string),
        word_count: passage.split_whitespace().count(),
    })
}

// ---------------------------------------------------------------------------
// Stage 2A: macro tagging
// ---------------------------------------------------------------------------

/// Parse a stage-2A response: any non-empty JSON object.
pub fn parse_macro(value: Value) -> Result<MacroProfile> {
    let profile = MacroProfile::from_value(value)
        .ok_or_else(|| PipelineError::malformed(Stage::Macro, "expected a JSON object"))?;
    validate_macro(&profile)?;
    Ok(profile)
}

pub fn validate_macro(profile: &MacroProfile) -> Result<()> {
    if profile.is_empty() {
        return Err(PipelineError::malformed(Stage::Macro, "macro profile is empty"));
    }
    if profile.pov_code().is_none() {
        warn!("macro profile has no point-of-view code, exclusivity filter disabled");
    }
    Ok(())
}

pub fn macro_summary(profile: &MacroProfile) -> String {
    let keys: Vec<&str> = profile.0.keys().map(String::as_str).collect();
    format!(
        "  sections: {}\n  point of view: {}",
        keys.join(", "),
        profile.pov_code().unwrap_or("(none)")
    )
}

// ---------------------------------------------------------------------------
// Stage 2B: device tagging
// ---------------------------------------------------------------------------

/// Stage-2B output: the repaired catalog and what the repair did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOutput {
    pub devices: Vec<Device>,
    #[serde(default)]
    pub report: ConsistencyReport,
}

impl DeviceOutput {
    /// Re-check a loaded catalog against the current upstream outputs.
    ///
    /// The catalog must already be a fixed point of the consistency engine
    /// for `pov_code`; otherwise it was built from a different macro profile
    /// and is rejected. Placement is recomputed against `alignment` and
    /// replaces the stored list.
    pub fn revalidate(
        &mut self,
        alignment: &ChapterAlignment,
        total_chapters: u32,
        pov_code: Option<&str>,
    ) -> Result<()> {
        let (_, report) = ConsistencyEngine::new(pov_code).apply(self.devices.clone());
        if !report.is_noop() {
            return Err(PipelineError::malformed(
                Stage::Devices,
                format!(
                    "catalog is not consistent: {} relocations, {} duplicates, {} pov removals pending",
                    report.relocated.len(),
                    report.duplicates_removed.len(),
                    report.exclusivity_violations.len()
                ),
            ));
        }

        let placement = devices::check_placement(&self.devices, alignment, total_chapters);
        if placement != self.report.placement_violations {
            warn!(
                stored = self.report.placement_violations.len(),
                current = placement.len(),
                "placement warnings changed since the catalog was saved"
            );
            self.report.placement_violations = placement;
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut per_segment: BTreeMap<String, usize> = BTreeMap::new();
        for device in &self.devices {
            let key = device
                .assigned_segment
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "unassigned".to_string());
            *per_segment.entry(key).or_insert(0) += 1;
        }
        let mut lines = vec![format!("{} devices", self.devices.len())];
        lines.extend(per_segment.iter().map(|(k, n)| format!("  {k:<15} {n}")));
        lines.push(format!(
            "  relocated {}, duplicates removed {}, pov removals {}, placement warnings {}",
            self.report.relocated.len(),
            self.report.duplicates_removed.len(),
            self.report.exclusivity_violations.len(),
            self.report.placement_violations.len()
        ));
        lines.join("\n")
    }
}

/// Parse a stage-2B response: an array of devices, or an object holding one
/// under `devices` / `micro_devices`.
pub fn parse_devices(value: Value) -> Result<Vec<Device>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map
            .remove("devices")
            .or_else(|| map.remove("micro_devices"))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PipelineError::malformed(
                    Stage::Devices,
                    "expected a device array",
                ))
            }
        },
        _ => {
            return Err(PipelineError::malformed(
                Stage::Devices,
                "expected a device array",
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value::<Device>(item)
                .map_err(|e| PipelineError::malformed(Stage::Devices, format!("device #{idx}: {e}")))
        })
        .collect()
}

/// Locate examples, run the consistency engine and record placement
/// problems.
pub fn process_devices(
    mut raw: Vec<Device>,
    alignment: &ChapterAlignment,
    total_chapters: u32,
    pov_code: Option<&str>,
) -> DeviceOutput {
    devices::locate_examples(&mut raw, alignment);
    let (devices, mut report) = ConsistencyEngine::new(pov_code).apply(raw);
    report.placement_violations = devices::check_placement(&devices, alignment, total_chapters);
    for v in &report.placement_violations {
        warn!(
            device = %v.device,
            chapter = ?v.chapter,
            problem = ?v.problem,
            "example placement disagrees with device tier"
        );
    }
    DeviceOutput { devices, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structure_json() -> Value {
        json!({
            "text_structure": { "total_chapters_estimate": 23 },
            "exposition": { "chapter_range": "Chapters 1-2", "primary_chapter": 1 },
            "rising_action": { "chapter_start": 3, "chapter_end": "10", "primary_chapter": "7" },
            "climax": { "chapter_range": "11-12", "primary_chapter": 11, "key_events": ["the trial"] },
            "falling_action": { "chapter_range": "13-19" },
            "resolution": { "chapter_range": "20-23", "primary_chapter": 22, "description": "home" }
        })
    }

    #[test]
    fn structure_accepts_mixed_forms() {
        let out = parse_structure(&structure_json(), 23).unwrap();
        assert_eq!(out.total_chapters_estimate, Some(23));
        let rising = out.alignment.get(SegmentKind::RisingAction);
        assert_eq!(rising.chapter_range.to_string(), "3-10");
        assert_eq!(rising.primary_chapter, 7);
        assert_eq!(out.alignment.get(SegmentKind::FallingAction).primary_chapter, 16);
        assert_eq!(out.alignment.get(SegmentKind::Climax).key_events, vec!["the trial"]);
        out.validate(23).unwrap();
    }

    #[test]
    fn structure_missing_segment_is_malformed() {
        let mut value = structure_json();
        value.as_object_mut().unwrap().remove("climax");
        let err = parse_structure(&value, 23).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedServiceResponse { .. }));
        assert!(err.to_string().contains("climax"));
    }

    #[test]
    fn structure_for_other_chapter_count_is_rejected() {
        let out = parse_structure(&structure_json(), 23).unwrap();
        assert!(out.validate(24).is_err());
    }

    #[test]
    fn extract_requires_passage() {
        let ok = parse_extract(&json!({ "passage": "a b c", "rationale": "r" }), SegmentKind::Climax)
            .unwrap();
        assert_eq!(ok.word_count, 3);
        assert!(parse_extract(&json!({ "passage": "  " }), SegmentKind::Climax).is_err());
    }

    #[test]
    fn extraction_needs_all_five() {
        let mut out = ExtractionOutput::default();
        for kind in [SegmentKind::Exposition, SegmentKind::RisingAction] {
            out.extracts.insert(
                kind,
                SegmentExtract {
                    passage: "p".into(),
                    rationale: None,
                    word_count: 1,
                },
            );
        }
        let err = out.validate().unwrap_err();
        assert!(err.to_string().contains("climax"));
    }

    #[test]
    fn macro_must_be_non_empty_object() {
        assert!(parse_macro(json!({})).is_err());
        assert!(parse_macro(json!("TPL")).is_err());
        let profile = parse_macro(json!({ "narrative": { "pov": "TPL" } })).unwrap();
        assert_eq!(profile.pov_code(), Some("TPL"));
    }

    #[test]
    fn devices_from_wrapped_object() {
        let devices = parse_devices(json!({
            "micro_devices": [{ "name": "Simile", "examples": [{ "text": "q", "chapter": 2 }] }]
        }))
        .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].examples[0].chapter, Some(2));
    }

    #[test]
    fn device_with_bad_chapter_is_malformed() {
        let err = parse_devices(json!([
            { "name": "Simile", "examples": [] },
            { "name": "Motif", "examples": [{ "text": "q", "chapter": "late" }] }
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("device #1"));
    }
}

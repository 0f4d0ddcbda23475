//! Device consistency engine.
//!
//! Repairs the documented classes of generative-service error in a device
//! list. Steps run in a fixed order: normalize, relocate, deduplicate, then
//! filter by point of view. Each step is deterministic and idempotent, so
//! running the engine on its own output changes nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::devices::taxonomy::{self, PovGroup};
use crate::domain::alignment::ChapterAlignment;
use crate::domain::device::Device;
use crate::domain::range::ChapterRange;
use crate::domain::segment::SegmentKind;
use crate::obs;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A duplicate occurrence that was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedDuplicate {
    pub name: String,
    pub dropped_segment: Option<SegmentKind>,
    pub kept_segment: Option<SegmentKind>,
}

/// A device removed because its point of view contradicts the document's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusivityViolation {
    pub name: String,
    pub device_pov: PovGroup,
    pub document_pov: PovGroup,
}

/// Why an example sits in the wrong place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementProblem {
    /// Chapter lies outside the tier-canonical segment's range.
    OutsideCanonicalSegment,
    /// Chapter lies outside `1..=N`.
    OutsideDocument,
    /// The service gave no usable chapter.
    MissingChapter,
}

/// An example whose chapter disagrees with where its device is taught.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementViolation {
    pub device: String,
    pub chapter: Option<u32>,
    pub expected_segment: Option<SegmentKind>,
    pub expected_range: Option<ChapterRange>,
    pub problem: PlacementProblem,
}

/// Everything the engine changed or noticed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyReport {
    /// Point-of-view code the filter ran with.
    pub pov_code: Option<String>,
    /// Pervasive-voice devices moved to the resolution.
    pub relocated: Vec<String>,
    pub duplicates_removed: Vec<RemovedDuplicate>,
    pub exclusivity_violations: Vec<ExclusivityViolation>,
    /// Names outside the taxonomy, passed through with tier 0.
    pub unknown_names: Vec<String>,
    pub placement_violations: Vec<PlacementViolation>,
}

impl ConsistencyReport {
    /// True when no device was changed or removed.
    pub fn is_noop(&self) -> bool {
        self.relocated.is_empty()
            && self.duplicates_removed.is_empty()
            && self.exclusivity_violations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies the repair rules for one document.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyEngine {
    pov_code: Option<String>,
    pov: Option<PovGroup>,
}

impl ConsistencyEngine {
    /// Engine for a document whose macro profile reports `pov_code`.
    ///
    /// An unrecognised code disables point-of-view filtering.
    pub fn new(pov_code: Option<&str>) -> Self {
        let pov = pov_code.and_then(PovGroup::from_code);
        if let (Some(code), None) = (pov_code, pov) {
            warn!(pov_code = %code, "unrecognised point-of-view code, exclusivity filter disabled");
        }
        Self {
            pov_code: pov_code.map(str::to_string),
            pov,
        }
    }

    pub fn pov(&self) -> Option<PovGroup> {
        self.pov
    }

    /// Run every repair in order and return the processed list.
    pub fn apply(&self, devices: Vec<Device>) -> (Vec<Device>, ConsistencyReport) {
        let mut report = ConsistencyReport {
            pov_code: self.pov_code.clone(),
            ..ConsistencyReport::default()
        };

        let mut devices = devices;
        normalize(&mut devices, &mut report);
        relocate(&mut devices, &mut report);
        let devices = deduplicate(devices, &mut report);
        let devices = self.filter_exclusive(devices, &mut report);
        (devices, report)
    }

    /// Drop devices whose point-of-view group differs from the document's.
    pub fn filter_exclusive(
        &self,
        devices: Vec<Device>,
        report: &mut ConsistencyReport,
    ) -> Vec<Device> {
        let Some(document_pov) = self.pov else {
            return devices;
        };

        devices
            .into_iter()
            .filter(|device| match taxonomy::pov_group(&device.name) {
                Some(device_pov) if device_pov != document_pov => {
                    obs::emit_device_removed(&device.name, "pov_exclusivity");
                    report.exclusivity_violations.push(ExclusivityViolation {
                        name: device.name.clone(),
                        device_pov,
                        document_pov,
                    });
                    false
                }
                _ => true,
            })
            .collect()
    }
}

/// Canonicalise names, recompute tiers and fill missing segments.
///
/// A device without an assigned segment gets its tier-canonical segment,
/// or failing that the segment of its first located example.
pub fn normalize(devices: &mut [Device], report: &mut ConsistencyReport) {
    for device in devices.iter_mut() {
        match taxonomy::canonical_name(&device.name) {
            Some(canonical) => {
                if device.name != canonical {
                    debug!(from = %device.name, to = canonical, "canonicalised device name");
                    device.name = canonical.to_string();
                }
                device.tier = taxonomy::tier_of(canonical);
            }
            None => {
                device.tier = taxonomy::UNKNOWN_TIER;
                if !report.unknown_names.contains(&device.name) {
                    warn!(device = %device.name, "device name outside taxonomy, passing through");
                    report.unknown_names.push(device.name.clone());
                }
            }
        }

        if device.assigned_segment.is_none() {
            device.assigned_segment = taxonomy::canonical_segment(device.tier)
                .or_else(|| device.examples.iter().find_map(|e| e.segment));
        }
    }
}

/// Force every pervasive-voice device, and each of its examples, into the
/// resolution.
pub fn relocate(devices: &mut [Device], report: &mut ConsistencyReport) {
    for device in devices
        .iter_mut()
        .filter(|d| d.tier == taxonomy::PERVASIVE_VOICE_TIER)
    {
        let mut moved = device.assigned_segment != Some(SegmentKind::Resolution);
        device.assigned_segment = Some(SegmentKind::Resolution);
        for example in device.examples.iter_mut() {
            if example.segment != Some(SegmentKind::Resolution) {
                example.segment = Some(SegmentKind::Resolution);
                moved = true;
            }
        }
        if moved {
            debug!(device = %device.name, "relocated pervasive-voice device to resolution");
            report.relocated.push(device.name.clone());
        }
    }
}

/// Keep one occurrence per name.
///
/// The occurrence assigned to the tier-canonical segment wins; otherwise the
/// first seen. Survivors keep their original relative order.
pub fn deduplicate(devices: Vec<Device>, report: &mut ConsistencyReport) -> Vec<Device> {
    let mut keeper: HashMap<String, usize> = HashMap::new();
    for (idx, device) in devices.iter().enumerate() {
        let key = taxonomy::name_key(&device.name);
        let canonical = taxonomy::canonical_segment(device.tier);
        match keeper.get(&key) {
            None => {
                keeper.insert(key, idx);
            }
            Some(&kept) => {
                let kept_matches = canonical.is_some()
                    && devices[kept].assigned_segment == canonical;
                let this_matches = canonical.is_some() && device.assigned_segment == canonical;
                if this_matches && !kept_matches {
                    keeper.insert(key, idx);
                }
            }
        }
    }

    let winners: HashMap<String, Option<SegmentKind>> = keeper
        .iter()
        .map(|(key, &idx)| (key.clone(), devices[idx].assigned_segment))
        .collect();

    devices
        .into_iter()
        .enumerate()
        .filter(|(idx, device)| {
            let key = taxonomy::name_key(&device.name);
            if keeper.get(&key) == Some(idx) {
                return true;
            }
            obs::emit_device_removed(&device.name, "duplicate");
            report.duplicates_removed.push(RemovedDuplicate {
                name: device.name.clone(),
                dropped_segment: device.assigned_segment,
                kept_segment: winners.get(&key).copied().flatten(),
            });
            false
        })
        .map(|(_, device)| device)
        .collect()
}

/// Fill in example segments the service left blank, from their chapter.
pub fn locate_examples(devices: &mut [Device], alignment: &ChapterAlignment) {
    for example in devices.iter_mut().flat_map(|d| d.examples.iter_mut()) {
        if example.segment.is_none() {
            example.segment = example.chapter.and_then(|c| alignment.segment_of_chapter(c));
        }
    }
}

/// Examples whose chapter falls outside their device's tier-canonical
/// segment or outside the document.
///
/// Pervasive-voice devices are exempt from the segment check; their
/// placement is a teaching decision.
pub fn check_placement(
    devices: &[Device],
    alignment: &ChapterAlignment,
    total_chapters: u32,
) -> Vec<PlacementViolation> {
    let mut violations = Vec::new();
    for device in devices {
        let expected_segment = taxonomy::canonical_segment(device.tier);
        let expected_range = expected_segment.map(|s| alignment.get(s).chapter_range);
        for example in &device.examples {
            let problem = match example.chapter {
                None => Some(PlacementProblem::MissingChapter),
                Some(chapter) if chapter == 0 || chapter > total_chapters => {
                    Some(PlacementProblem::OutsideDocument)
                }
                Some(chapter) => match expected_range {
                    Some(range)
                        if device.tier != taxonomy::PERVASIVE_VOICE_TIER
                            && !range.contains(chapter) =>
                    {
                        Some(PlacementProblem::OutsideCanonicalSegment)
                    }
                    _ => None,
                },
            };
            if let Some(problem) = problem {
                violations.push(PlacementViolation {
                    device: device.name.clone(),
                    chapter: example.chapter,
                    expected_segment,
                    expected_range,
                    problem,
                });
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::Example;

    #[test]
    fn normalize_fills_segment_and_tier() {
        let mut devices = vec![Device::new("simile"), Device::new("Zeugma")
            .with_example(Example::new("q", 3).in_segment(SegmentKind::Climax))];
        let mut report = ConsistencyReport::default();
        normalize(&mut devices, &mut report);

        assert_eq!(devices[0].name, "Simile");
        assert_eq!(devices[0].tier, 1);
        assert_eq!(devices[0].assigned_segment, Some(SegmentKind::Exposition));
        assert_eq!(devices[1].tier, 0);
        assert_eq!(devices[1].assigned_segment, Some(SegmentKind::Climax));
        assert_eq!(report.unknown_names, vec!["Zeugma"]);
    }

    #[test]
    fn dedup_prefers_canonical_segment() {
        let devices = vec![
            Device::new("Symbolism").assigned_to(SegmentKind::Exposition),
            Device::new("Imagery").assigned_to(SegmentKind::Exposition),
            Device::new("Symbolism").assigned_to(SegmentKind::Climax),
        ];
        let (out, report) = ConsistencyEngine::new(None).apply(devices);
        let names: Vec<(&str, Option<SegmentKind>)> = out
            .iter()
            .map(|d| (d.name.as_str(), d.assigned_segment))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Imagery", Some(SegmentKind::Exposition)),
                ("Symbolism", Some(SegmentKind::Climax)),
            ]
        );
        assert_eq!(report.duplicates_removed.len(), 1);
        assert_eq!(
            report.duplicates_removed[0].dropped_segment,
            Some(SegmentKind::Exposition)
        );
    }

    #[test]
    fn dedup_falls_back_to_first_seen() {
        let devices = vec![
            Device::new("Motif").assigned_to(SegmentKind::Exposition),
            Device::new("motif").assigned_to(SegmentKind::Resolution),
        ];
        let (out, _) = ConsistencyEngine::new(None).apply(devices);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].assigned_segment, Some(SegmentKind::Exposition));
    }

    #[test]
    fn unknown_pov_code_disables_filter() {
        let engine = ConsistencyEngine::new(Some("MIXED"));
        assert_eq!(engine.pov(), None);
        let (out, report) = engine.apply(vec![
            Device::new("First-Person Narration"),
            Device::new("Third-Person Omniscient"),
        ]);
        assert_eq!(out.len(), 2);
        assert!(report.exclusivity_violations.is_empty());
    }

    #[test]
    fn placement_flags_examples_outside_canonical_range() {
        let alignment = crate::structure::conventional_alignment(31).unwrap();
        let mut devices = vec![
            Device::new("Foreshadowing").with_example(Example::new("a", 5)),
            Device::new("Foreshadowing").with_example(Example::new("b", 20)),
            Device::new("Point of View").with_example(Example::new("c", 2)),
            Device::new("Imagery").with_example(Example::new("d", 40)),
        ];
        normalize(&mut devices, &mut ConsistencyReport::default());
        let violations = check_placement(&devices, &alignment, 31);

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].chapter, Some(20));
        assert_eq!(violations[0].problem, PlacementProblem::OutsideCanonicalSegment);
        assert_eq!(violations[0].expected_segment, Some(SegmentKind::RisingAction));
        assert_eq!(violations[1].problem, PlacementProblem::OutsideDocument);
    }

    #[test]
    fn locate_uses_alignment() {
        let alignment = crate::structure::conventional_alignment(31).unwrap();
        let mut devices = vec![Device::new("Imagery")
            .with_example(Example::new("a", 16))
            .with_example(Example::new("b", 2).in_segment(SegmentKind::Resolution))];
        locate_examples(&mut devices, &alignment);
        assert_eq!(devices[0].examples[0].segment, Some(SegmentKind::Climax));
        assert_eq!(devices[0].examples[1].segment, Some(SegmentKind::Resolution));
    }

    #[test]
    fn example_without_chapter_is_reported() {
        let alignment = crate::structure::conventional_alignment(31).unwrap();
        let mut undated = Example::new("a", 1);
        undated.chapter = None;
        let mut devices = vec![Device::new("Imagery").with_example(undated)];
        locate_examples(&mut devices, &alignment);
        assert_eq!(devices[0].examples[0].segment, None);

        normalize(&mut devices, &mut ConsistencyReport::default());
        let violations = check_placement(&devices, &alignment, 31);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].chapter, None);
        assert_eq!(violations[0].problem, PlacementProblem::MissingChapter);
    }
}

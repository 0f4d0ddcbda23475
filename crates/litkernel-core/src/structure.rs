//! Structure validator.
//!
//! Certifies or rejects a candidate [`ChapterAlignment`]: the five segment
//! chapter sets must partition `{1..N}` exactly and the climax may cover at
//! most [`MAX_CLIMAX_CHAPTERS`]. Rejections carry a structured diagnostic;
//! nothing is repaired here.
//!
//! Also provides the conventional five-part split used to aim the stage-0
//! sampling windows and as a comparison baseline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::alignment::{ChapterAlignment, NarrativeSegment};
use crate::domain::error::{PipelineError, PositionError};
use crate::domain::range::ChapterRange;
use crate::domain::segment::SegmentKind;
use crate::domain::stage::Stage;

/// Largest climax the validator accepts, in chapters.
pub const MAX_CLIMAX_CHAPTERS: u32 = 3;

/// Smallest document the conventional split supports.
pub const MIN_CHAPTERS: u32 = 5;

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Why an alignment was rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDiagnostics {
    pub total_chapters: u32,
    /// Chapters in `1..=N` assigned to no segment.
    pub missing: Vec<u32>,
    /// Chapters assigned to more than one segment, once per extra assignment.
    pub duplicated: Vec<u32>,
    /// Range portions reported past chapter N, one per offending segment.
    pub out_of_range: Vec<ChapterRange>,
    /// Climax length when it exceeds [`MAX_CLIMAX_CHAPTERS`].
    pub climax_overflow: Option<u32>,
}

impl StructureDiagnostics {
    pub fn has_coverage_problem(&self) -> bool {
        !self.missing.is_empty() || !self.duplicated.is_empty() || !self.out_of_range.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_coverage_problem() && self.climax_overflow.is_none()
    }

    /// Convert into the pipeline error for `stage`. Coverage is checked
    /// first, so it wins when both problems are present.
    pub fn into_error(self, stage: Stage) -> PipelineError {
        match self.climax_overflow {
            Some(length) if !self.has_coverage_problem() => PipelineError::ClimaxOverflow {
                stage,
                length,
                max: MAX_CLIMAX_CHAPTERS,
            },
            _ => PipelineError::CoverageViolation {
                stage,
                diagnostics: self,
            },
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(T::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for StructureDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing chapters [{}]", join(&self.missing)));
        }
        if !self.duplicated.is_empty() {
            parts.push(format!("duplicated chapters [{}]", join(&self.duplicated)));
        }
        if !self.out_of_range.is_empty() {
            parts.push(format!(
                "chapters outside 1-{} [{}]",
                self.total_chapters,
                join(&self.out_of_range)
            ));
        }
        if let Some(length) = self.climax_overflow {
            parts.push(format!(
                "climax spans {length} chapters (max {MAX_CLIMAX_CHAPTERS})"
            ));
        }
        if parts.is_empty() {
            write!(f, "alignment covers chapters 1-{} exactly", self.total_chapters)
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

/// Validator outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "diagnostics", rename_all = "snake_case")]
pub enum StructureVerdict {
    Valid,
    Invalid(StructureDiagnostics),
}

impl StructureVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, StructureVerdict::Valid)
    }

    /// `Ok(())` when valid, otherwise the matching pipeline error.
    pub fn into_result(self, stage: Stage) -> Result<(), PipelineError> {
        match self {
            StructureVerdict::Valid => Ok(()),
            StructureVerdict::Invalid(diagnostics) => Err(diagnostics.into_error(stage)),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Diagnose per-segment chapter ranges against `total_chapters`.
///
/// Each range is clamped to `1..=N` before its chapters are counted; the
/// part past N is kept whole in `out_of_range`. The climax length comes
/// from the unclamped range.
pub fn diagnose_ranges(
    ranges: &[(SegmentKind, ChapterRange)],
    total_chapters: u32,
) -> StructureDiagnostics {
    let mut counts = vec![0u32; total_chapters as usize + 1];
    let mut out_of_range = Vec::new();
    let mut climax_len = 0u32;

    for (kind, range) in ranges {
        if let Some(inside) = range.clamp_to(total_chapters) {
            for chapter in inside.chapters() {
                counts[chapter as usize] += 1;
            }
        }
        if let Some(beyond) = range.beyond(total_chapters) {
            out_of_range.push(beyond);
        }
        if *kind == SegmentKind::Climax {
            climax_len = climax_len.saturating_add(range.len());
        }
    }
    out_of_range.sort_by_key(|r| (r.start(), r.end()));
    out_of_range.dedup();

    let missing = (1..=total_chapters)
        .filter(|&c| counts[c as usize] == 0)
        .collect();
    let duplicated = (1..=total_chapters)
        .flat_map(|c| std::iter::repeat(c).take(counts[c as usize].saturating_sub(1) as usize))
        .collect();
    let climax_overflow = (climax_len > MAX_CLIMAX_CHAPTERS).then_some(climax_len);

    StructureDiagnostics {
        total_chapters,
        missing,
        duplicated,
        out_of_range,
        climax_overflow,
    }
}

/// Certify or reject an alignment for a document of `total_chapters`.
pub fn validate_alignment(alignment: &ChapterAlignment, total_chapters: u32) -> StructureVerdict {
    let diagnostics = diagnose_ranges(&alignment.ranges(), total_chapters);
    if diagnostics.is_clean() {
        StructureVerdict::Valid
    } else {
        StructureVerdict::Invalid(diagnostics)
    }
}

/// A segment whose primary chapter lies outside its own range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisplacedPrimary {
    pub segment: SegmentKind,
    pub primary_chapter: u32,
    pub chapter_range: ChapterRange,
}

/// Primary chapters that fall outside their segment. Advisory only.
pub fn misplaced_primaries(alignment: &ChapterAlignment) -> Vec<MisplacedPrimary> {
    alignment
        .iter()
        .filter(|s| !s.chapter_range.contains(s.primary_chapter))
        .map(|s| MisplacedPrimary {
            segment: s.kind,
            primary_chapter: s.primary_chapter,
            chapter_range: s.chapter_range,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Conventional distribution
// ---------------------------------------------------------------------------

fn percent_of(n: u32, percent: u32) -> u32 {
    n * percent / 100
}

/// The conventional five-part split of `n` chapters: exposition ~12%,
/// climax at the midpoint (~50-55%), falling action to ~85%.
///
/// Boundaries are nudged so that every segment holds at least one chapter.
/// Primary chapters are range midpoints.
pub fn conventional_alignment(n: u32) -> Result<ChapterAlignment, PositionError> {
    if n < MIN_CHAPTERS {
        return Err(PositionError::ChapterOutOfRange {
            chapter: n,
            total_chapters: MIN_CHAPTERS,
        });
    }

    let exposition_end = percent_of(n, 12).max(1);
    let climax_start = percent_of(n, 50).max(exposition_end + 2);
    let climax_end = percent_of(n, 55)
        .max(climax_start)
        .min(climax_start + MAX_CLIMAX_CHAPTERS - 1);
    let falling_end = percent_of(n, 85).max(climax_end + 1).min(n - 1);
    let climax_end = climax_end.min(falling_end - 1);

    let segment = |kind: SegmentKind, start: u32, end: u32| {
        ChapterRange::new(start, end).map(|range| NarrativeSegment::new(kind, range, range.midpoint()))
    };

    Ok(ChapterAlignment::new(
        segment(SegmentKind::Exposition, 1, exposition_end)?,
        segment(SegmentKind::RisingAction, exposition_end + 1, climax_start - 1)?,
        segment(SegmentKind::Climax, climax_start, climax_end)?,
        segment(SegmentKind::FallingAction, climax_end + 1, falling_end)?,
        segment(SegmentKind::Resolution, falling_end + 1, n)?,
    ))
}

/// How one segment of two alignments compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentAgreement {
    pub segment: SegmentKind,
    pub left: ChapterRange,
    pub right: ChapterRange,
    /// Chapters both ranges share.
    pub overlap: u32,
    pub exact: bool,
}

/// Per-segment agreement between two alignments (e.g. a service-proposed
/// alignment against [`conventional_alignment`]).
pub fn compare_alignments(left: &ChapterAlignment, right: &ChapterAlignment) -> Vec<SegmentAgreement> {
    SegmentKind::ALL
        .into_iter()
        .map(|kind| {
            let (l, r) = (left.get(kind).chapter_range, right.get(kind).chapter_range);
            let lo = l.start().max(r.start());
            let hi = l.end().min(r.end());
            SegmentAgreement {
                segment: kind,
                left: l,
                right: r,
                overlap: if hi >= lo { hi - lo + 1 } else { 0 },
                exact: l == r,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alignment(bounds: [(u32, u32); 5]) -> ChapterAlignment {
        let segs: Vec<NarrativeSegment> = SegmentKind::ALL
            .into_iter()
            .zip(bounds)
            .map(|(kind, (s, e))| NarrativeSegment::new(kind, ChapterRange::new(s, e).unwrap(), s))
            .collect();
        let mut it = segs.into_iter();
        ChapterAlignment::new(
            it.next().unwrap(),
            it.next().unwrap(),
            it.next().unwrap(),
            it.next().unwrap(),
            it.next().unwrap(),
        )
    }

    #[test]
    fn valid_partition_passes() {
        let a = alignment([(1, 3), (4, 14), (15, 17), (18, 26), (27, 31)]);
        assert_eq!(validate_alignment(&a, 31), StructureVerdict::Valid);
    }

    #[test]
    fn gap_and_overlap_are_reported() {
        let a = alignment([(1, 3), (5, 14), (14, 16), (17, 26), (27, 31)]);
        match validate_alignment(&a, 31) {
            StructureVerdict::Invalid(d) => {
                assert_eq!(d.missing, vec![4]);
                assert_eq!(d.duplicated, vec![14]);
                assert!(d.out_of_range.is_empty());
                assert_eq!(d.climax_overflow, None);
            }
            StructureVerdict::Valid => panic!("expected invalid"),
        }
    }

    #[test]
    fn climax_overflow_is_reported() {
        let a = alignment([(1, 3), (4, 12), (13, 17), (18, 26), (27, 31)]);
        let verdict = validate_alignment(&a, 31);
        let err = verdict.into_result(Stage::Structure).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ClimaxOverflow { length: 5, max: 3, .. }
        ));
    }

    #[test]
    fn coverage_wins_over_climax() {
        let a = alignment([(1, 3), (4, 12), (13, 17), (18, 26), (27, 30)]);
        let err = validate_alignment(&a, 31)
            .into_result(Stage::Structure)
            .unwrap_err();
        match err {
            PipelineError::CoverageViolation { diagnostics, .. } => {
                assert_eq!(diagnostics.missing, vec![31]);
                assert_eq!(diagnostics.climax_overflow, Some(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chapters_past_the_end_are_out_of_range() {
        let a = alignment([(1, 3), (4, 14), (15, 17), (18, 26), (27, 33)]);
        match validate_alignment(&a, 31) {
            StructureVerdict::Invalid(d) => {
                assert_eq!(d.out_of_range, vec![ChapterRange::new(32, 33).unwrap()]);
                assert!(d.to_string().contains("chapters outside 1-31 [32-33]"));
            }
            StructureVerdict::Valid => panic!("expected invalid"),
        }
    }

    #[test]
    fn enormous_climax_is_rejected_compactly() {
        let a = alignment([(1, 4), (5, 15), (16, 20_000_000), (19, 27), (28, 31)]);
        let StructureVerdict::Invalid(d) = validate_alignment(&a, 31) else {
            panic!("expected invalid");
        };
        assert_eq!(d.out_of_range, vec![ChapterRange::new(32, 20_000_000).unwrap()]);
        assert_eq!(d.climax_overflow, Some(19_999_985));
        assert_eq!(d.duplicated, (19..=31).collect::<Vec<_>>());
        assert!(d.missing.is_empty());
    }

    #[test]
    fn range_up_to_u32_max_does_not_expand() {
        let a = alignment([(1, 4), (5, 15), (16, 18), (19, 27), (28, u32::MAX)]);
        let StructureVerdict::Invalid(d) = validate_alignment(&a, 31) else {
            panic!("expected invalid");
        };
        assert_eq!(d.out_of_range.len(), 1);
        assert_eq!(d.out_of_range[0].end(), u32::MAX);
        assert!(d.duplicated.is_empty());
    }

    #[test]
    fn duplicated_is_a_multiset() {
        let range = |s, e| ChapterRange::new(s, e).unwrap();
        let ranges = vec![
            (SegmentKind::Exposition, range(1, 2)),
            (SegmentKind::RisingAction, range(2, 3)),
            (SegmentKind::Climax, range(2, 2)),
            (SegmentKind::FallingAction, range(4, 4)),
            (SegmentKind::Resolution, range(5, 5)),
        ];
        let d = diagnose_ranges(&ranges, 5);
        assert_eq!(d.duplicated, vec![2, 2]);
    }

    #[test]
    fn summary_lists_every_problem() {
        let d = StructureDiagnostics {
            total_chapters: 23,
            missing: vec![4, 5],
            duplicated: vec![9],
            out_of_range: vec![],
            climax_overflow: Some(4),
        };
        let text = d.to_string();
        assert!(text.contains("missing chapters [4, 5]"));
        assert!(text.contains("duplicated chapters [9]"));
        assert!(text.contains("climax spans 4 chapters"));
    }

    #[test]
    fn conventional_split_for_31_chapters() {
        let a = conventional_alignment(31).unwrap();
        let ranges: Vec<String> = a.iter().map(|s| s.chapter_range.to_string()).collect();
        assert_eq!(ranges, vec!["1-3", "4-14", "15-17", "18-26", "27-31"]);
    }

    #[test]
    fn conventional_split_is_always_valid() {
        for n in MIN_CHAPTERS..=120 {
            let a = conventional_alignment(n).unwrap();
            assert_eq!(validate_alignment(&a, n), StructureVerdict::Valid, "n = {n}");
            assert!(misplaced_primaries(&a).is_empty());
        }
    }

    #[test]
    fn conventional_split_needs_five_chapters() {
        assert!(conventional_alignment(4).is_err());
    }

    #[test]
    fn compare_reports_overlap() {
        let conventional = conventional_alignment(31).unwrap();
        let proposed = alignment([(1, 3), (4, 15), (16, 18), (19, 26), (27, 31)]);
        let cmp = compare_alignments(&proposed, &conventional);
        assert!(cmp[0].exact);
        assert_eq!(cmp[2].overlap, 2);
        assert!(!cmp[2].exact);
    }

    #[test]
    fn misplaced_primary_is_advisory() {
        let mut a = alignment([(1, 3), (4, 14), (15, 17), (18, 26), (27, 31)]);
        a.get_mut(SegmentKind::Climax).primary_chapter = 20;
        assert!(validate_alignment(&a, 31).is_valid());
        let misplaced = misplaced_primaries(&a);
        assert_eq!(misplaced.len(), 1);
        assert_eq!(misplaced[0].segment, SegmentKind::Climax);
    }
}

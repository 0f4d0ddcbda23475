//! Chapter-to-segment alignment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::range::ChapterRange;
use crate::domain::segment::SegmentKind;

/// One dramatic-arc segment with its chapter range and optional text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSegment {
    pub kind: SegmentKind,
    pub chapter_range: ChapterRange,
    /// Single representative chapter; expected inside `chapter_range`.
    pub primary_chapter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_events: Vec<String>,
    /// Why the extracted passage represents this segment (stage 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Extracted passage (stage 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
}

impl NarrativeSegment {
    pub fn new(kind: SegmentKind, chapter_range: ChapterRange, primary_chapter: u32) -> Self {
        Self {
            kind,
            chapter_range,
            primary_chapter,
            description: None,
            key_events: Vec::new(),
            rationale: None,
            passage: None,
        }
    }

    /// Chapters covered by this segment within `1..=total_chapters`.
    pub fn chapters_within(&self, total_chapters: u32) -> Vec<u32> {
        self.chapter_range
            .clamp_to(total_chapters)
            .map(|r| r.chapters().collect())
            .unwrap_or_default()
    }
}

/// All five segments of a document, one per [`SegmentKind`].
///
/// Holding exactly five segments is structural; whether their ranges
/// partition the document is checked by the structure validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<SegmentKind, NarrativeSegment>",
    into = "BTreeMap<SegmentKind, NarrativeSegment>"
)]
pub struct ChapterAlignment {
    segments: [NarrativeSegment; 5],
}

impl ChapterAlignment {
    /// Build an alignment from the five segments. Each segment's `kind` is
    /// forced to the slot it is passed in.
    pub fn new(
        exposition: NarrativeSegment,
        rising_action: NarrativeSegment,
        climax: NarrativeSegment,
        falling_action: NarrativeSegment,
        resolution: NarrativeSegment,
    ) -> Self {
        let mut segments = [exposition, rising_action, climax, falling_action, resolution];
        for (segment, kind) in segments.iter_mut().zip(SegmentKind::ALL) {
            segment.kind = kind;
        }
        Self { segments }
    }

    pub fn get(&self, kind: SegmentKind) -> &NarrativeSegment {
        &self.segments[kind.index()]
    }

    pub fn get_mut(&mut self, kind: SegmentKind) -> &mut NarrativeSegment {
        &mut self.segments[kind.index()]
    }

    /// Segments in narrative order.
    pub fn iter(&self) -> impl Iterator<Item = &NarrativeSegment> {
        self.segments.iter()
    }

    /// First segment (in narrative order) whose range contains `chapter`.
    pub fn segment_of_chapter(&self, chapter: u32) -> Option<SegmentKind> {
        self.segments
            .iter()
            .find(|s| s.chapter_range.contains(chapter))
            .map(|s| s.kind)
    }

    /// `(kind, range)` pairs, the validator's input shape.
    pub fn ranges(&self) -> Vec<(SegmentKind, ChapterRange)> {
        self.segments.iter().map(|s| (s.kind, s.chapter_range)).collect()
    }

    /// `(kind, chapters)` pairs with every range clamped to the document.
    pub fn chapter_sets(&self, total_chapters: u32) -> Vec<(SegmentKind, Vec<u32>)> {
        self.segments
            .iter()
            .map(|s| (s.kind, s.chapters_within(total_chapters)))
            .collect()
    }
}

impl TryFrom<BTreeMap<SegmentKind, NarrativeSegment>> for ChapterAlignment {
    type Error = String;

    fn try_from(mut map: BTreeMap<SegmentKind, NarrativeSegment>) -> Result<Self, Self::Error> {
        let mut take = |kind: SegmentKind| {
            map.remove(&kind)
                .ok_or_else(|| format!("alignment is missing the {kind} segment"))
        };
        Ok(ChapterAlignment::new(
            take(SegmentKind::Exposition)?,
            take(SegmentKind::RisingAction)?,
            take(SegmentKind::Climax)?,
            take(SegmentKind::FallingAction)?,
            take(SegmentKind::Resolution)?,
        ))
    }
}

impl From<ChapterAlignment> for BTreeMap<SegmentKind, NarrativeSegment> {
    fn from(alignment: ChapterAlignment) -> Self {
        alignment
            .segments
            .into_iter()
            .map(|s| (s.kind, s))
            .collect()
    }
}

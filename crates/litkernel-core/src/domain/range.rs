//! Inclusive chapter intervals.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::error::PositionError;
use crate::position;

/// An inclusive chapter interval `[start, end]` with `1 <= start <= end`.
///
/// Serializes as its canonical string: `"4-14"`, or `"15"` when
/// `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChapterRange {
    start: u32,
    end: u32,
}

impl ChapterRange {
    pub fn new(start: u32, end: u32) -> Result<Self, PositionError> {
        if start == 0 || end < start {
            return Err(PositionError::MalformedRange {
                input: format!("{start}-{end}"),
                reason: "chapters are numbered from 1 and start must not exceed end".into(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn single(chapter: u32) -> Result<Self, PositionError> {
        Self::new(chapter, chapter)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of chapters covered.
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one chapter.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, chapter: u32) -> bool {
        (self.start..=self.end).contains(&chapter)
    }

    pub fn chapters(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    /// The part of this range inside `1..=total_chapters`, if any.
    pub fn clamp_to(&self, total_chapters: u32) -> Option<ChapterRange> {
        (self.start <= total_chapters).then(|| ChapterRange {
            start: self.start,
            end: self.end.min(total_chapters),
        })
    }

    /// The part of this range past `total_chapters`, if any.
    pub fn beyond(&self, total_chapters: u32) -> Option<ChapterRange> {
        (self.end > total_chapters).then(|| ChapterRange {
            start: self.start.max(total_chapters.saturating_add(1)),
            end: self.end,
        })
    }

    /// Midpoint chapter, rounding down.
    pub fn midpoint(&self) -> u32 {
        self.start + (self.end - self.start) / 2
    }
}

impl fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for ChapterRange {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        position::parse_chapter_range(s)
    }
}

impl Serialize for ChapterRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChapterRange {
    /// Accepts the canonical string or a bare chapter number.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u32),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => ChapterRange::single(n).map_err(serde::de::Error::custom),
        }
    }
}

//! The five fixed dramatic-arc segments.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// One of the five dramatic-arc phases, in narrative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Exposition,
    RisingAction,
    Climax,
    FallingAction,
    Resolution,
}

impl SegmentKind {
    /// All segments in narrative order.
    pub const ALL: [SegmentKind; 5] = [
        SegmentKind::Exposition,
        SegmentKind::RisingAction,
        SegmentKind::Climax,
        SegmentKind::FallingAction,
        SegmentKind::Resolution,
    ];

    /// Canonical snake_case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Exposition => "exposition",
            SegmentKind::RisingAction => "rising_action",
            SegmentKind::Climax => "climax",
            SegmentKind::FallingAction => "falling_action",
            SegmentKind::Resolution => "resolution",
        }
    }

    /// Zero-based position in narrative order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a segment name leniently: case, spaces, hyphens and
    /// underscores are ignored ("Rising Action", "rising-action").
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "exposition" => Some(SegmentKind::Exposition),
            "risingaction" => Some(SegmentKind::RisingAction),
            "climax" => Some(SegmentKind::Climax),
            "fallingaction" => Some(SegmentKind::FallingAction),
            "resolution" | "denouement" => Some(SegmentKind::Resolution),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SegmentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SegmentKind::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown narrative segment: {raw}")))
    }
}

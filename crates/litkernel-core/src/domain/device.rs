//! Literary-device instances and their located examples.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::segment::SegmentKind;
use crate::position::leading_chapter;

/// One quoted occurrence of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(alias = "text", alias = "quote_snippet")]
    pub quote: String,
    /// `None` when the service gave no usable chapter; reported as a
    /// placement violation rather than failing the stage.
    #[serde(
        default,
        deserialize_with = "deserialize_chapter",
        skip_serializing_if = "Option::is_none"
    )]
    pub chapter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    /// Segment the example is located in.
    #[serde(
        default,
        alias = "freytag_section",
        alias = "narrative_position",
        skip_serializing_if = "Option::is_none"
    )]
    pub segment: Option<SegmentKind>,
    /// Fields passed through untouched (page, page_range, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Example {
    pub fn new(quote: impl Into<String>, chapter: u32) -> Self {
        Self {
            quote: quote.into(),
            chapter: Some(chapter),
            scene: None,
            segment: None,
            extra: Map::new(),
        }
    }

    pub fn in_segment(mut self, segment: SegmentKind) -> Self {
        self.segment = Some(segment);
        self
    }
}

/// A literary device with its teaching tier and examples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// 1-5, or 0 when the name is outside the taxonomy. Recomputed from the
    /// taxonomy by the consistency engine; service-reported tiers are ignored.
    #[serde(default, deserialize_with = "deserialize_tier")]
    pub tier: u8,
    #[serde(default, alias = "assigned_section", skip_serializing_if = "Option::is_none")]
    pub assigned_segment: Option<SegmentKind>,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: None,
            tier: 0,
            assigned_segment: None,
            examples: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn assigned_to(mut self, segment: SegmentKind) -> Self {
        self.assigned_segment = Some(segment);
        self
    }

    pub fn with_example(mut self, example: Example) -> Self {
        self.examples.push(example);
        self
    }
}

/// Accept `7`, `"7"`, `"Chapter 7"` or looser text such as `"pages 12-14"`.
/// Anything without a usable chapter becomes `None`.
fn deserialize_chapter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0),
        Value::String(s) => leading_chapter(&s),
        _ => None,
    })
}

/// Service-reported tiers are advisory, so anything unreadable is 0.
fn deserialize_tier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

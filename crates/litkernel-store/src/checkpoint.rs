//! Checkpoint naming and the store contract.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;

/// Reduce a document title to a filesystem-safe slug.
///
/// Keeps ASCII alphanumerics, `-` and `_`; spaces become `_`; everything
/// else is dropped. An empty result becomes `untitled`.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let slug = kept.trim().replace(' ', "_");
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Identifies one stage checkpoint of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    /// Sanitized document title.
    pub document: String,
    /// Fixed stage identifier (`stage0`, `stage1`, `stage2a`, `stage2b`).
    pub stage: String,
}

impl CheckpointKey {
    /// Build a key from a raw title; the title is slugified.
    pub fn new(title: &str, stage: impl Into<String>) -> Self {
        Self {
            document: slugify(title),
            stage: stage.into(),
        }
    }

    /// File name used by file-backed stores: `<slug>_<stage>.json`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.document, self.stage)
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document, self.stage)
    }
}

/// Persisted snapshots of validated stage output.
///
/// Guarantees:
/// - `load` after `save` returns exactly the saved payload.
/// - `load` never returns a partially written payload.
/// - `delete` of an absent key is not an error; it returns `false`.
pub trait CheckpointStore: Send + Sync {
    /// Read the payload for `key`, or `None` if no checkpoint exists.
    ///
    /// Returns `StoreError::Corrupt` if the file exists but is not valid JSON.
    fn load(&self, key: &CheckpointKey) -> StoreResult<Option<Value>>;

    /// Persist `payload` under `key`, replacing any previous checkpoint.
    fn save(&self, key: &CheckpointKey, payload: &Value) -> StoreResult<()>;

    /// Remove the checkpoint for `key`. Returns whether one existed.
    fn delete(&self, key: &CheckpointKey) -> StoreResult<bool>;

    /// Whether a checkpoint exists for `key` (without parsing it).
    fn exists(&self, key: &CheckpointKey) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_replaces_spaces_and_drops_punctuation() {
        assert_eq!(slugify("To Kill a Mockingbird"), "To_Kill_a_Mockingbird");
        assert_eq!(slugify("The Giver: 25th Ed."), "The_Giver_25th_Ed");
        assert_eq!(slugify("  Old/Man & the Sea "), "OldMan__the_Sea");
    }

    #[test]
    fn slugify_empty_title() {
        assert_eq!(slugify(""), "untitled");
        assert_eq!(slugify("???"), "untitled");
    }

    #[test]
    fn key_file_name() {
        let key = CheckpointKey::new("The Giver", "stage2a");
        assert_eq!(key.file_name(), "The_Giver_stage2a.json");
        assert_eq!(key.to_string(), "The_Giver/stage2a");
    }
}

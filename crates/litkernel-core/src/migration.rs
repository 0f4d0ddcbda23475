//! Record schema versions, migrations and patching.
//!
//! | version | layout                                                        |
//! |---------|---------------------------------------------------------------|
//! | 1       | legacy: `extracts`, `macro_variables`, `micro_devices`        |
//! | 2       | v1 + `text_structure`, `narrative_position_mapping`           |
//! | 3       | current: `alignment`, `macro_profile`, `devices`, report      |
//!
//! Migrations run on raw JSON so fields the current types do not know about
//! survive. Legacy blocks that are folded into new fields are kept under
//! `legacy`.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::devices::taxonomy::name_key;
use crate::domain::record::CURRENT_SCHEMA_VERSION;
use crate::domain::segment::SegmentKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record schema version {0} is newer than supported version {max}", max = CURRENT_SCHEMA_VERSION)]
    UnsupportedVersion(u64),
}

/// Schema version of a raw record, explicit or inferred from its keys.
pub fn schema_version_of(value: &Value) -> u64 {
    if let Some(v) = value.get("schema_version").and_then(Value::as_u64) {
        return v;
    }
    let has = |key: &str| value.get(key).is_some();
    if has("text_structure") || has("narrative_position_mapping") {
        2
    } else if has("alignment") && has("devices") {
        3
    } else {
        1
    }
}

/// Run every declared step from the record's version up to the current one.
pub fn migrate_to_current(value: Value) -> Result<Value, MigrationError> {
    let mut version = schema_version_of(&value);
    if version > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(MigrationError::UnsupportedVersion(version));
    }
    let Value::Object(mut map) = value else {
        return Err(MigrationError::NotAnObject);
    };

    while version < u64::from(CURRENT_SCHEMA_VERSION) {
        match version {
            0 | 1 => v1_to_v2(&mut map),
            _ => v2_to_v3(&mut map),
        }
        version = map
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(CURRENT_SCHEMA_VERSION));
        debug!(to = version, "migrated record schema");
    }
    Ok(Value::Object(map))
}

fn segment_position(extract: &Value) -> Option<Value> {
    let mut position = Map::new();
    if let Some(range) = extract.get("chapter_range") {
        position.insert("chapter_range".into(), range.clone());
    } else if let (Some(start), Some(end)) = (extract.get("chapter_start"), extract.get("chapter_end")) {
        position.insert("chapter_range".into(), json!(format!("{}-{}", plain(start), plain(end))));
    }
    if let Some(primary) = extract.get("primary_chapter") {
        position.insert("primary_chapter".into(), primary.clone());
    }
    (!position.is_empty()).then_some(Value::Object(position))
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// v1 -> v2: add `text_structure` and a position mapping derived from any
/// chapter information the extracts carry.
fn v1_to_v2(map: &mut Map<String, Value>) {
    map.entry("text_structure").or_insert_with(|| json!({}));

    if !map.contains_key("narrative_position_mapping") {
        let mut mapping = Map::new();
        if let Some(extracts) = map.get("extracts").and_then(Value::as_object) {
            for (key, extract) in extracts {
                if let (Some(kind), Some(position)) = (SegmentKind::parse(key), segment_position(extract)) {
                    mapping.insert(kind.as_str().to_string(), position);
                }
            }
        }
        map.insert("narrative_position_mapping".into(), Value::Object(mapping));
    }
    map.insert("schema_version".into(), json!(2));
}

fn rename_key(obj: &mut Map<String, Value>, aliases: &[&str], to: &str) {
    if obj.contains_key(to) {
        return;
    }
    for alias in aliases {
        if let Some(v) = obj.remove(*alias) {
            obj.insert(to.to_string(), v);
            return;
        }
    }
}

fn canonical_segment_value(obj: &mut Map<String, Value>, key: &str) {
    let parsed = obj
        .get(key)
        .and_then(Value::as_str)
        .and_then(SegmentKind::parse);
    if let Some(kind) = parsed {
        obj.insert(key.to_string(), json!(kind.as_str()));
    }
}

fn migrate_device(device: &mut Value) {
    let Some(obj) = device.as_object_mut() else {
        return;
    };
    rename_key(obj, &["assigned_section"], "assigned_segment");
    canonical_segment_value(obj, "assigned_segment");
    if let Some(examples) = obj.get_mut("examples").and_then(Value::as_array_mut) {
        for example in examples.iter_mut().filter_map(Value::as_object_mut) {
            rename_key(example, &["text", "quote_snippet"], "quote");
            rename_key(example, &["freytag_section", "narrative_position"], "segment");
            canonical_segment_value(example, "segment");
        }
    }
}

/// v2 -> v3: fold the position mapping and extracts into `alignment`,
/// rename the macro and device blocks.
fn v2_to_v3(map: &mut Map<String, Value>) {
    let mut legacy = map
        .remove("legacy")
        .and_then(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        })
        .unwrap_or_default();

    let mapping = map.remove("narrative_position_mapping");
    let extracts = map.remove("extracts");
    let text_structure = map.remove("text_structure");

    if !map.contains_key("alignment") {
        let mut alignment = Map::new();
        for kind in SegmentKind::ALL {
            let mut segment = mapping
                .as_ref()
                .and_then(|m| m.get(kind.as_str()))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            if let Some(extract) = extracts.as_ref().and_then(|e| {
                e.as_object()?
                    .iter()
                    .find(|(k, _)| SegmentKind::parse(k) == Some(kind))
                    .map(|(_, v)| v)
            }) {
                for (from, to) in [("passage", "passage"), ("text", "passage"), ("rationale", "rationale")] {
                    if let Some(v) = extract.get(from) {
                        segment.entry(to).or_insert_with(|| v.clone());
                    }
                }
            }
            if !segment.is_empty() {
                segment.insert("kind".into(), json!(kind.as_str()));
                alignment.insert(kind.as_str().to_string(), Value::Object(segment));
            }
        }
        map.insert("alignment".into(), Value::Object(alignment));
    }

    let total = text_structure.as_ref().and_then(|ts| {
        ts.get("total_chapters")
            .or_else(|| ts.get("total_chapters_estimate"))
            .cloned()
    });
    if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
        if let Some(total) = total {
            metadata.entry("total_chapters").or_insert(total);
        }
    }

    rename_key(map, &["macro_variables"], "macro_profile");
    rename_key(map, &["micro_devices"], "devices");
    if let Some(devices) = map.get_mut("devices").and_then(Value::as_array_mut) {
        devices.iter_mut().for_each(migrate_device);
    }

    for (key, value) in [
        ("narrative_position_mapping", mapping),
        ("extracts", extracts),
        ("text_structure", text_structure),
    ] {
        if let Some(value) = value {
            legacy.insert(key.to_string(), value);
        }
    }
    if !legacy.is_empty() {
        map.insert("legacy".into(), Value::Object(legacy));
    }
    map.insert("schema_version".into(), json!(3));
}

// ---------------------------------------------------------------------------
// Patching
// ---------------------------------------------------------------------------

/// Copy every field `source` has and `target` lacks into `target`,
/// recursively. Never overwrites. Device arrays match by name, example
/// arrays by index; other arrays are left alone.
pub fn merge_missing(target: &mut Value, source: &Value) {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return;
    };
    for (key, source_value) in source {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), source_value.clone());
            }
            Some(target_value) => match key.as_str() {
                "devices" | "micro_devices" => merge_devices(target_value, source_value),
                "examples" => merge_by_index(target_value, source_value),
                _ => merge_missing(target_value, source_value),
            },
        }
    }
}

fn device_key(device: &Value) -> Option<String> {
    device.get("name").and_then(Value::as_str).map(name_key)
}

fn merge_devices(target: &mut Value, source: &Value) {
    let (Some(target), Some(source)) = (target.as_array_mut(), source.as_array()) else {
        return;
    };
    for device in target.iter_mut() {
        let Some(key) = device_key(device) else {
            continue;
        };
        if let Some(newer) = source.iter().find(|d| device_key(d).as_deref() == Some(key.as_str())) {
            merge_missing(device, newer);
        }
    }
}

fn merge_by_index(target: &mut Value, source: &Value) {
    let (Some(target), Some(source)) = (target.as_array_mut(), source.as_array()) else {
        return;
    };
    for (older, newer) in target.iter_mut().zip(source) {
        merge_missing(older, newer);
    }
}

/// How [`patch`] records its work in `metadata.patch_method`.
pub const PATCH_METHOD: &str = "regenerated_and_patched";

/// The `metadata` object of a record, created if absent.
pub(crate) fn metadata_mut(record: &mut Value) -> Option<&mut Map<String, Value>> {
    record
        .as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

/// Rename the legacy `metadata.kernel_version` key to `record_version`.
fn rename_legacy_version(record: &mut Value) {
    let Some(metadata) = record.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    if let Some(version) = metadata.remove("kernel_version") {
        metadata.entry("record_version").or_insert(version);
    }
}

/// Bring `old` forward to the current schema and backfill it from `new`
/// without discarding anything `old` already has. Stamps
/// `metadata.patched_at` and `metadata.patch_method`.
pub fn patch(old: Value, new: Value) -> Result<Value, MigrationError> {
    let mut merged = migrate_to_current(old)?;
    let mut newer = migrate_to_current(new)?;
    rename_legacy_version(&mut merged);
    rename_legacy_version(&mut newer);
    merge_missing(&mut merged, &newer);

    let metadata = metadata_mut(&mut merged).ok_or(MigrationError::NotAnObject)?;
    metadata.insert("patched_at".into(), json!(Utc::now().to_rfc3339()));
    metadata.insert("patch_method".into(), json!(PATCH_METHOD));
    info!("record patched");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_record() -> Value {
        json!({
            "metadata": { "title": "To Kill a Mockingbird", "author": "Harper Lee" },
            "extracts": {
                "exposition": { "text": "Maycomb was a tired old town", "chapter_range": "1-3" },
                "climax": { "passage": "the trial", "chapter_start": 17, "chapter_end": 21, "rationale": "r" }
            },
            "macro_variables": { "narrative": { "pov": "FP" } },
            "micro_devices": [
                {
                    "name": "First-Person Narration",
                    "definition": "curated by hand",
                    "assigned_section": "Resolution",
                    "examples": [{ "text": "When he was nearly thirteen", "chapter": 1, "freytag_section": "Exposition" }]
                }
            ]
        })
    }

    #[test]
    fn version_inference() {
        assert_eq!(schema_version_of(&legacy_record()), 1);
        assert_eq!(schema_version_of(&json!({ "text_structure": {} })), 2);
        assert_eq!(schema_version_of(&json!({ "schema_version": 3 })), 3);
    }

    #[test]
    fn v1_migrates_to_current() {
        let migrated = migrate_to_current(legacy_record()).unwrap();
        assert_eq!(migrated["schema_version"], 3);
        assert_eq!(migrated["alignment"]["exposition"]["chapter_range"], "1-3");
        assert_eq!(migrated["alignment"]["exposition"]["passage"], "Maycomb was a tired old town");
        assert_eq!(migrated["alignment"]["climax"]["chapter_range"], "17-21");
        assert_eq!(migrated["macro_profile"]["narrative"]["pov"], "FP");

        let device = &migrated["devices"][0];
        assert_eq!(device["assigned_segment"], "resolution");
        assert_eq!(device["examples"][0]["quote"], "When he was nearly thirteen");
        assert_eq!(device["examples"][0]["segment"], "exposition");
        assert!(migrated["legacy"]["extracts"].is_object());
        assert!(migrated.get("micro_devices").is_none());
    }

    #[test]
    fn current_record_is_untouched() {
        let record = json!({ "schema_version": 3, "alignment": {}, "devices": [] });
        assert_eq!(migrate_to_current(record.clone()).unwrap(), record);
    }

    #[test]
    fn newer_version_is_refused() {
        let err = migrate_to_current(json!({ "schema_version": 9 })).unwrap_err();
        assert_eq!(err, MigrationError::UnsupportedVersion(9));
    }

    #[test]
    fn merge_never_overwrites() {
        let mut old = json!({ "a": 1, "nested": { "keep": "old" } });
        merge_missing(&mut old, &json!({ "a": 2, "b": 3, "nested": { "keep": "new", "add": true } }));
        assert_eq!(old, json!({ "a": 1, "b": 3, "nested": { "keep": "old", "add": true } }));
    }

    #[test]
    fn patch_backfills_devices_by_name_and_examples_by_index() {
        let new = json!({
            "schema_version": 3,
            "metadata": { "title": "To Kill a Mockingbird", "source_digest": "abc" },
            "alignment": {},
            "devices": [
                {
                    "name": "first person narration",
                    "definition": "regenerated",
                    "tier": 5,
                    "examples": [{ "quote": "other", "chapter": 2, "scene": "porch", "page": 5 }]
                },
                { "name": "Simile", "tier": 1, "examples": [] }
            ]
        });

        let patched = patch(legacy_record(), new).unwrap();
        let device = &patched["devices"][0];
        assert_eq!(device["definition"], "curated by hand");
        assert_eq!(device["tier"], 5);
        assert_eq!(device["examples"][0]["quote"], "When he was nearly thirteen");
        assert_eq!(device["examples"][0]["scene"], "porch");
        assert_eq!(patched["devices"].as_array().unwrap().len(), 1);
        assert_eq!(patched["metadata"]["author"], "Harper Lee");
        assert_eq!(patched["metadata"]["source_digest"], "abc");
        assert!(patched["metadata"]["patched_at"].is_string());
        assert_eq!(patched["metadata"]["patch_method"], PATCH_METHOD);
    }

    #[test]
    fn patch_refuses_non_object_records() {
        assert_eq!(patch(json!([1, 2]), json!({})), Err(MigrationError::NotAnObject));
    }

    #[test]
    fn legacy_version_key_is_renamed() {
        let old = json!({ "schema_version": 3, "metadata": { "kernel_version": "3.4" } });
        let new = json!({ "schema_version": 3, "metadata": { "record_version": "3.0" } });
        let patched = patch(old, new).unwrap();
        assert_eq!(patched["metadata"]["record_version"], "3.4");
        assert!(patched["metadata"].get("kernel_version").is_none());
    }
}

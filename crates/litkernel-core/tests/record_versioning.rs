//! Versioned patching of record files and the archive index.

use std::fs;
use std::path::Path;

use chrono::DateTime;
use litkernel_core::archive::{base_name, INDEX_FILE};
use litkernel_core::migration::PATCH_METHOD;
use litkernel_core::{patch_file, Archive, ArchiveRequest, PatchOptions, RecordVersion, VersioningError};
use litkernel_store::read_json_file;
use serde_json::{json, Value};

fn write(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn curated_record(version: Option<&str>) -> Value {
    let mut metadata = json!({ "title": "To Kill a Mockingbird", "author": "Harper Lee" });
    if let Some(v) = version {
        metadata["kernel_version"] = json!(v);
    }
    json!({
        "schema_version": 3,
        "metadata": metadata,
        "devices": [{ "name": "Irony", "definition": "curated by hand" }]
    })
}

fn regenerated_record() -> Value {
    json!({
        "schema_version": 3,
        "metadata": { "title": "To Kill a Mockingbird (regenerated)", "edition": "1960", "record_version": "3.0" },
        "devices": [{ "name": "Irony", "definition": "generated" }],
        "consistency_report": { "relocated": [] }
    })
}

// ---------------------------------------------------------------------------
// patch_file
// ---------------------------------------------------------------------------

#[test]
fn patch_bumps_version_from_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("Mockingbird_kernel.json");
    let new = dir.path().join("regenerated.json");
    write(&old, &curated_record(Some("3.4")));
    write(&new, &regenerated_record());

    let outcome = patch_file(&old, &new, &PatchOptions::default()).unwrap();

    assert_eq!(outcome.from_version, RecordVersion::new(3, 4));
    assert_eq!(outcome.to_version, RecordVersion::new(3, 5));
    assert_eq!(outcome.from_schema, 3);
    assert_eq!(outcome.output, dir.path().join("Mockingbird_kernel_v3_5.json"));

    let patched = read_json_file(&outcome.output).unwrap();
    assert_eq!(patched["metadata"]["title"], "To Kill a Mockingbird");
    assert_eq!(patched["metadata"]["edition"], "1960");
    assert_eq!(patched["metadata"]["record_version"], "3.5");
    assert!(patched["metadata"].get("kernel_version").is_none());
    assert_eq!(patched["metadata"]["patch_method"], PATCH_METHOD);
    let patched_at = patched["metadata"]["patched_at"].as_str().unwrap();
    assert!(DateTime::parse_from_rfc3339(patched_at).is_ok());
    assert_eq!(patched["devices"][0]["definition"], "curated by hand");
    assert!(patched.get("consistency_report").is_some());
}

#[test]
fn patch_reads_version_from_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("Mockingbird_kernel_v3_4.json");
    let new = dir.path().join("regenerated.json");
    write(&old, &curated_record(None));
    write(&new, &regenerated_record());

    let outcome = patch_file(&old, &new, &PatchOptions::default()).unwrap();

    assert_eq!(outcome.from_version, RecordVersion::new(3, 4));
    assert_eq!(outcome.output, dir.path().join("Mockingbird_kernel_v3_5.json"));
    // The versioned backup name is the old file itself, so it gets a timestamp.
    let backup = outcome.backup.unwrap();
    assert_ne!(backup, old);
    let name = backup.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Mockingbird_kernel_v3_4_"), "{name}");
    assert_eq!(fs::read(&backup).unwrap(), fs::read(&old).unwrap());
}

#[test]
fn explicit_version_overrides_bump() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("Mockingbird_kernel.json");
    let new = dir.path().join("regenerated.json");
    write(&old, &curated_record(Some("3.4")));
    write(&new, &regenerated_record());

    let options = PatchOptions {
        version: Some("4.0".parse().unwrap()),
        ..PatchOptions::default()
    };
    let outcome = patch_file(&old, &new, &options).unwrap();

    assert_eq!(outcome.to_version, RecordVersion::new(4, 0));
    assert_eq!(outcome.output, dir.path().join("Mockingbird_kernel_v4_0.json"));
    assert_eq!(read_json_file(&outcome.output).unwrap()["metadata"]["record_version"], "4.0");
}

#[test]
fn backup_preserves_old_record() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("Mockingbird_kernel.json");
    let new = dir.path().join("regenerated.json");
    write(&old, &curated_record(Some("3.4")));
    write(&new, &regenerated_record());

    let outcome = patch_file(&old, &new, &PatchOptions::default()).unwrap();

    let backup = outcome.backup.unwrap();
    assert_eq!(backup, dir.path().join("Mockingbird_kernel_v3_4.json"));
    assert_eq!(read_json_file(&backup).unwrap(), curated_record(Some("3.4")));
    assert_eq!(read_json_file(&old).unwrap(), curated_record(Some("3.4")));
}

#[test]
fn no_backup_and_explicit_output() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("Mockingbird_kernel.json");
    let new = dir.path().join("regenerated.json");
    let out = dir.path().join("out").join("patched.json");
    write(&old, &curated_record(None));
    write(&new, &regenerated_record());

    let options = PatchOptions {
        backup: false,
        output: Some(out.clone()),
        ..PatchOptions::default()
    };
    let outcome = patch_file(&old, &new, &options).unwrap();

    assert_eq!(outcome.output, out);
    assert!(outcome.backup.is_none());
    assert_eq!(outcome.from_version, RecordVersion::INITIAL);
    assert_eq!(outcome.to_version, RecordVersion::new(3, 1));
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(!names.iter().any(|n| n.contains("_v3_0")), "{names:?}");
}

#[test]
fn missing_old_record_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let new = dir.path().join("regenerated.json");
    write(&new, &regenerated_record());

    let err = patch_file(&dir.path().join("absent.json"), &new, &PatchOptions::default()).unwrap_err();
    assert!(matches!(err, VersioningError::SourceMissing(_)));
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

#[test]
fn archive_names_and_indexes_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("Mockingbird_kernel_v3_4.json");
    write(&source, &curated_record(Some("3.4")));
    let archive = Archive::open(dir.path().join("archive")).unwrap();

    let request = ArchiveRequest::new(RecordVersion::new(3, 4), "Replaced by v3.5")
        .with_description("taxonomy fix")
        .replaced_by("Mockingbird_kernel_v3_5.json");
    let entry = archive.archive(&source, &request).unwrap();

    assert_eq!(entry.archived_name, "Mockingbird_kernel_v3_4_taxonomy_fix.json");
    assert_eq!(entry.original_name, "Mockingbird_kernel_v3_4.json");
    assert_eq!(entry.version, "3.4");
    assert_eq!(entry.file_size, fs::metadata(&source).unwrap().len());
    assert!(archive.dir().join(&entry.archived_name).exists());
    assert!(source.exists());

    let index: Value = read_json_file(&archive.dir().join(INDEX_FILE)).unwrap();
    assert_eq!(index["archive_version"], "1.0");
    assert_eq!(index["files"]["Mockingbird_kernel"][0]["reason"], "Replaced by v3.5");
    assert_eq!(
        index["files"]["Mockingbird_kernel"][0]["replaced_by"],
        "Mockingbird_kernel_v3_5.json"
    );
}

#[test]
fn duplicate_archive_names_get_a_counter() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("notes.txt");
    fs::write(&source, "first").unwrap();
    let archive = Archive::open(dir.path().join("archive")).unwrap();
    let request = ArchiveRequest::new(RecordVersion::new(1, 0), "Superseded");

    let first = archive.archive(&source, &request).unwrap();
    fs::write(&source, "second").unwrap();
    let second = archive.archive(&source, &request).unwrap();
    let third = archive.archive(&source, &request).unwrap();

    assert_eq!(first.archived_name, "notes_v1_0_superseded.txt");
    assert_eq!(second.archived_name, "notes_v1_0_superseded_1.txt");
    assert_eq!(third.archived_name, "notes_v1_0_superseded_2.txt");
    assert_eq!(fs::read_to_string(archive.dir().join(&first.archived_name)).unwrap(), "first");
    assert_eq!(fs::read_to_string(archive.dir().join(&second.archived_name)).unwrap(), "second");
}

#[test]
fn versions_are_listed_newest_first_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let archive_dir = dir.path().join("archive");
    let v1 = dir.path().join("Giver_record_v3_1.json");
    let v2 = dir.path().join("Giver_record_v3_2.json");
    fs::write(&v1, "{}").unwrap();
    fs::write(&v2, "{}").unwrap();

    let archive = Archive::open(&archive_dir).unwrap();
    archive
        .archive(&v1, &ArchiveRequest::new(RecordVersion::new(3, 1), "old"))
        .unwrap();
    archive
        .archive(&v2, &ArchiveRequest::new(RecordVersion::new(3, 2), "newer"))
        .unwrap();

    let reopened = Archive::open(&archive_dir).unwrap();
    let versions = reopened.versions(&base_name(&v1)).unwrap();
    let labels: Vec<_> = versions.iter().map(|e| e.version.as_str()).collect();
    assert_eq!(labels, vec!["3.2", "3.1"]);
    assert_eq!(reopened.index().unwrap().total_versions(), 2);
    assert!(reopened.versions("Unknown").unwrap().is_empty());
}

#[test]
fn archiving_a_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let archive = Archive::open(dir.path().join("archive")).unwrap();
    let err = archive
        .archive(
            &dir.path().join("absent.json"),
            &ArchiveRequest::new(RecordVersion::new(1, 0), "gone"),
        )
        .unwrap_err();
    assert!(matches!(err, VersioningError::SourceMissing(_)));
    assert_eq!(archive.index().unwrap().total_versions(), 0);
}

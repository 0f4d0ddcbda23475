//! Trait contract tests for CheckpointStore.
//!
//! Every check runs against both the in-memory fake and the filesystem
//! store. Any conforming implementation must pass these.

use litkernel_store::fakes::MemoryCheckpointStore;
use litkernel_store::{CheckpointKey, CheckpointStore, FsCheckpointStore};
use serde_json::json;

fn with_each_store(check: impl Fn(&dyn CheckpointStore)) {
    let mem = MemoryCheckpointStore::new();
    check(&mem);

    let dir = tempfile::tempdir().unwrap();
    let fs_store = FsCheckpointStore::new(dir.path()).unwrap();
    check(&fs_store);
}

// ===========================================================================
// CheckpointStore contract tests
// ===========================================================================

#[test]
fn load_missing_returns_none() {
    with_each_store(|store| {
        let key = CheckpointKey::new("The Giver", "stage0");
        assert!(store.load(&key).unwrap().is_none());
        assert!(!store.exists(&key).unwrap());
    });
}

#[test]
fn load_after_save_returns_payload() {
    with_each_store(|store| {
        let key = CheckpointKey::new("The Giver", "stage1");
        let payload = json!({
            "exposition": { "passage": "Jonas was frightened.", "word_count": 3 }
        });
        store.save(&key, &payload).unwrap();

        assert_eq!(store.load(&key).unwrap(), Some(payload));
        assert!(store.exists(&key).unwrap());
    });
}

#[test]
fn save_replaces_previous_payload() {
    with_each_store(|store| {
        let key = CheckpointKey::new("The Giver", "stage2a");
        store.save(&key, &json!({ "pov": "FP" })).unwrap();
        store.save(&key, &json!({ "pov": "TPL" })).unwrap();

        assert_eq!(store.load(&key).unwrap(), Some(json!({ "pov": "TPL" })));
    });
}

#[test]
fn delete_reports_whether_checkpoint_existed() {
    with_each_store(|store| {
        let key = CheckpointKey::new("The Giver", "stage2b");
        assert!(!store.delete(&key).unwrap());

        store.save(&key, &json!([])).unwrap();
        assert!(store.delete(&key).unwrap());
        assert!(store.load(&key).unwrap().is_none());
    });
}

#[test]
fn keys_are_isolated_by_document_and_stage() {
    with_each_store(|store| {
        let a = CheckpointKey::new("The Giver", "stage0");
        let b = CheckpointKey::new("The Giver", "stage1");
        let c = CheckpointKey::new("Animal Farm", "stage0");
        store.save(&a, &json!("a")).unwrap();
        store.save(&b, &json!("b")).unwrap();
        store.save(&c, &json!("c")).unwrap();

        assert_eq!(store.load(&a).unwrap(), Some(json!("a")));
        assert_eq!(store.load(&b).unwrap(), Some(json!("b")));
        assert_eq!(store.load(&c).unwrap(), Some(json!("c")));

        store.delete(&a).unwrap();
        assert!(store.exists(&b).unwrap());
        assert!(store.exists(&c).unwrap());
    });
}

// ===========================================================================
// Fake bookkeeping
// ===========================================================================

#[test]
fn memory_store_records_save_order() {
    let store = MemoryCheckpointStore::new();
    store
        .save(&CheckpointKey::new("The Giver", "stage0"), &json!({}))
        .unwrap();
    store
        .save(&CheckpointKey::new("The Giver", "stage1"), &json!({}))
        .unwrap();

    let stages: Vec<String> = store.saved_keys().into_iter().map(|k| k.stage).collect();
    assert_eq!(stages, vec!["stage0", "stage1"]);
    assert_eq!(store.stages_present("The_Giver"), vec!["stage0", "stage1"]);
}

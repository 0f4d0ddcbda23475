//! In-memory fakes for the store trait (testing only)
//!
//! `MemoryCheckpointStore` satisfies the `CheckpointStore` contract without
//! touching the filesystem and counts writes so tests can assert which stages
//! were regenerated.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::error::StoreResult;

/// In-memory checkpoint store backed by a `HashMap<key, payload>`.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<CheckpointKey, Value>>,
    saves: Mutex<Vec<CheckpointKey>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys saved so far, in write order (repeats included).
    pub fn saved_keys(&self) -> Vec<CheckpointKey> {
        self.saves.lock().unwrap().clone()
    }

    /// Stage ids currently present for `document`, sorted.
    pub fn stages_present(&self, document: &str) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        let mut stages: Vec<String> = entries
            .keys()
            .filter(|k| k.document == document)
            .map(|k| k.stage.clone())
            .collect();
        stages.sort();
        stages
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, key: &CheckpointKey) -> StoreResult<Option<Value>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &CheckpointKey, payload: &Value) -> StoreResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.clone(), payload.clone());
        self.saves.lock().unwrap().push(key.clone());
        Ok(())
    }

    fn delete(&self, key: &CheckpointKey) -> StoreResult<bool> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    fn exists(&self, key: &CheckpointKey) -> StoreResult<bool> {
        Ok(self.entries.lock().unwrap().contains_key(key))
    }
}

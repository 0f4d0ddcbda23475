//! In-memory fakes for the service trait (testing only)
//!
//! `ScriptedService` replays canned responses keyed by request-label prefix
//! and records every request it receives, so tests can assert exactly which
//! stages called the service.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::service::{GenerativeService, ServiceError, ServiceRequest, ServiceResponse};

/// Replays scripted responses.
///
/// A request labelled `stage1:climax` is answered from the queue registered
/// for the longest matching prefix (`stage1:climax`, else `stage1`).
#[derive(Debug, Default)]
pub struct ScriptedService {
    scripts: Mutex<HashMap<String, VecDeque<String>>>,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for requests whose label starts with `label`.
    pub fn respond(self, label: &str, response: impl Into<String>) -> Self {
        self.push(label, response);
        self
    }

    pub fn push(&self, label: &str, response: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(label.to_string())
            .or_default()
            .push_back(response.into());
    }

    /// All requests received, in order.
    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose label starts with `prefix`.
    pub fn calls_for(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.label.starts_with(prefix))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeService for ScriptedService {
    async fn generate(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut scripts = self.scripts.lock().unwrap();
        let key = scripts
            .keys()
            .filter(|k| request.label.starts_with(k.as_str()))
            .max_by_key(|k| k.len())
            .cloned();
        key.and_then(|k| scripts.get_mut(&k).and_then(VecDeque::pop_front))
            .map(ServiceResponse::text)
            .ok_or_else(|| ServiceError::Exhausted(request.label.clone()))
    }
}

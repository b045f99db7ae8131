use std::collections::{HashMap, VecDeque};

use bruno_trace_plugin_sdk::ResponseDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::registry::RegisteredPlugin;

/// One captured request/response cycle, in the shape the trace view renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub request_id: String,
    pub plugin_id: String,
    pub plugin_name: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: Map<String, Value>,
    pub body: Value,
    pub transform_error: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl TraceRecord {
    pub fn capture(request_id: &str, plugin: &RegisteredPlugin, response: &ResponseDescriptor) -> Self {
        Self {
            request_id: request_id.to_string(),
            plugin_id: plugin.id().to_string(),
            plugin_name: plugin.name().to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.data.clone(),
            transform_error: response.transform_error.clone(),
            captured_at: Utc::now(),
        }
    }
}

/// Captured trace records keyed by request id.
#[derive(Debug)]
pub struct TraceStore {
    history_limit: usize,
    records: HashMap<String, VecDeque<TraceRecord>>,
}

impl TraceStore {
    /// `history_limit` is clamped to at least one record per request.
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            records: HashMap::new(),
        }
    }

    pub fn record(&mut self, record: TraceRecord) {
        let history = self.records.entry(record.request_id.clone()).or_default();
        history.push_back(record);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Most recently captured record for `request_id`.
    pub fn latest(&self, request_id: &str) -> Option<&TraceRecord> {
        self.records.get(request_id).and_then(|h| h.back())
    }

    /// Records for `request_id`, oldest first.
    pub fn history(&self, request_id: &str) -> impl Iterator<Item = &TraceRecord> {
        self.records.get(request_id).into_iter().flatten()
    }

    pub fn clear(&mut self, request_id: &str) -> bool {
        self.records.remove(request_id).is_some()
    }

    pub fn request_ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_LIMIT)
    }
}

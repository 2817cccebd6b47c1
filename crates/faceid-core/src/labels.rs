//! Label store and enrollment label generation.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Ordered labels; position `i` names vector `i` of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelStore {
    labels: Vec<String>,
}

impl LabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.labels.get(position).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn push(&mut self, label: String) -> usize {
        self.labels.push(label);
        self.labels.len() - 1
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.labels.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

/// Produces `face_<counter>_<YYYYmmdd_HHMMSS>` labels.
///
/// The counter resumes from the persisted label count. Labels are never
/// deleted, so that count is a high-water mark and numbering keeps climbing
/// across restarts.
#[derive(Debug, Clone)]
pub struct LabelGenerator {
    counter: u64,
}

impl LabelGenerator {
    pub fn resume_from(store: &LabelStore) -> Self {
        Self { counter: store.len() as u64 }
    }

    /// Next label not already present in `store`.
    pub fn next_label(&mut self, store: &LabelStore) -> String {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.next_with_timestamp(store, &timestamp)
    }

    fn next_with_timestamp(&mut self, store: &LabelStore, timestamp: &str) -> String {
        loop {
            self.counter += 1;
            let label = format!("face_{}_{}", self.counter, timestamp);
            if !store.contains(&label) {
                return label;
            }
            tracing::debug!(label = %label, "generated label already enrolled, skipping");
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

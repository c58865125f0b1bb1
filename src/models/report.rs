use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Failure recorded against a single qualifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierFailure {
    pub code: String,
    pub message: String,
}

/// One qualifier's line in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierEntry {
    pub name: String,
    #[serde(default)]
    pub telemetry: serde_json::Value,
    #[serde(default)]
    pub error: Option<QualifierFailure>,
}

impl QualifierEntry {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Hard-qualifier report persisted on a match result
///
/// Entries are keyed by qualifier name so new qualifiers append to the
/// document without touching historical rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualifierReport {
    #[serde(default)]
    pub config_version: Option<i32>,
    #[serde(default)]
    pub qualifiers: BTreeMap<String, QualifierEntry>,
}

impl QualifierReport {
    pub fn new(config_version: i32) -> Self {
        Self {
            config_version: Some(config_version),
            qualifiers: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entry: QualifierEntry) {
        self.qualifiers.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&QualifierEntry> {
        self.qualifiers.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.qualifiers.is_empty()
    }

    /// AND over every recorded qualifier; an empty report never passes
    pub fn passed(&self) -> bool {
        !self.qualifiers.is_empty() && self.qualifiers.values().all(QualifierEntry::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &QualifierFailure> {
        self.qualifiers.values().filter_map(|e| e.error.as_ref())
    }
}

/// Score returned by the external compatibility classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub score: f64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Compatibility outcome persisted on a match result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub result: CompatibilityResult,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub meets_threshold: Option<bool>,
    pub scored_at: DateTime<Utc>,
}

impl CompatibilityReport {
    pub fn new(result: CompatibilityResult, threshold: Option<f64>, scored_at: DateTime<Utc>) -> Self {
        let meets_threshold = threshold.map(|t| result.score >= t);
        Self {
            result,
            threshold,
            meets_threshold,
            scored_at,
        }
    }
}

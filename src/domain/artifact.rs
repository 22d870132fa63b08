//! Artifacts produced by a job run.
//!
//! The manifest records every stored file belonging to a job, in the order
//! the pipeline produced them.

use serde::{Deserialize, Serialize};

/// Manifest entries that a rerun regenerates
pub const DERIVED_ARTIFACTS: &[&str] = &[
    "metrics",
    "events",
    "events_csv",
    "summary_csv",
    "report_html",
    "manifest",
];

/// A single stored artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactItem {
    /// Stable name used for lookups (e.g. `tracks`, `events_csv`)
    pub name: String,

    pub kind: ArtifactKind,

    /// Storage path
    pub path: String,

    pub content_type: String,

    /// Size in bytes
    pub size_bytes: u64,
}

impl ArtifactItem {
    pub fn new(
        name: impl Into<String>,
        kind: ArtifactKind,
        path: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            content_type: content_type.into(),
            size_bytes,
        }
    }
}

/// Kinds of artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Intermediate or analytics JSON
    Artifact,

    /// Human-facing export (CSV, HTML)
    Export,

    /// The uploaded media
    Input,
}

/// Ordered list of a job's artifacts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub items: Vec<ArtifactItem>,
}

impl ArtifactManifest {
    pub fn push(&mut self, item: ArtifactItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = ArtifactItem>) {
        self.items.extend(items);
    }

    /// Find an item by name
    pub fn get(&self, name: &str) -> Option<&ArtifactItem> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Drop every analytics-derived item, keeping input and track artifacts
    pub fn retain_primary(&mut self) {
        self.items
            .retain(|item| !DERIVED_ARTIFACTS.contains(&item.name.as_str()));
    }

    /// Remove items with the given name
    pub fn remove(&mut self, name: &str) {
        self.items.retain(|item| item.name != name);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

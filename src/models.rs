//! Core data models used throughout the timeline engine.
//!
//! Every entity here is a value object: produced once by the component
//! that owns it (scanner, extractor, grouper, correlator) and handed by
//! value to the [`EventStore`](crate::store::EventStore). Nothing is
//! mutated after creation except by full replacement in the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single file in a scanned hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    /// Path relative to the scan root.
    pub path: String,
    pub size: u64,
    /// Short content fingerprint, or [`UNKNOWN_FINGERPRINT`](crate::fingerprint::UNKNOWN_FINGERPRINT)
    /// when the file could not be read.
    pub file_hash: String,
    /// Guessed from the extension; `application/octet-stream` when unknown.
    pub mime_type: String,
    pub created: f64,
    pub modified: f64,
    pub depth: usize,
}

/// A directory in a scanned hierarchy with sizes aggregated bottom-up.
///
/// `size` and `file_count` always cover the full descendant subtree.
/// `children` holds files first, then folders, each group sorted by
/// lowercase name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    /// Path relative to the scan root; empty for the root itself.
    pub path: String,
    pub size: u64,
    pub file_count: u64,
    pub created: f64,
    pub modified: f64,
    pub depth: usize,
    pub children: Vec<TreeNode>,
}

/// A child entry of a [`FolderNode`], tagged `file` or `folder`.
///
/// Serializes as `{"type": "file", "data": {...}}`, the shape the
/// visualizer walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum TreeNode {
    File(FileNode),
    Folder(FolderNode),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::File(f) => &f.name,
            TreeNode::Folder(f) => &f.name,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, TreeNode::File(_))
    }
}

/// Milestone category. Declaration order is the order in which the
/// general pattern sets are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deadline,
    Requirement,
    Deliverable,
    Meeting,
    Decision,
    Issue,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Deadline => "deadline",
            Category::Requirement => "requirement",
            Category::Deliverable => "deliverable",
            Category::Meeting => "meeting",
            Category::Decision => "decision",
            Category::Issue => "issue",
        }
    }

    /// Symbol prefixed to generated milestone titles.
    pub fn symbol(&self) -> &'static str {
        match self {
            Category::Deadline => "⏰",
            Category::Requirement => "📋",
            Category::Deliverable => "📦",
            Category::Meeting => "🤝",
            Category::Decision => "✅",
            Category::Issue => "⚠️",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Where a milestone was mined from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Email,
    Document,
    Manual,
}

impl Origin {
    /// Prefix used when deriving milestone identifiers.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Origin::Email => "email",
            Origin::Document => "doc",
            Origin::Manual => "manual",
        }
    }
}

/// Lifecycle status. Extraction always yields `Pending`; transitions
/// belong to whoever reviews the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// A classified statement extracted from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub timestamp: f64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub participants: Vec<String>,
    #[serde(rename = "source")]
    pub origin: Origin,
    #[serde(rename = "source_id")]
    pub origin_id: String,
    pub status: Status,
    /// Deduplicated and sorted file references found in the source text.
    pub related_files: Vec<String>,
    pub confidence: f64,
}

/// Kind tag of a [`TimelineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileScan,
    Milestone,
    Recommendation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FileScan => "file_scan",
            EventKind::Milestone => "milestone",
            EventKind::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file_scan" => Ok(EventKind::FileScan),
            "milestone" => Ok(EventKind::Milestone),
            "recommendation" => Ok(EventKind::Recommendation),
            other => anyhow::bail!("unknown event type: '{}'", other),
        }
    }
}

/// The unifying envelope for everything placed on the timeline.
///
/// `metadata` is kind-specific: the scan summary plus serialized
/// [`FolderNode`] for `file_scan`, the serialized [`Milestone`] for
/// `milestone`, and `{phrase, context, source_id}` for `recommendation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: String,
    pub timestamp: f64,
    pub event_type: EventKind,
    pub metadata: serde_json::Value,
}

impl TimelineEvent {
    /// Wrap a milestone in its timeline envelope.
    pub fn from_milestone(milestone: &Milestone) -> anyhow::Result<Self> {
        Ok(Self {
            event_id: format!("milestone_{}", milestone.id),
            timestamp: milestone.timestamp,
            event_type: EventKind::Milestone,
            metadata: serde_json::to_value(milestone)?,
        })
    }
}

/// A cluster of messages sharing a normalized subject and participant set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationThread {
    pub thread_id: String,
    pub subject: String,
    pub participants: Vec<String>,
    pub start_date: f64,
    pub end_date: f64,
    pub message_count: u64,
    pub key_topics: Vec<String>,
}

/// Correlation type emitted by the temporal/file-name heuristic.
pub const TEMPORAL_FILE_MENTION: &str = "temporal_file_mention";

/// A scored, directional link from a `file_scan` event to a `milestone` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub file_event_id: String,
    pub milestone_event_id: String,
    #[serde(rename = "correlation_strength")]
    pub strength: f64,
    pub correlation_type: String,
}

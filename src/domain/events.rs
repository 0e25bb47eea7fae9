//! Status event types for batch progress notifications
//!
//! Inbound push-channel frames are validated into these closed types at the
//! ingress boundary; nothing past the ingress sees raw strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Backend-assigned identifier of one work item (a court decision id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WorkItemId(pub String);

impl WorkItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WorkItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Processing status reported for a single work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Progress,
    Done,
    AlreadyDone,
    Success,
    Error,
}

impl ItemStatus {
    /// Pipeline stage names the ingestion worker publishes between "started" and "done"
    pub const PIPELINE_STAGES: [&'static str; 5] = [
        "started",
        "text_extracted",
        "metadata_extracted",
        "chunks_created",
        "documents_saved",
    ];

    /// Map a wire status string onto the closed status set.
    ///
    /// Intermediate pipeline stages collapse into `Progress`; anything else
    /// unknown yields `None` so the caller can reject the frame.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Some(Self::Pending),
            "progress" => Some(Self::Progress),
            "done" => Some(Self::Done),
            "already_done" => Some(Self::AlreadyDone),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            stage if Self::PIPELINE_STAGES.contains(&stage) => Some(Self::Progress),
            _ => None,
        }
    }

    /// Terminal success: the item will not change state again and counts as completed
    #[must_use]
    pub const fn is_terminal_success(self) -> bool {
        matches!(self, Self::Done | Self::AlreadyDone | Self::Success)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Progress => "progress",
            Self::Done => "done",
            Self::AlreadyDone => "already_done",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame category carried in the `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Status,
    System,
    Error,
    Other,
}

impl EventKind {
    /// Missing and unknown tags are both `Other`
    #[must_use]
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("progress") => Self::Progress,
            Some("status") => Self::Status,
            Some("system") => Self::System,
            Some("error") => Self::Error,
            _ => Self::Other,
        }
    }
}

/// One validated progress notification (or a locally generated notice)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusEvent {
    pub kind: EventKind,
    pub item_id: Option<WorkItemId>,
    pub status: Option<ItemStatus>,
    pub detail: String,
    pub received_at: DateTime<Utc>,
}

impl StatusEvent {
    /// Event about a specific work item
    pub fn for_item(
        kind: EventKind,
        item_id: impl Into<WorkItemId>,
        status: ItemStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            item_id: Some(item_id.into()),
            status: Some(status),
            detail: detail.into(),
            received_at: Utc::now(),
        }
    }

    /// Connection-level notice with no item attached
    pub fn notice(kind: EventKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            item_id: None,
            status: None,
            detail: detail.into(),
            received_at: Utc::now(),
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.item_id, self.status) {
            (Some(id), Some(status)) => write!(f, "[ID: {id}] → {status}: {}", self.detail),
            (Some(id), None) => write!(f, "[ID: {id}] → {}", self.detail),
            (None, Some(status)) => write!(f, "[{status}] {}", self.detail),
            (None, None) => write!(f, "[{:?}] {}", self.kind, self.detail),
        }
    }
}

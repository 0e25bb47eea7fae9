//! Batch completion tracker
//!
//! Reconciles an unordered, duplicated stream of status events against the
//! item set of one submitted batch. The completion set only ever grows, so the
//! derived ratio is monotonic for the lifetime of a batch.

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use super::events::{ItemStatus, StatusEvent, WorkItemId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Invalid batch: no item id list was provided")]
    InvalidBatch,
}

/// What `record_event` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Item newly entered the completion set
    Completed,
    /// Terminal event for an item that was already complete
    Duplicate,
    /// Item reported an error and is not complete
    Failed,
    /// Untracked item, non-terminal status, or no item at all
    Ignored,
}

/// Counters kept for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub events_seen: u64,
    pub ignored_untracked: u64,
    pub ignored_non_terminal: u64,
    pub duplicates: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct BatchTracker {
    items: HashSet<WorkItemId>,
    completed: HashSet<WorkItemId>,
    failed: HashSet<WorkItemId>,
    stats: TrackerStats,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked batch and clear all completion state.
    ///
    /// `None` stands for a submission response without an id list.
    pub fn initialize<I>(&mut self, item_ids: Option<I>) -> Result<(), TrackerError>
    where
        I: IntoIterator,
        I::Item: Into<WorkItemId>,
    {
        let item_ids = item_ids.ok_or(TrackerError::InvalidBatch)?;
        self.items = item_ids.into_iter().map(Into::into).collect();
        self.completed.clear();
        self.failed.clear();
        self.stats = TrackerStats::default();
        info!(items = self.items.len(), "Tracking new batch");
        Ok(())
    }

    pub fn record_event(&mut self, event: &StatusEvent) -> RecordOutcome {
        self.stats.events_seen += 1;

        let Some(item_id) = event.item_id.as_ref() else {
            self.stats.ignored_non_terminal += 1;
            return RecordOutcome::Ignored;
        };
        if !self.items.contains(item_id) {
            self.stats.ignored_untracked += 1;
            return RecordOutcome::Ignored;
        }

        match event.status {
            Some(status) if status.is_terminal_success() => {
                if self.completed.insert(item_id.clone()) {
                    self.failed.remove(item_id);
                    debug!(%item_id, %status, completed = self.completed.len(), total = self.items.len(), "Item completed");
                    RecordOutcome::Completed
                } else {
                    self.stats.duplicates += 1;
                    RecordOutcome::Duplicate
                }
            }
            Some(ItemStatus::Error) if !self.completed.contains(item_id) => {
                self.stats.failures += 1;
                self.failed.insert(item_id.clone());
                debug!(%item_id, detail = %event.detail, "Item reported an error");
                RecordOutcome::Failed
            }
            _ => {
                self.stats.ignored_non_terminal += 1;
                RecordOutcome::Ignored
            }
        }
    }

    /// Fraction of tracked items completed; 0.0 for an empty batch
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.completed.len() as f64 / self.items.len() as f64
    }

    /// No tracked item is outstanding. Vacuously true for an empty batch.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.items.len()
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_tracked(&self, item_id: &WorkItemId) -> bool {
        self.items.contains(item_id)
    }

    #[must_use]
    pub fn is_completed(&self, item_id: &WorkItemId) -> bool {
        self.completed.contains(item_id)
    }

    #[must_use]
    pub const fn stats(&self) -> TrackerStats {
        self.stats
    }
}

//! Display types handed to the host view
//! Generated as TypeScript bindings through ts-rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::application::ingress::Transcript;
use crate::application::lifecycle::ConnectionState;
use crate::domain::events::StatusEvent;
use crate::domain::tracker::BatchTracker;

/// Progress of one tracked batch as the view renders it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProgressSnapshot {
    /// Session identifier
    pub session_id: String,
    /// 0-100
    pub percent_complete: f64,
    pub completed_count: u32,
    pub failed_count: u32,
    pub total_count: u32,
    pub connection: ConnectionState,
    /// Most recent transcript entries, oldest first
    pub transcript: Vec<StatusEvent>,
    /// Entries ever recorded, including those scrolled out of `transcript`
    pub transcript_total: u32,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn capture(
        session_id: &str,
        tracker: &BatchTracker,
        transcript: &Transcript,
        connection: ConnectionState,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            percent_complete: tracker.ratio() * 100.0,
            completed_count: saturate(tracker.completed_count()),
            failed_count: saturate(tracker.failed_count()),
            total_count: saturate(tracker.total_count()),
            connection,
            transcript: transcript.to_vec(),
            transcript_total: u32::try_from(transcript.total_recorded()).unwrap_or(u32::MAX),
            updated_at: Utc::now(),
        }
    }

    /// Rounded label, e.g. "67%"
    #[must_use]
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.percent_complete.round())
    }

    /// "Completed 2 of 3"
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!("Completed {} of {}", self.completed_count, self.total_count);
        if self.failed_count > 0 {
            line.push_str(&format!(", {} failed", self.failed_count));
        }
        line
    }
}

/// Why a tracking session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Every tracked item reached a terminal success state
    Completed,
    /// The server closed the push channel
    ChannelClosed,
    /// The push channel failed
    ChannelErrored,
    /// The host cancelled tracking
    Cancelled,
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

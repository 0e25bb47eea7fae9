//! Event ingress: raw push-channel frames in, validated status events out
//!
//! A bad frame is logged and dropped here; it never terminates the
//! connection and never reaches an observer.

use serde::Deserialize;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::events::{EventKind, ItemStatus, StatusEvent, WorkItemId};
use crate::domain::tracker::BatchTracker;

/// Display limit used by the upload view
pub const DEFAULT_TRANSCRIPT_LIMIT: usize = 15;
pub const MAX_TRANSCRIPT_LIMIT: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    #[error("Malformed event frame: {reason}")]
    MalformedEvent { reason: String },

    #[error("Unrecognized status '{status}' in event frame")]
    UnrecognizedStatus { status: String },
}

/// Receives every event the ingress accepts
pub trait EventObserver {
    fn observe(&mut self, event: &StatusEvent);
}

impl EventObserver for BatchTracker {
    fn observe(&mut self, event: &StatusEvent) {
        let outcome = self.record_event(event);
        debug!(?outcome, kind = ?event.kind, "Tracker observed event");
    }
}

/// Wire shape of one inbound frame, validated by `parse_frame`
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    decision_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Validate one text frame into a [`StatusEvent`]
pub fn parse_frame(raw: &str) -> Result<StatusEvent, IngressError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| IngressError::MalformedEvent {
        reason: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(IngressError::MalformedEvent {
            reason: "frame is not a JSON object".to_string(),
        });
    }
    let frame: InboundFrame = serde_json::from_value(value).map_err(|e| IngressError::MalformedEvent {
        reason: e.to_string(),
    })?;

    let status = match frame.status.as_deref() {
        None => None,
        Some(raw_status) => Some(ItemStatus::from_wire(raw_status).ok_or_else(|| {
            IngressError::UnrecognizedStatus {
                status: raw_status.to_string(),
            }
        })?),
    };

    Ok(StatusEvent {
        kind: EventKind::from_tag(frame.kind.as_deref()),
        item_id: frame
            .decision_id
            .filter(|id| !id.trim().is_empty())
            .map(WorkItemId::from),
        status,
        detail: frame.detail.unwrap_or_default(),
        received_at: chrono::Utc::now(),
    })
}

/// Parses frames and fans accepted events out to observers
#[derive(Debug, Default)]
pub struct EventIngress {
    frames_received: u64,
    frames_discarded: u64,
}

impl EventIngress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one inbound frame. Returns the kind of the dispatched event,
    /// or `None` when the frame was discarded.
    pub fn on_message(&mut self, raw: &str, observers: &mut [&mut dyn EventObserver]) -> Option<EventKind> {
        self.frames_received += 1;
        match parse_frame(raw) {
            Ok(event) => {
                for observer in observers.iter_mut() {
                    observer.observe(&event);
                }
                Some(event.kind)
            }
            Err(e) => {
                self.frames_discarded += 1;
                warn!(error = %e, frame = %truncate(raw, 200), "Discarding inbound frame");
                None
            }
        }
    }

    #[must_use]
    pub const fn frames_received(&self) -> u64 {
        self.frames_received
    }

    #[must_use]
    pub const fn frames_discarded(&self) -> u64 {
        self.frames_discarded
    }
}

fn truncate(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

/// Bounded display log of recent events and notices
///
/// Dropping old entries only affects what is shown; completion state lives
/// in the tracker.
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: VecDeque<StatusEvent>,
    limit: usize,
    total_recorded: u64,
}

impl Transcript {
    /// `limit` is clamped to `1..=MAX_TRANSCRIPT_LIMIT`
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_TRANSCRIPT_LIMIT);
        Self {
            entries: VecDeque::with_capacity(limit.min(DEFAULT_TRANSCRIPT_LIMIT)),
            limit,
            total_recorded: 0,
        }
    }

    pub fn push(&mut self, event: StatusEvent) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
        self.total_recorded += 1;
    }

    /// Append a connection-level notice
    pub fn push_notice(&mut self, kind: EventKind, detail: impl Into<String>) {
        self.push(StatusEvent::notice(kind, detail));
    }

    /// Oldest first
    pub fn entries(&self) -> impl Iterator<Item = &StatusEvent> {
        self.entries.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<StatusEvent> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ever recorded, including those no longer shown
    #[must_use]
    pub const fn total_recorded(&self) -> u64 {
        self.total_recorded
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSCRIPT_LIMIT)
    }
}

impl EventObserver for Transcript {
    fn observe(&mut self, event: &StatusEvent) {
        self.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_frame_without_type() {
        let event = parse_frame(r#"{"decision_id": "123456789", "status": "text_extracted", "detail": "Text extracted"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Other);
        assert_eq!(event.status, Some(ItemStatus::Progress));
        assert_eq!(event.item_id, Some(WorkItemId::from("123456789")));
        assert_eq!(event.detail, "Text extracted");
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(matches!(parse_frame("{not json"), Err(IngressError::MalformedEvent { .. })));
        assert!(matches!(parse_frame("[1, 2]"), Err(IngressError::MalformedEvent { .. })));
        assert!(matches!(parse_frame(r#"{"decision_id": 5}"#), Err(IngressError::MalformedEvent { .. })));
        assert_eq!(
            parse_frame(r#"{"decision_id": "1", "status": "teleported"}"#),
            Err(IngressError::UnrecognizedStatus { status: "teleported".to_string() })
        );
    }

    #[test]
    fn test_system_frame_without_item() {
        let event = parse_frame(r#"{"type": "system", "detail": "worker restarted"}"#).unwrap();
        assert_eq!(event.kind, EventKind::System);
        assert!(event.item_id.is_none());
        assert!(event.status.is_none());
    }

    #[test]
    fn test_on_message_feeds_all_observers() {
        let mut ingress = EventIngress::new();
        let mut tracker = BatchTracker::new();
        tracker.initialize(Some(["A"])).unwrap();
        let mut transcript = Transcript::new(5);

        {
            let mut observers: [&mut dyn EventObserver; 2] = [&mut tracker, &mut transcript];
            assert_eq!(
                ingress.on_message(r#"{"type": "status", "decision_id": "A", "status": "done"}"#, &mut observers),
                Some(EventKind::Status)
            );
            assert_eq!(ingress.on_message("{not json", &mut observers), None);
        }

        assert_eq!(tracker.completed_count(), 1);
        assert_eq!(transcript.len(), 1);
        assert_eq!(ingress.frames_received(), 2);
        assert_eq!(ingress.frames_discarded(), 1);
    }

    #[test]
    fn test_transcript_keeps_most_recent_entries() {
        let mut transcript = Transcript::new(3);
        for i in 0..5 {
            transcript.push_notice(EventKind::System, format!("notice {i}"));
        }
        let details: Vec<_> = transcript.entries().map(|e| e.detail.clone()).collect();
        assert_eq!(details, vec!["notice 2", "notice 3", "notice 4"]);
        assert_eq!(transcript.total_recorded(), 5);
    }

    #[test]
    fn test_transcript_limit_is_clamped() {
        let mut transcript = Transcript::new(usize::MAX / 2);
        transcript.push_notice(EventKind::System, "one");
        assert_eq!(transcript.len(), 1);

        let mut tiny = Transcript::new(0);
        tiny.push_notice(EventKind::System, "first");
        tiny.push_notice(EventKind::System, "second");
        let details: Vec<_> = tiny.entries().map(|e| e.detail.clone()).collect();
        assert_eq!(details, vec!["second"]);
    }
}

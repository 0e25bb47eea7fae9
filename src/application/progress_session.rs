//! Progress session: the tracking view for one submitted batch
//!
//! Runs a single cooperative loop: await one channel signal, apply it to the
//! lifecycle, feed frames through the ingress into the tracker and the
//! transcript, publish a snapshot. Nothing else mutates the tracker, so no
//! locks are involved, and watchers only ever see fully applied updates.
//! The connection is acquired when the loop starts and released on every
//! exit path.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::ingress::{DEFAULT_TRANSCRIPT_LIMIT, EventIngress, EventObserver, Transcript};
use super::lifecycle::{ConnectionLifecycle, ConnectionState, Transition};
use crate::domain::batch::Batch;
use crate::domain::channel::PushTransport;
use crate::domain::tracker::{BatchTracker, TrackerError};
use crate::types::frontend_api::{ProgressSnapshot, SessionEndReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub transcript_limit: usize,
    /// Stop tracking and release the channel once every item completed
    pub close_on_complete: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transcript_limit: DEFAULT_TRANSCRIPT_LIMIT,
            close_on_complete: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub reason: SessionEndReason,
    pub final_state: ConnectionState,
    pub snapshot: ProgressSnapshot,
    /// Whether `close()` had to release a live channel
    pub released_channel: bool,
}

pub struct ProgressSession<T> {
    session_id: String,
    batch: Batch,
    tracker: BatchTracker,
    ingress: EventIngress,
    transcript: Transcript,
    lifecycle: ConnectionLifecycle<T>,
    settings: SessionSettings,
    snapshot_tx: watch::Sender<ProgressSnapshot>,
}

impl<T: PushTransport> ProgressSession<T> {
    pub fn new(batch: Batch, transport: T, settings: SessionSettings) -> Result<Self, TrackerError> {
        let session_id = Uuid::new_v4().to_string();
        let mut tracker = BatchTracker::new();
        tracker.initialize(Some(batch.item_ids().iter().cloned()))?;
        let transcript = Transcript::new(settings.transcript_limit);
        let lifecycle = ConnectionLifecycle::new(transport);
        let initial = ProgressSnapshot::capture(&session_id, &tracker, &transcript, lifecycle.state());
        let (snapshot_tx, _) = watch::channel(initial);

        info!(
            %session_id,
            batch_id = %batch.batch_id(),
            items = batch.len(),
            "Progress session created"
        );

        Ok(Self {
            session_id,
            batch,
            tracker,
            ingress: EventIngress::new(),
            transcript,
            lifecycle,
            settings,
            snapshot_tx,
        })
    }

    /// Snapshot stream for the host view; the current value is available immediately
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshot_tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::capture(&self.session_id, &self.tracker, &self.transcript, self.lifecycle.state())
    }

    /// Track the batch until completion, channel termination or cancellation.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionOutcome {
        let reason = self.drive(&cancel).await;
        let released_channel = self.lifecycle.close().await;
        self.publish();

        let snapshot = self.snapshot();
        let stats = self.tracker.stats();
        info!(
            session_id = %self.session_id,
            ?reason,
            completed = snapshot.completed_count,
            failed = snapshot.failed_count,
            total = snapshot.total_count,
            frames = self.ingress.frames_received(),
            discarded = self.ingress.frames_discarded(),
            duplicates = stats.duplicates,
            untracked = stats.ignored_untracked,
            "Progress session finished"
        );
        if matches!(reason, SessionEndReason::ChannelClosed | SessionEndReason::ChannelErrored)
            && !self.tracker.is_complete()
        {
            warn!(
                session_id = %self.session_id,
                outstanding = snapshot.total_count - snapshot.completed_count,
                "Channel ended before the batch completed; no reconnect is attempted"
            );
        }

        SessionOutcome {
            reason,
            final_state: self.lifecycle.state(),
            snapshot,
            released_channel,
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> SessionEndReason {
        if self.settings.close_on_complete && self.tracker.is_complete() {
            info!(session_id = %self.session_id, "Nothing to track");
            return SessionEndReason::Completed;
        }

        match self.lifecycle.open(self.batch.channel()).await {
            Ok(transition) => {
                if let Some(reason) = self.handle(transition) {
                    self.publish();
                    return reason;
                }
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Could not open push channel");
                return SessionEndReason::ChannelErrored;
            }
        }
        self.publish();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                transition = self.lifecycle.next_transition() => Some(transition),
            };
            let Some(transition) = next else {
                info!(session_id = %self.session_id, "Tracking cancelled");
                return SessionEndReason::Cancelled;
            };

            let ended = self.handle(transition);
            self.publish();
            if let Some(reason) = ended {
                return reason;
            }
            if self.settings.close_on_complete && self.tracker.is_complete() {
                info!(session_id = %self.session_id, "All items completed");
                return SessionEndReason::Completed;
            }
        }
    }

    fn handle(&mut self, transition: Transition) -> Option<SessionEndReason> {
        match transition {
            Transition::Frame(raw) => {
                let mut observers: [&mut dyn EventObserver; 2] = [&mut self.tracker, &mut self.transcript];
                self.ingress.on_message(&raw, &mut observers);
                None
            }
            Transition::Errored(notice) => {
                self.transcript.push(notice);
                Some(SessionEndReason::ChannelErrored)
            }
            Transition::Closed(notice) => {
                self.transcript.push(notice);
                Some(SessionEndReason::ChannelClosed)
            }
            Transition::Opened | Transition::Ignored => None,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

//! Progress session end-to-end over a scripted push channel
use async_trait::async_trait;
use decision_upload_client_lib::application::{ConnectionState, ProgressSession, SessionSettings};
use decision_upload_client_lib::commands::{CommandContext, track_batch};
use decision_upload_client_lib::domain::{Batch, ChannelAddress, ChannelError, ChannelSignal, EventKind, PushTransport};
use decision_upload_client_lib::infrastructure::AppConfig;
use decision_upload_client_lib::types::SessionEndReason;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Default)]
struct Calls {
    open: AtomicUsize,
    close: AtomicUsize,
}

/// Replays a fixed signal script, then stays silent
struct ScriptedTransport {
    script: VecDeque<ChannelSignal>,
    refuse_open: bool,
    calls: Arc<Calls>,
}

impl ScriptedTransport {
    fn new(script: Vec<ChannelSignal>) -> (Self, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let transport = Self {
            script: script.into(),
            refuse_open: false,
            calls: Arc::clone(&calls),
        };
        (transport, calls)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn open(&mut self, _address: &Url) -> Result<(), ChannelError> {
        self.calls.open.fetch_add(1, Ordering::SeqCst);
        if self.refuse_open {
            return Err(ChannelError::Connect {
                address: "localhost".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn next_signal(&mut self) -> ChannelSignal {
        match self.script.pop_front() {
            Some(signal) => signal,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.calls.close.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn frame(id: &str, status: &str) -> ChannelSignal {
    ChannelSignal::Frame(format!(
        r#"{{"decision_id": "{id}", "status": "{status}", "detail": "{status} {id}"}}"#
    ))
}

fn batch(ids: &[&str]) -> Batch {
    let address = ChannelAddress::derive("ws://localhost:8000", "ws/progress/", Some("token"), None).unwrap();
    Batch::new(ids.iter().copied(), address)
}

#[tokio::test]
async fn channel_error_freezes_progress() {
    let (transport, calls) = ScriptedTransport::new(vec![
        ChannelSignal::Opened,
        frame("A", "done"),
        frame("B", "text_extracted"),
        ChannelSignal::Error("connection reset".to_string()),
        frame("C", "done"),
    ]);
    let session = ProgressSession::new(batch(&["A", "B", "C"]), transport, SessionSettings::default()).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::ChannelErrored);
    assert_eq!(outcome.final_state, ConnectionState::Errored);
    assert_eq!(outcome.snapshot.completed_count, 1);
    assert_eq!(outcome.snapshot.total_count, 3);
    assert_eq!(outcome.snapshot.percent_label(), "33%");

    let errors: Vec<_> = outcome.snapshot.transcript.iter().filter(|e| e.kind == EventKind::Error).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].detail.contains("connection reset"));

    assert!(!outcome.released_channel);
    assert_eq!(calls.close.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (transport, _calls) = ScriptedTransport::new(vec![
        ChannelSignal::Opened,
        ChannelSignal::Frame("{not json".to_string()),
        frame("A", "done"),
        ChannelSignal::Closed {
            code: Some(1000),
            reason: "bye".to_string(),
        },
    ]);
    let session = ProgressSession::new(batch(&["A", "B"]), transport, SessionSettings::default()).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::ChannelClosed);
    assert_eq!(outcome.final_state, ConnectionState::Closed);
    assert_eq!(outcome.snapshot.completed_count, 1);

    let details: Vec<_> = outcome.snapshot.transcript.iter().map(|e| e.detail.as_str()).collect();
    assert_eq!(details, ["done A", "Connection closed (code 1000): bye"]);
    assert_eq!(outcome.snapshot.transcript[1].kind, EventKind::System);
}

#[tokio::test]
async fn completion_releases_channel() {
    let (transport, calls) = ScriptedTransport::new(vec![
        ChannelSignal::Opened,
        frame("A", "started"),
        frame("A", "done"),
        frame("B", "already_done"),
    ]);
    let session = ProgressSession::new(batch(&["A", "B"]), transport, SessionSettings::default()).unwrap();
    let rx = session.subscribe();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::Completed);
    assert!(outcome.released_channel);
    assert_eq!(outcome.final_state, ConnectionState::Closed);
    assert_eq!(calls.close.load(Ordering::SeqCst), 1);
    assert!((outcome.snapshot.percent_complete - 100.0).abs() < f64::EPSILON);

    let last = rx.borrow();
    assert_eq!(last.completed_count, 2);
    assert_eq!(last.connection, ConnectionState::Closed);
}

#[tokio::test]
async fn keeps_listening_after_completion_when_configured() {
    let (transport, _calls) = ScriptedTransport::new(vec![
        ChannelSignal::Opened,
        frame("A", "done"),
        frame("A", "done"),
        ChannelSignal::Closed {
            code: None,
            reason: String::new(),
        },
    ]);
    let settings = SessionSettings {
        close_on_complete: false,
        ..SessionSettings::default()
    };
    let session = ProgressSession::new(batch(&["A"]), transport, settings).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::ChannelClosed);
    assert_eq!(outcome.snapshot.completed_count, 1);
    // both duplicate frames are still shown
    assert_eq!(outcome.snapshot.transcript_total, 3);
}

#[tokio::test]
async fn cancellation_closes_transport_and_keeps_progress() {
    let (transport, calls) = ScriptedTransport::new(vec![ChannelSignal::Opened, frame("A", "done")]);
    let session = ProgressSession::new(batch(&["A", "B"]), transport, SessionSettings::default()).unwrap();
    let mut rx = session.subscribe();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.completed_count == 1))
        .await
        .expect("progress never arrived")
        .unwrap();
    cancel.cancel();
    let outcome = handle.await.unwrap();

    assert_eq!(outcome.reason, SessionEndReason::Cancelled);
    assert!(outcome.released_channel);
    assert_eq!(outcome.final_state, ConnectionState::Closed);
    assert_eq!(outcome.snapshot.completed_count, 1);
    assert_eq!(calls.close.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_batch_completes_without_connecting() {
    let (transport, calls) = ScriptedTransport::new(vec![]);
    let session = ProgressSession::new(batch(&[]), transport, SessionSettings::default()).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::Completed);
    assert_eq!(outcome.snapshot.percent_complete, 0.0);
    assert_eq!(calls.open.load(Ordering::SeqCst), 0);
    assert!(!outcome.released_channel);
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let (mut transport, calls) = ScriptedTransport::new(vec![]);
    transport.refuse_open = true;
    let session = ProgressSession::new(batch(&["A"]), transport, SessionSettings::default()).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::ChannelErrored);
    assert_eq!(outcome.final_state, ConnectionState::Errored);
    assert_eq!(outcome.snapshot.transcript.len(), 1);
    assert!(outcome.snapshot.transcript[0].detail.contains("connection refused"));
    assert_eq!(calls.close.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transcript_window_keeps_latest_entries() {
    let mut script = vec![ChannelSignal::Opened];
    script.extend((0..20).map(|n| frame(&format!("X{n}"), "started")));
    script.push(frame("A", "done"));
    let (transport, _calls) = ScriptedTransport::new(script);
    let settings = SessionSettings {
        transcript_limit: 5,
        ..SessionSettings::default()
    };
    let session = ProgressSession::new(batch(&["A"]), transport, settings).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    let details: Vec<_> = outcome.snapshot.transcript.iter().map(|e| e.detail.as_str()).collect();
    assert_eq!(details, ["started X16", "started X17", "started X18", "started X19", "done A"]);
    assert_eq!(outcome.snapshot.transcript_total, 21);
}

#[tokio::test]
async fn track_batch_renders_and_returns_outcome() {
    let (transport, _calls) = ScriptedTransport::new(vec![ChannelSignal::Opened, frame("A", "done")]);
    let ctx = CommandContext::new(AppConfig::default(), Some("token".to_string()));
    let batch = ctx.batch_for(["A"], None).unwrap();

    let outcome = track_batch(&ctx, batch, transport).await.unwrap();

    assert_eq!(outcome.reason, SessionEndReason::Completed);
    assert_eq!(outcome.snapshot.summary_line(), "Completed 1 of 1");
}

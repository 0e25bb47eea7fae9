//! WebSocket transport against a local server
use decision_upload_client_lib::application::{ProgressSession, SessionSettings};
use decision_upload_client_lib::domain::{Batch, ChannelAddress, ChannelSignal, PushTransport};
use decision_upload_client_lib::infrastructure::WebSocketTransport;
use decision_upload_client_lib::types::SessionEndReason;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Accept one client, push `frames`, then close with 1000
async fn serve_frames(frames: Vec<Message>) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("ws://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed("batch finished"),
        }))
        .await
        .ok();
        while let Some(Ok(_)) = ws.next().await {}
    });
    (base, handle)
}

fn transport() -> WebSocketTransport {
    WebSocketTransport::new(Duration::from_secs(5))
}

#[tokio::test]
async fn delivers_text_frames_then_close() {
    let (base, server) = serve_frames(vec![
        Message::Text(r#"{"decision_id": "1", "status": "started"}"#.to_string()),
        Message::Binary(vec![1, 2, 3]),
        Message::Text(r#"{"decision_id": "1", "status": "done"}"#.to_string()),
    ])
    .await;

    let mut transport = transport();
    transport.open(&Url::parse(&format!("{base}/ws/progress/?token=t")).unwrap()).await.unwrap();

    assert_eq!(transport.next_signal().await, ChannelSignal::Opened);
    assert!(matches!(transport.next_signal().await, ChannelSignal::Frame(f) if f.contains("started")));
    assert!(matches!(transport.next_signal().await, ChannelSignal::Frame(f) if f.contains("done")));
    assert_eq!(
        transport.next_signal().await,
        ChannelSignal::Closed {
            code: Some(1000),
            reason: "batch finished".to_string()
        }
    );

    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_becomes_error_signal() {
    // bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut transport = transport();
    transport.open(&Url::parse(&format!("ws://127.0.0.1:{port}/ws/progress/")).unwrap()).await.unwrap();

    assert!(matches!(transport.next_signal().await, ChannelSignal::Error(_)));
    assert!(transport.close().await.is_err());
}

#[tokio::test]
async fn transport_cannot_be_opened_twice() {
    let mut transport = transport();
    let url = Url::parse("ws://127.0.0.1:9/ws/progress/").unwrap();
    transport.open(&url).await.unwrap();
    assert!(transport.open(&url).await.is_err());
}

#[tokio::test]
async fn session_tracks_batch_over_websocket() {
    let (base, server) = serve_frames(vec![
        Message::Text(r#"{"decision_id": "118", "status": "chunks_created", "detail": "12 chunks"}"#.to_string()),
        Message::Text(r#"{"decision_id": "118", "status": "done", "detail": "stored"}"#.to_string()),
        Message::Text(r#"{"decision_id": "119", "status": "already_done", "detail": "skipped"}"#.to_string()),
    ])
    .await;

    let address = ChannelAddress::derive(&base, "ws/progress/", Some("t"), None).unwrap();
    let batch = Batch::new(["118", "119"], address);
    let session = ProgressSession::new(batch, transport(), SessionSettings::default()).unwrap();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome.reason, SessionEndReason::Completed);
    assert_eq!(outcome.snapshot.completed_count, 2);
    assert!(outcome.released_channel);
    server.await.unwrap();
}

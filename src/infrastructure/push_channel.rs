//! WebSocket implementation of [`PushTransport`]
//!
//! `open` only records the address; the handshake runs on the first
//! `next_signal` call so that its outcome arrives as an ordinary
//! `Opened` or `Error` signal.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use tracing::{debug, warn};
use url::Url;

use crate::domain::channel::{ChannelError, ChannelSignal, PushTransport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SocketState {
    Idle,
    Pending(Url),
    Connected(Socket),
    Finished,
}

pub struct WebSocketTransport {
    connect_timeout: Duration,
    state: SocketState,
}

impl WebSocketTransport {
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            state: SocketState::Idle,
        }
    }

    async fn connect(&mut self, url: Url) -> ChannelSignal {
        let redacted = url.host_str().unwrap_or_default().to_string();
        debug!("WebSocket handshake with {}", redacted);

        match tokio::time::timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((socket, response))) => {
                debug!("WebSocket handshake completed with status {}", response.status());
                self.state = SocketState::Connected(socket);
                ChannelSignal::Opened
            }
            Ok(Err(e)) => {
                self.state = SocketState::Finished;
                ChannelSignal::Error(
                    ChannelError::Connect {
                        address: redacted,
                        reason: e.to_string(),
                    }
                    .to_string(),
                )
            }
            Err(_) => {
                self.state = SocketState::Finished;
                ChannelSignal::Error(
                    ChannelError::Timeout {
                        seconds: self.connect_timeout.as_secs(),
                    }
                    .to_string(),
                )
            }
        }
    }
}

fn closed_signal(frame: Option<CloseFrame<'_>>) -> ChannelSignal {
    match frame {
        Some(frame) => ChannelSignal::Closed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.into_owned(),
        },
        None => ChannelSignal::Closed {
            code: None,
            reason: String::new(),
        },
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn open(&mut self, address: &Url) -> Result<(), ChannelError> {
        if !matches!(self.state, SocketState::Idle) {
            return Err(ChannelError::Transport("transport already used".to_string()));
        }
        self.state = SocketState::Pending(address.clone());
        Ok(())
    }

    async fn next_signal(&mut self) -> ChannelSignal {
        if let SocketState::Pending(url) = &self.state {
            let url = url.clone();
            return self.connect(url).await;
        }
        let SocketState::Connected(socket) = &mut self.state else {
            // nothing will ever arrive; park until the caller gives up
            return std::future::pending().await;
        };

        // only borrows the socket, so dropping this future loses nothing
        let signal = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break ChannelSignal::Frame(text),
                Some(Ok(Message::Binary(bytes))) => warn!("Ignoring {} byte binary frame", bytes.len()),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!("Server sent close frame");
                    break closed_signal(frame);
                }
                Some(Err(e)) => break ChannelSignal::Error(e.to_string()),
                None => break closed_signal(None),
            }
        };
        if !matches!(signal, ChannelSignal::Frame(_)) {
            self.state = SocketState::Finished;
        }
        signal
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        match std::mem::replace(&mut self.state, SocketState::Finished) {
            SocketState::Connected(mut socket) => socket
                .close(None)
                .await
                .map_err(|e| ChannelError::Transport(e.to_string())),
            SocketState::Pending(_) => Ok(()),
            SocketState::Idle | SocketState::Finished => Err(ChannelError::NotOpen),
        }
    }
}

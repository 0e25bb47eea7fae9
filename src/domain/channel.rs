//! Push channel abstraction
//!
//! The session only talks to a [`PushTransport`]; the WebSocket implementation
//! lives in the infrastructure layer and tests drive scripted transports.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("Connection attempt timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Channel is not open")]
    NotOpen,
}

/// Asynchronous signal delivered by a push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    Opened,
    Frame(String),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

#[async_trait]
pub trait PushTransport: Send {
    /// Start connecting; completion is reported by `next_signal` as `Opened` or `Error`
    async fn open(&mut self, address: &Url) -> Result<(), ChannelError>;

    /// Wait for the next signal. Must be cancel safe.
    async fn next_signal(&mut self) -> ChannelSignal;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<(), ChannelError>;
}

//! Connection lifecycle manager
//!
//! Owns the push transport for one connection instance and enforces
//! `Closed → Connecting → Open → (Closed | Errored)`. Errored and Closed are
//! terminal; a new batch gets a fresh instance.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::domain::batch::ChannelAddress;
use crate::domain::channel::{ChannelSignal, PushTransport};
use crate::domain::events::{EventKind, StatusEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Errored,
}

impl ConnectionState {
    /// States in which the underlying channel holds resources
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Errored => "errored",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid transition: {signal} while {from}")]
    InvalidTransition { from: ConnectionState, signal: String },

    #[error("Connection instance {connection_id} was already used; open a new one")]
    AlreadyUsed { connection_id: Uuid },
}

/// Result of feeding one signal through the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened,
    /// Inbound frame to hand to the ingress
    Frame(String),
    /// Terminal error; carries the transcript entry to surface
    Errored(StatusEvent),
    /// Terminal close; carries the transcript entry to surface
    Closed(StatusEvent),
    /// Signal rejected by the state machine
    Ignored,
}

impl Transition {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Errored(_) | Self::Closed(_))
    }
}

pub struct ConnectionLifecycle<T> {
    connection_id: Uuid,
    transport: T,
    state: ConnectionState,
    used: bool,
}

impl<T: PushTransport> ConnectionLifecycle<T> {
    pub fn new(transport: T) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            transport,
            state: ConnectionState::Closed,
            used: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// `Closed → Connecting`. A transport that refuses to start is treated
    /// as an error signal, so the returned transition may already be terminal.
    pub async fn open(&mut self, address: &ChannelAddress) -> Result<Transition, LifecycleError> {
        if self.used {
            return Err(LifecycleError::AlreadyUsed {
                connection_id: self.connection_id,
            });
        }
        if self.state != ConnectionState::Closed {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                signal: "open".to_string(),
            });
        }
        self.used = true;
        self.state = ConnectionState::Connecting;
        info!(connection_id = %self.connection_id, address = %address.redacted(), "Opening push channel");

        match self.transport.open(address.url()).await {
            Ok(()) => Ok(Transition::Ignored),
            Err(e) => self.apply(ChannelSignal::Error(e.to_string())),
        }
    }

    /// Wait for the next transport signal and apply it.
    ///
    /// Invalid transitions are logged and reported as `Ignored`.
    pub async fn next_transition(&mut self) -> Transition {
        let signal = self.transport.next_signal().await;
        match self.apply(signal) {
            Ok(transition) => transition,
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "Ignoring channel signal");
                Transition::Ignored
            }
        }
    }

    /// Pure state machine step
    pub fn apply(&mut self, signal: ChannelSignal) -> Result<Transition, LifecycleError> {
        use ConnectionState::{Closed, Connecting, Errored, Open};

        match (self.state, signal) {
            (Connecting, ChannelSignal::Opened) => {
                self.state = Open;
                info!(connection_id = %self.connection_id, "Push channel connected");
                Ok(Transition::Opened)
            }
            (Open, ChannelSignal::Frame(raw)) => Ok(Transition::Frame(raw)),
            (Connecting | Open, ChannelSignal::Error(message)) => {
                self.state = Errored;
                error!(connection_id = %self.connection_id, %message, "Push channel error");
                Ok(Transition::Errored(StatusEvent::notice(
                    EventKind::Error,
                    format!("Connection error: {message}"),
                )))
            }
            (Connecting | Open, ChannelSignal::Closed { code, reason }) => {
                self.state = Closed;
                info!(connection_id = %self.connection_id, ?code, %reason, "Push channel closed");
                let detail = match code {
                    Some(code) if reason.is_empty() => format!("Connection closed (code {code})"),
                    Some(code) => format!("Connection closed (code {code}): {reason}"),
                    None if reason.is_empty() => "Connection closed".to_string(),
                    None => format!("Connection closed: {reason}"),
                };
                Ok(Transition::Closed(StatusEvent::notice(EventKind::System, detail)))
            }
            (from, signal) => Err(LifecycleError::InvalidTransition {
                from,
                signal: signal_name(&signal).to_string(),
            }),
        }
    }

    /// Release the channel. No-op unless the connection is connecting or open.
    ///
    /// Returns whether the transport was actually closed.
    pub async fn close(&mut self) -> bool {
        if !self.state.is_live() {
            debug!(connection_id = %self.connection_id, state = %self.state, "Close requested on inactive channel");
            return false;
        }
        if let Err(e) = self.transport.close().await {
            warn!(connection_id = %self.connection_id, error = %e, "Push channel did not close cleanly");
        }
        self.state = ConnectionState::Closed;
        info!(connection_id = %self.connection_id, "Push channel released");
        true
    }
}

const fn signal_name(signal: &ChannelSignal) -> &'static str {
    match signal {
        ChannelSignal::Opened => "opened",
        ChannelSignal::Frame(_) => "frame",
        ChannelSignal::Error(_) => "error",
        ChannelSignal::Closed { .. } => "closed",
    }
}

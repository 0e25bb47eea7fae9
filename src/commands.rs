//! Command layer for the `decisions` CLI
//!
//! Each command module is its own file in the commands/ directory; this file
//! holds the context they share.

pub mod search_commands;
pub mod tracking_commands;

pub use search_commands::{render_hits, search_decisions};
pub use tracking_commands::{UploadInput, fresh_entries, track_batch, upload_decisions, watch_batch};

use anyhow::{Context, Result};
use std::time::Duration;

use crate::application::SessionSettings;
use crate::domain::{Batch, ChannelAddress, WorkItemId};
use crate::infrastructure::{ApiClient, AppConfig, WebSocketTransport};

/// Loaded configuration plus command-line overrides
#[derive(Debug, Clone)]
pub struct CommandContext {
    config: AppConfig,
}

impl CommandContext {
    /// `token` from the command line replaces the configured one
    #[must_use]
    pub fn new(mut config: AppConfig, token: Option<String>) -> Self {
        if let Some(token) = token {
            config.auth.access_token = Some(token);
        }
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn token(&self) -> Result<&str> {
        self.config
            .access_token()
            .context("No access token configured; pass --token or set DECISIONS_AUTH__ACCESS_TOKEN")
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.config.api, Some(self.token()?.to_string())).context("Failed to create API client")
    }

    #[must_use]
    pub const fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            transcript_limit: self.config.progress.transcript_limit,
            close_on_complete: self.config.progress.close_on_complete,
        }
    }

    pub fn transport(&self) -> WebSocketTransport {
        WebSocketTransport::new(Duration::from_secs(self.config.channel.connect_timeout_seconds))
    }

    /// Batch for `ids`, with the push channel address derived from configuration
    pub fn batch_for<I>(&self, ids: I, user_channel_id: Option<&str>) -> Result<Batch>
    where
        I: IntoIterator,
        I::Item: Into<WorkItemId>,
    {
        let address = ChannelAddress::derive(
            &self.config.channel.ws_base_url,
            &self.config.channel.path,
            Some(self.token()?),
            user_channel_id,
        )
        .context("Failed to derive push channel address")?;
        Ok(Batch::new(ids, address))
    }
}

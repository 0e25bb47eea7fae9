//! Submitted batch and push-channel address

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use super::events::WorkItemId;

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid push channel base URL '{url}': {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Push channel URL must use ws:// or wss://, got '{scheme}'")]
    UnsupportedScheme { scheme: String },
}

/// Response body of the decision upload call
///
/// The backend leaves `ids_array`/`user_channel_id` out when it skipped
/// progress tracking for a trivial submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub ids_array: Option<Vec<String>>,
    #[serde(default)]
    pub user_channel_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SubmissionReceipt {
    #[must_use]
    pub const fn has_tracking(&self) -> bool {
        self.ids_array.is_some()
    }
}

/// Where progress notifications for a batch are delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    url: Url,
}

impl ChannelAddress {
    /// Build `{base}/{path}?token=..[&channel=..]`.
    ///
    /// The backend routes by the authenticated user behind `token`;
    /// `user_channel_id` travels along as a hint for multi-channel servers.
    pub fn derive(
        ws_base: &str,
        path: &str,
        token: Option<&str>,
        user_channel_id: Option<&str>,
    ) -> Result<Self, AddressError> {
        let mut base = Url::parse(ws_base).map_err(|source| AddressError::InvalidBase {
            url: ws_base.to_string(),
            source,
        })?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(AddressError::UnsupportedScheme {
                scheme: base.scheme().to_string(),
            });
        }
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|source| AddressError::InvalidBase {
                url: ws_base.to_string(),
                source,
            })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = token {
                query.append_pair("token", token);
            }
            if let Some(channel) = user_channel_id {
                query.append_pair("channel", channel);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(Self { url })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Address with the token redacted, for logs
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut shown = self.url.clone();
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| {
                let value = if k == "token" { "***".to_string() } else { v.into_owned() };
                (k.into_owned(), value)
            })
            .collect();
        if pairs.is_empty() {
            return shown.to_string();
        }
        shown.query_pairs_mut().clear().extend_pairs(pairs);
        shown.to_string()
    }
}

/// One submission's tracked item set, fixed at creation
#[derive(Debug, Clone)]
pub struct Batch {
    batch_id: Uuid,
    item_ids: Vec<WorkItemId>,
    channel: ChannelAddress,
}

impl Batch {
    /// Duplicate ids collapse into a single tracked item, first occurrence wins the order
    pub fn new<I>(item_ids: I, channel: ChannelAddress) -> Self
    where
        I: IntoIterator,
        I::Item: Into<WorkItemId>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut duplicates = 0_usize;
        for id in item_ids {
            let id = id.into();
            if seen.insert(id.clone()) {
                ordered.push(id);
            } else {
                duplicates += 1;
            }
        }
        let batch_id = Uuid::new_v4();
        if duplicates > 0 {
            warn!(%batch_id, duplicates, "Submission returned duplicate item ids; tracking each once");
        }
        Self {
            batch_id,
            item_ids: ordered,
            channel,
        }
    }

    #[must_use]
    pub const fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    #[must_use]
    pub fn item_ids(&self) -> &[WorkItemId] {
        &self.item_ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    #[must_use]
    pub const fn channel(&self) -> &ChannelAddress {
        &self.channel
    }
}

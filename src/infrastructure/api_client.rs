//! REST client for the decision backend
//!
//! Two calls: submit decision text for processing and run a similarity
//! search. Both send the bearer token and decode `{"error": ..}` bodies
//! into [`ApiError::Rejected`].

use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use ts_rs::TS;
use url::Url;

use crate::domain::batch::SubmissionReceipt;
use crate::infrastructure::config::{ApiSettings, AppConfig, ConfigError};

const UPLOAD_ENDPOINT: &str = "api/decision_upload/";
const SEARCH_ENDPOINT: &str = "api/search/";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{field} must not be empty")]
    EmptyInput { field: &'static str },

    #[error("No access token configured; pass --token or set DECISIONS_AUTH__ACCESS_TOKEN")]
    MissingToken,

    #[error("Invalid API configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown search method '{0}'")]
    UnknownSearchMethod(String),
}

/// Retrieval strategy offered by the search endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    #[default]
    SimilaritySearch,
    SimilaritySearchByVector,
    SimilaritySearchByVectorWithRelevanceScores,
}

impl SearchMethod {
    pub const ALL: [Self; 3] = [
        Self::SimilaritySearch,
        Self::SimilaritySearchByVector,
        Self::SimilaritySearchByVectorWithRelevanceScores,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimilaritySearch => "similarity_search",
            Self::SimilaritySearchByVector => "similarity_search_by_vector",
            Self::SimilaritySearchByVectorWithRelevanceScores => "similarity_search_by_vector_with_relevance_scores",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ApiError::UnknownSearchMethod(s.to_string()))
    }
}

/// One matching document fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SearchHit {
    pub text: String,
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub similarity_score: Option<f64>,
}

impl SearchHit {
    /// Value of a metadata field rendered as text, if present
    #[must_use]
    pub fn metadata_field(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Older backends group fragments per decision under `search_result`
#[derive(Debug, Clone, Deserialize)]
struct DecisionGroup {
    #[serde(default)]
    decision_id: Option<String>,
    #[serde(default)]
    max_score: Option<f64>,
    #[serde(default)]
    chunks: Vec<SearchHit>,
}

impl DecisionGroup {
    /// Chunks as flat hits; each inherits the group's id and score when it lacks its own
    fn into_hits(self) -> impl Iterator<Item = SearchHit> {
        let Self {
            decision_id,
            max_score,
            chunks,
        } = self;
        chunks.into_iter().map(move |mut hit| {
            if hit.similarity_score.is_none() {
                hit.similarity_score = max_score;
            }
            if let Some(id) = &decision_id {
                if hit.metadata_field("decision_id").is_none() {
                    match &mut hit.metadata {
                        serde_json::Value::Object(fields) => {
                            fields.insert("decision_id".to_string(), id.clone().into());
                        }
                        other => *other = serde_json::json!({ "decision_id": id }),
                    }
                }
            }
            hit
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
    #[serde(default)]
    search_result: Vec<DecisionGroup>,
}

impl SearchResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        let mut hits = self.result;
        hits.extend(self.search_result.into_iter().flat_map(DecisionGroup::into_hits));
        hits
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    input_text: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    search: &'a str,
    method: SearchMethod,
}

pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings, token: Option<String>) -> Result<Self, ApiError> {
        let base_url = AppConfig {
            api: settings.clone(),
            ..AppConfig::default()
        }
        .api_base_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(agent) = HeaderValue::from_str(&settings.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Submit decision text. The backend extracts the decision identifiers itself.
    pub async fn submit_decisions(&self, input_text: &str) -> Result<SubmissionReceipt, ApiError> {
        if input_text.trim().is_empty() {
            return Err(ApiError::EmptyInput { field: "input_text" });
        }
        tracing::info!("Submitting {} characters of decision text", input_text.len());
        let receipt: SubmissionReceipt = self
            .post_json(UPLOAD_ENDPOINT, &UploadRequest { input_text })
            .await?;
        tracing::debug!(
            tracked = receipt.ids_array.as_ref().map_or(0, Vec::len),
            "Upload accepted"
        );
        Ok(receipt)
    }

    /// Similarity search over stored decisions
    pub async fn search(&self, query: &str, method: SearchMethod) -> Result<Vec<SearchHit>, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::EmptyInput { field: "search" });
        }
        tracing::info!("Searching decisions with {}", method);
        let response: SearchResponse = self
            .post_json(SEARCH_ENDPOINT, &SearchRequest { search: query, method })
            .await?;
        let hits = response.into_hits();
        tracing::debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn post_json<B, R>(&self, endpoint: &'static str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        let url = self.endpoint_url(endpoint)?;

        let response = self.client.post(url).bearer_auth(token).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
            tracing::warn!("{} returned {}: {}", endpoint, status, message);
            return Err(ApiError::Rejected { status, message });
        }

        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { endpoint, source })
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        self.base_url.join(endpoint).map_err(|e| {
            ApiError::Config(ConfigError::Validation {
                message: format!("cannot join '{endpoint}' onto {}: {e}", self.base_url),
            })
        })
    }
}

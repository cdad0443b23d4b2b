//! Upstream Proxy Client
//!
//! Forwards the dashboard's card and favourites requests to their
//! upstream APIs so browsers never call them directly.
//!
//! # Error Mapping
//!
//! | Failure | Status |
//! |---|---|
//! | upstream non-2xx | upstream status |
//! | timeout | 408 |
//! | connection failure / not configured | 503 |
//! | anything else | 500 |

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::infrastructure::config::ProxySettings;

// =============================================================================
// Errors
// =============================================================================

/// Proxy errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    /// Upstream URL not configured.
    #[error("{0} upstream is not configured")]
    NotConfigured(&'static str),

    /// Upstream did not answer in time.
    #[error("upstream request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Upstream could not be reached.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered with a non-success status.
    #[error("{body}")]
    Upstream {
        /// Upstream status code.
        status: u16,
        /// Upstream response body.
        body: String,
    },

    /// Upstream body was not valid JSON.
    #[error("invalid upstream body: {0}")]
    InvalidBody(String),

    /// Any other failure.
    #[error("proxy request failed: {0}")]
    Other(String),
}

impl ProxyError {
    /// HTTP status to answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::Timeout(_) => 408,
            Self::NotConfigured(_) | Self::Unavailable(_) => 503,
            Self::InvalidBody(_) | Self::Other(_) => 500,
        }
    }

    fn from_reqwest(e: &reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else if e.is_connect() {
            Self::Unavailable(e.to_string())
        } else if e.is_decode() {
            Self::InvalidBody(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Query accepted by the favourites route.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesQuery {
    /// Owner of the favourites.
    pub user_id: Option<String>,
    /// Medium filter.
    pub medium: Option<String>,
    /// Favourite kind filter.
    pub favourite_type: Option<String>,
}

impl FavoritesQuery {
    fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("userId", self.user_id.as_deref()),
            ("medium", self.medium.as_deref()),
            ("favouriteType", self.favourite_type.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the proxied upstreams.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    settings: ProxySettings,
}

impl ProxyClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::Other` if the HTTP client cannot be built.
    pub fn new(settings: ProxySettings) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProxyError::Other(e.to_string()))?;

        Ok(Self { client, settings })
    }

    /// Fetch dashboard cards.
    ///
    /// Every caller parameter is forwarded; `sentiment`, `type` and
    /// `selectedUserId` get their configured defaults when absent.
    ///
    /// # Errors
    ///
    /// See the module-level error mapping.
    pub async fn drag_drop_cards(
        &self,
        params: &[(String, String)],
    ) -> Result<Vec<Value>, ProxyError> {
        let url = self
            .settings
            .admin_api_url
            .as_deref()
            .ok_or(ProxyError::NotConfigured("drag-drop-cards"))?;

        let query = self.card_query(params);
        tracing::debug!(params = query.len(), "Forwarding drag-drop cards request");

        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ProxyError::from_reqwest(&e, self.settings.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Drag-drop cards upstream error");
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::from_reqwest(&e, self.settings.timeout))?;

        Ok(extract_results(body))
    }

    /// Fetch favourites, returning the upstream status and JSON untouched.
    ///
    /// # Errors
    ///
    /// Returns `ProxyError::NotConfigured` without an upstream URL; any
    /// transport or decode failure maps to `ProxyError::Other`.
    pub async fn favorites(&self, query: &FavoritesQuery) -> Result<(u16, Value), ProxyError> {
        let url = self
            .settings
            .favorites_url
            .as_deref()
            .ok_or(ProxyError::NotConfigured("favorites"))?;

        let response = self
            .client
            .get(url)
            .query(&query.pairs())
            .send()
            .await
            .map_err(|e| ProxyError::Other(e.to_string()))?;

        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Other(e.to_string()))?;

        Ok((status, body))
    }

    fn card_query(&self, params: &[(String, String)]) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = params.to_vec();
        let has = |key: &str, query: &[(String, String)]| query.iter().any(|(k, _)| k == key);

        if !has("sentiment", &query) {
            query.push(("sentiment".to_string(), self.settings.default_sentiment.clone()));
        }
        if !has("type", &query) {
            query.push(("type".to_string(), self.settings.default_type.clone()));
        }
        if !has("selectedUserId", &query)
            && let Some(user) = &self.settings.default_selected_user_id
        {
            query.push(("selectedUserId".to_string(), user.clone()));
        }
        query
    }
}

/// Array body, or the array under `results` / `data`; anything else is empty.
fn extract_results(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Web search backed by SerpAPI.
//!
//! Queries Google through `https://serpapi.com/search` and maps the
//! `organic_results` array onto [`SearchResult`]s in rank order.

use async_trait::async_trait;
use deepsearch_config::SearchConfig;
use deepsearch_core::error::SearchError;
use deepsearch_core::search::{SearchProvider, SearchQuery, SearchResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SerpApiSearch {
    api_key: String,
    base_url: String,
    engine: String,
    client: reqwest::Client,
}

impl SerpApiSearch {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, engine: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            engine: engine.into(),
            client,
        }
    }

    /// Build from the `[search]` config section.
    pub fn from_config(config: &SearchConfig, timeout: Duration) -> Result<Self, SearchError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SearchError::NotConfigured("SERPAPI_API_KEY is not set".into()))?;
        Ok(Self::new(api_key, config.base_url.clone(), config.engine.clone(), timeout))
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        debug!(query = %query.query, engine = %self.engine, "serpapi search");

        let failed = |reason: String| SearchError::RequestFailed {
            query: query.query.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query.query.as_str()),
                ("engine", self.engine.as_str()),
                ("hl", query.locale.hl.as_str()),
                ("gl", query.locale.gl.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        if !status.is_success() {
            return Err(failed(format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200))));
        }

        parse_results(&body, query.limit).map_err(|e| match e {
            ParseFailure::Api(message) => failed(message),
            ParseFailure::Json(reason) => SearchError::MalformedResponse(reason),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SerpOrganic>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

enum ParseFailure {
    Api(String),
    Json(String),
}

fn parse_results(body: &str, limit: usize) -> Result<Vec<SearchResult>, ParseFailure> {
    let parsed: SerpResponse =
        serde_json::from_str(body).map_err(|e| ParseFailure::Json(e.to_string()))?;

    if parsed.organic_results.is_empty() {
        if let Some(error) = parsed.error {
            // SerpAPI reports "no results" as an error string.
            if error.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(ParseFailure::Api(error));
        }
    }

    Ok(parsed
        .organic_results
        .into_iter()
        .filter(|r| !r.link.is_empty())
        .take(limit)
        .map(|r| SearchResult {
            title: r.title,
            link: r.link,
            snippet: r.snippet,
            date: r.date,
            source: r.source,
        })
        .collect())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

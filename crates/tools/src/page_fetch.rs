//! Page fetcher backed by the Jina reader.
//!
//! `GET https://r.jina.ai/<url>` with `Accept: application/json` returns the
//! page rendered as markdown plus metadata. Crawl problems on the target
//! side come back as a non-200 `code` or a `warning`, which make the page
//! unavailable rather than failing the fetch.

use async_trait::async_trait;
use deepsearch_config::CrawlConfig;
use deepsearch_core::error::FetchError;
use deepsearch_core::search::{FetchedPage, PageFetcher};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct JinaReader {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl JinaReader {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    pub fn from_config(config: &CrawlConfig, timeout: Duration) -> Self {
        Self::new(config.base_url.clone(), config.api_key.clone(), timeout)
    }

    fn reader_url(&self, url: &str) -> String {
        format!("{}/{}", self.base_url, url)
    }
}

#[async_trait]
impl PageFetcher for JinaReader {
    fn name(&self) -> &str {
        "jina-reader"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        debug!(url, "fetching page");

        let mut request = self
            .client
            .get(self.reader_url(url))
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| FetchError::RequestFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchError::RequestFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        parse_page(url, status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ReaderResponse {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    data: Option<ReaderData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReaderData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    warning: Option<String>,
}

fn parse_page(url: &str, http_status: u16, body: &str) -> Result<FetchedPage, FetchError> {
    if !(200..300).contains(&http_status) {
        let message = serde_json::from_str::<ReaderResponse>(body)
            .ok()
            .and_then(|r| r.message)
            .unwrap_or_else(|| format!("reader returned HTTP {http_status}"));
        return Ok(FetchedPage {
            url: url.to_string(),
            status: http_status,
            warning: Some(message),
            ..Default::default()
        });
    }

    let parsed: ReaderResponse =
        serde_json::from_str(body).map_err(|e| FetchError::MalformedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let data = parsed.data.ok_or_else(|| FetchError::MalformedResponse {
        url: url.to_string(),
        reason: "missing `data`".into(),
    })?;

    Ok(FetchedPage {
        url: url.to_string(),
        status: parsed.code.unwrap_or(http_status),
        title: data.title,
        description: data.description,
        content: data.content,
        warning: data.warning,
    })
}

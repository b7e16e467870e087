//! Web search and page fetch abstractions.
//!
//! Both are external collaborators: the research actions only see these
//! traits, the production implementations live in `deepsearch-tools`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::{FetchError, SearchError};

/// Language/region hints passed to the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Interface language (e.g. "en")
    pub hl: String,
    /// Country (e.g. "us")
    pub gl: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            hl: "en".into(),
            gl: "us".into(),
        }
    }
}

/// A single search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub locale: Locale,
    /// Maximum number of results wanted
    pub limit: usize,
}

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run one query; results are returned in provider rank order.
    async fn search(&self, query: SearchQuery) -> std::result::Result<Vec<SearchResult>, SearchError>;
}

/// The readable content of a fetched page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    /// HTTP-like status reported by the crawler
    pub status: u16,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl FetchedPage {
    /// A page is usable only with a success status and no crawler warning.
    pub fn is_available(&self) -> bool {
        (200..300).contains(&self.status)
            && self.warning.as_deref().is_none_or(|w| w.trim().is_empty())
    }
}

/// A page crawler.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError>;
}

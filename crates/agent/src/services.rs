//! The external collaborators a research run talks to.

use deepsearch_config::{AppConfig, ExecutionConfig};
use deepsearch_core::search::{Locale, PageFetcher, SearchProvider};
use deepsearch_core::{Error, Result};
use deepsearch_providers::LlmClient;
use deepsearch_tools::{JinaReader, SerpApiSearch};
use std::sync::Arc;
use std::time::Duration;

/// Everything actions, the evaluator and the planner need besides the task tree.
#[derive(Clone)]
pub struct Services {
    pub llm: LlmClient,
    pub search: Arc<dyn SearchProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub limits: ExecutionConfig,
    pub locale: Locale,
}

impl Services {
    pub fn new(
        llm: LlmClient,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        limits: ExecutionConfig,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher,
            limits,
            locale: Locale::default(),
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Wire the production backends described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let llm = LlmClient::from_config(config)?;
        let search = SerpApiSearch::from_config(&config.search, timeout)?;
        let fetcher = JinaReader::from_config(&config.crawl, timeout);
        let locale = Locale {
            hl: config.search.hl.clone(),
            gl: config.search.gl.clone(),
        };
        Ok(Self::new(llm, Arc::new(search), Arc::new(fetcher), config.execution.clone())
            .with_locale(locale))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("llm", &self.llm.provider_name())
            .field("search", &self.search.name())
            .field("fetcher", &self.fetcher.name())
            .field("limits", &self.limits)
            .field("locale", &self.locale)
            .finish()
    }
}

//! `visit`: read pages and keep what is useful as knowledge.

use async_trait::async_trait;
use deepsearch_core::error::{ActionError, FetchError, ProviderError};
use deepsearch_core::{Action, ActionKind, ActionOutcome, FetchedPage, Knowledge, Reference, Task, TaskScope};
use futures::future::join_all;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use super::{clean_list, parse_args};
use crate::selector::{query_embedding, select_relevant};
use crate::services::Services;
use crate::summarize::{PageVerdict, summarize_page};

pub const NOTHING_USEFUL: &str = "Visited the pages but found nothing useful for the question.";

#[derive(Debug, Deserialize)]
struct VisitArgs {
    #[serde(default)]
    think: String,
    #[serde(default)]
    urls: Vec<String>,
}

/// Why one URL produced no knowledge.
#[derive(Debug, Error)]
enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Summarize(#[from] ProviderError),
}

pub struct VisitAction {
    services: Arc<Services>,
}

impl VisitAction {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Select and summarize one available page.
    async fn read_page(
        &self,
        task: &Task,
        embedding: Option<&[f32]>,
        page: &FetchedPage,
        scope: &TaskScope,
    ) -> Result<Option<Knowledge>, PageError> {
        let limits = &self.services.limits;
        let usage = scope.context().usage();
        let content = select_relevant(
            &self.services.llm,
            embedding,
            &page.content,
            limits.content_max_length,
            limits.window_step,
            usage,
        )
        .await;
        let summary = summarize_page(
            &self.services.llm,
            &task.origin_query,
            &task.query,
            &page.title,
            &content,
            usage,
        )
        .await?;
        debug!(url = %page.url, verdict = ?summary.evaluate, reason = %summary.reason, "page summarized");
        if summary.evaluate != PageVerdict::Useful {
            return Ok(None);
        }
        Ok(Some(Knowledge {
            reference: Reference {
                url: page.url.clone(),
                title: (!page.title.is_empty()).then(|| page.title.clone()),
                datetime: summary.datetime,
                exact_quote: None,
            },
            summary: summary.summary,
            quotes: summary.quotes,
        }))
    }
}

fn digest(visited: usize, knowledge: &[Knowledge]) -> String {
    if knowledge.is_empty() {
        return NOTHING_USEFUL.to_string();
    }
    let mut out = format!(
        "Visited {visited} page(s), {} had useful information:\n",
        knowledge.len()
    );
    for k in knowledge {
        let line = k.summary.lines().next().unwrap_or_default();
        let _ = writeln!(out, "- {}: {line}", k.reference.url);
    }
    out
}

#[async_trait]
impl Action for VisitAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Visit
    }

    fn description(&self) -> &str {
        "Read the full content of web pages and extract what is relevant."
    }

    fn instructions(&self) -> &str {
        "- Crawl and read the full content of URLs, including the full text and last updated date.\n\
         - Pick the most relevant URLs from earlier search results, at most 5.\n\
         - Useful findings are added to the knowledge gathered for the question."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "think": {
                    "type": "string",
                    "description": "A very concise explanation of why these pages are worth reading"
                },
                "urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "URLs to visit, the most relevant 5 at most"
                }
            },
            "required": ["think", "urls"]
        })
    }

    async fn execute(
        &self,
        scope: &TaskScope,
        arguments: serde_json::Value,
    ) -> Result<ActionOutcome, ActionError> {
        let args: VisitArgs = parse_args(self.kind(), arguments)?;
        let limits = &self.services.limits;
        let urls = clean_list(args.urls, limits.max_visit_urls);
        let task = scope.current_task()?;
        if urls.is_empty() {
            return Ok(ActionOutcome::text(NOTHING_USEFUL));
        }

        let fetches = urls.iter().map(|url| self.services.fetcher.fetch(url));
        let mut pages = Vec::with_capacity(urls.len());
        for (url, result) in urls.iter().zip(join_all(fetches).await) {
            match result {
                Ok(page) if page.is_available() => pages.push(page),
                Ok(page) => {
                    debug!(url = %url, status = page.status, warning = ?page.warning, "page unavailable");
                }
                Err(e) => warn!(url = %url, error = %PageError::from(e), "fetch failed"),
            }
        }

        let needs_selection = pages
            .iter()
            .any(|p| p.content.chars().count() > limits.content_max_length);
        let embedding = if needs_selection {
            match query_embedding(&self.services.llm, &task, scope.context().usage()).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "query embedding failed, truncating pages");
                    None
                }
            }
        } else {
            None
        };

        let reads = pages
            .iter()
            .map(|page| self.read_page(&task, embedding.as_deref(), page, scope));
        let mut knowledge = Vec::new();
        for (page, result) in pages.iter().zip(join_all(reads).await) {
            match result {
                Ok(Some(k)) => knowledge.push(k),
                Ok(None) => {}
                Err(e) => warn!(url = %page.url, error = %e, "page processing failed"),
            }
        }

        info!(
            task_id = %task.id,
            urls = urls.len(),
            useful = knowledge.len(),
            think = %args.think,
            "visit finished"
        );
        let output = digest(urls.len(), &knowledge);
        task.add_knowledges(knowledge);
        Ok(ActionOutcome::text(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        CountingSearch, RoutingMockProvider, TablePageFetcher, make_json_response, test_config,
    };
    use deepsearch_core::build_context;
    use deepsearch_providers::LlmClient;

    /// Summaries echo the page title; titles starting with "off" are not related.
    fn summarizer() -> RoutingMockProvider {
        RoutingMockProvider::new(|req| {
            let user = &req.messages[1].content;
            let title = user
                .lines()
                .next()
                .and_then(|l| l.strip_prefix("Title: "))
                .unwrap_or("untitled");
            let verdict = if title.starts_with("off") { "not_related" } else { "useful" };
            Ok(make_json_response(serde_json::json!({
                "reason": "checked",
                "summary": format!("about {title}"),
                "quotes": [format!("quote from {title}")],
                "evaluate": verdict
            })))
        })
    }

    fn action(provider: RoutingMockProvider, fetcher: TablePageFetcher) -> VisitAction {
        let config = test_config();
        let services = Services::new(
            LlmClient::new(Arc::new(provider), &config),
            Arc::new(CountingSearch::new()),
            Arc::new(fetcher),
            config.execution.clone(),
        );
        VisitAction::new(Arc::new(services))
    }

    #[tokio::test]
    async fn useful_pages_become_knowledge_in_url_order() {
        let fetcher = TablePageFetcher::new()
            .with_page("https://a", "alpha", "alpha text")
            .with_page("https://b", "off topic", "recipes")
            .with_page("https://c", "gamma", "gamma text");
        let action = action(summarizer(), fetcher);
        let scope = build_context("q");

        let out = action
            .execute(
                &scope,
                serde_json::json!({"think": "read", "urls": ["https://c", "https://b", "https://a"]}),
            )
            .await
            .unwrap();

        let task = scope.current_task().unwrap();
        let urls: Vec<_> = task.knowledges().into_iter().map(|k| k.reference.url).collect();
        assert_eq!(urls, vec!["https://c", "https://a"]);
        assert!(out.output.contains("- https://c: about gamma"));
        assert!(!out.output.contains("https://b"));
        assert_eq!(task.knowledges()[0].reference.title.as_deref(), Some("gamma"));
    }

    #[tokio::test]
    async fn unavailable_page_skips_summarizer() {
        let provider = Arc::new(summarizer());
        let config = test_config();
        let services = Services::new(
            LlmClient::new(provider.clone(), &config),
            Arc::new(CountingSearch::new()),
            Arc::new(TablePageFetcher::new().with_unavailable("https://a", "Target URL returned error 403")),
            config.execution.clone(),
        );
        let action = VisitAction::new(Arc::new(services));
        let scope = build_context("q");

        let out = action
            .execute(&scope, serde_json::json!({"urls": ["https://a"]}))
            .await
            .unwrap();
        assert_eq!(out.output, NOTHING_USEFUL);
        assert!(scope.current_task().unwrap().knowledges().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn long_page_is_cut_before_summarizing() {
        let provider = Arc::new(summarizer());
        let mut config = test_config();
        config.execution.content_max_length = 100;
        config.execution.window_step = 5;
        let long = "x".repeat(1000);
        let services = Services::new(
            LlmClient::new(provider.clone(), &config),
            Arc::new(CountingSearch::new()),
            Arc::new(TablePageFetcher::new().with_page("https://a", "alpha", &long)),
            config.execution.clone(),
        );
        let action = VisitAction::new(Arc::new(services));
        let scope = build_context("q");

        action
            .execute(&scope, serde_json::json!({"urls": ["https://a"]}))
            .await
            .unwrap();
        let user = provider.requests()[0].messages[1].content.clone();
        assert_eq!(user, format!("Title: alpha\n\n{}", "x".repeat(100)));
        // One query embedding plus one per window.
        assert_eq!(provider.embed_calls(), 46);
        assert!(scope.current_task().unwrap().query_embedding().is_some());
    }

    #[tokio::test]
    async fn urls_capped_at_five() {
        let fetcher = Arc::new(TablePageFetcher::new());
        let config = test_config();
        let services = Services::new(
            LlmClient::new(Arc::new(summarizer()), &config),
            Arc::new(CountingSearch::new()),
            fetcher.clone(),
            config.execution.clone(),
        );
        let action = VisitAction::new(Arc::new(services));
        let scope = build_context("q");
        let urls: Vec<String> = (0..8).map(|i| format!("https://{i}")).collect();
        let out = action
            .execute(&scope, serde_json::json!({"urls": urls}))
            .await
            .unwrap();
        assert_eq!(out.output, NOTHING_USEFUL);
        assert_eq!(fetcher.calls(), 5);
    }
}

//! `search`: query the web search provider.

use async_trait::async_trait;
use deepsearch_core::error::ActionError;
use deepsearch_core::{Action, ActionKind, ActionOutcome, SearchQuery, SearchResult, TaskScope};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use super::{clean_list, parse_args};
use crate::rewrite::rewrite_queries;
use crate::services::Services;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    think: String,
    #[serde(default)]
    search_queries: Vec<String>,
}

pub struct SearchAction {
    services: Arc<Services>,
}

impl SearchAction {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

/// Merge result lists in query order, keeping the first hit per link.
pub fn merge_results(batches: Vec<Vec<SearchResult>>, limit: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|r| seen.insert(r.link.clone()))
        .take(limit)
        .collect()
}

/// Reranking hook. Provider order is kept as-is.
pub fn rerank(results: Vec<SearchResult>) -> Vec<SearchResult> {
    results
}

#[async_trait]
impl Action for SearchAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Search
    }

    fn description(&self) -> &str {
        "Search the web for external information about the question."
    }

    fn instructions(&self) -> &str {
        "- Use it to get external information needed to answer the question.\n\
         - Build queries from the deep intention behind the question and the expected answer format.\n\
         - Prefer a single query. Add another only when the question covers several aspects \
         that one query cannot reach; each query then targets one aspect.\n\
         - Queries should be search-engine friendly: concise keywords, no filler words."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "think": {
                    "type": "string",
                    "description": "A very concise explanation of why this search is needed"
                },
                "search_queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Search queries, at most 3. Minimize overlap between them."
                }
            },
            "required": ["think", "search_queries"]
        })
    }

    async fn execute(
        &self,
        scope: &TaskScope,
        arguments: serde_json::Value,
    ) -> Result<ActionOutcome, ActionError> {
        let args: SearchArgs = parse_args(self.kind(), arguments)?;
        let limits = &self.services.limits;
        let raw = clean_list(args.search_queries, limits.max_search_queries);
        if raw.is_empty() {
            return Ok(ActionOutcome::text("[]"));
        }

        let task = scope.current_task()?;
        let usage = scope.context().usage();
        let queries = match rewrite_queries(&self.services.llm, &task.origin_query, &task.query, &raw, usage).await {
            Ok(queries) => queries,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "query rewrite failed, using raw queries");
                raw
            }
        };

        let requests = queries.iter().map(|q| {
            self.services.search.search(SearchQuery {
                query: q.clone(),
                locale: self.services.locale.clone(),
                limit: limits.max_search_results,
            })
        });
        let mut batches = Vec::with_capacity(queries.len());
        for result in join_all(requests).await {
            batches.push(result?);
        }

        let results = rerank(merge_results(batches, limits.max_search_results));
        info!(
            task_id = %task.id,
            queries = ?queries,
            results = results.len(),
            think = %args.think,
            "search finished"
        );
        serde_json::to_string(&results)
            .map(ActionOutcome::text)
            .map_err(|e| ActionError::ExecutionFailed {
                action: self.kind().to_string(),
                reason: e.to_string(),
            })
    }
}

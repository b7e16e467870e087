//! Search query rewriting.

use deepsearch_config::ModelRole;
use deepsearch_core::error::ProviderError;
use deepsearch_core::message::Message;
use deepsearch_core::usage::UsageTracker;
use deepsearch_providers::LlmClient;
use serde::Deserialize;
use tracing::debug;

pub const SCHEMA_NAME: &str = "search_queries";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQueries {
    #[serde(default)]
    pub explanation: String,
    pub queries: Vec<String>,
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "explanation": {
                "type": "string",
                "description": "How the queries were improved"
            },
            "queries": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Rewritten search engine queries"
            }
        },
        "required": ["explanation", "queries"]
    })
}

const SYSTEM: &str = "You are an expert at crafting web search queries.\n\
Rewrite the given queries so a search engine returns the most useful results \
for the question. Keep each query short and keyword-focused, remove filler words, \
and add a year or a precise term when it narrows the results. \
Never return more queries than you were given.";

/// Rewrite `raw` into better search queries for `query`.
///
/// The result holds at most `raw.len()` non-empty queries; if the model
/// returns none, `raw` is returned unchanged.
pub async fn rewrite_queries(
    llm: &LlmClient,
    origin_query: &str,
    query: &str,
    raw: &[String],
    usage: &UsageTracker,
) -> Result<Vec<String>, ProviderError> {
    let listed = raw
        .iter()
        .map(|q| format!("- {q}"))
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!(
        "Original question: {origin_query}\n\
         Current question: {query}\n\n\
         Queries to rewrite ({}):\n{listed}",
        raw.len()
    );
    let rewritten: SearchQueries = llm
        .structured(
            ModelRole::Rewrite,
            SCHEMA_NAME,
            schema(),
            vec![Message::system(SYSTEM), Message::user(user)],
            usage,
        )
        .await?;

    let mut queries: Vec<String> = rewritten
        .queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    queries.truncate(raw.len());
    debug!(explanation = %rewritten.explanation, count = queries.len(), "queries rewritten");

    if queries.is_empty() {
        return Ok(raw.to_vec());
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RoutingMockProvider, make_json_response, test_config};
    use std::sync::Arc;

    fn llm(reply: serde_json::Value) -> LlmClient {
        let provider = RoutingMockProvider::new(move |_| Ok(make_json_response(reply.clone())));
        LlmClient::new(Arc::new(provider), &test_config())
    }

    #[tokio::test]
    async fn rewrite_is_capped_at_input_count() {
        let llm = llm(serde_json::json!({
            "explanation": "split",
            "queries": ["spx april 2025", " tariff selloff ", "fed rate"]
        }));
        let raw = vec!["spx down".to_string(), "why market fell".to_string()];
        let out = rewrite_queries(&llm, "q", "q", &raw, &UsageTracker::new()).await.unwrap();
        assert_eq!(out, vec!["spx april 2025", "tariff selloff"]);
    }

    #[tokio::test]
    async fn empty_rewrite_keeps_raw() {
        let llm = llm(serde_json::json!({"explanation": "", "queries": ["  "]}));
        let raw = vec!["spx down".to_string()];
        let out = rewrite_queries(&llm, "q", "q", &raw, &UsageTracker::new()).await.unwrap();
        assert_eq!(out, raw);
    }

    #[tokio::test]
    async fn malformed_rewrite_is_schema_error() {
        let llm = llm(serde_json::json!({"explanation": "oops"}));
        let err = rewrite_queries(&llm, "q", "q", &["a".into()], &UsageTracker::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Schema { .. }));
    }
}

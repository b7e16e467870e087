//! Page summarization: turn fetched content into a verdict and a summary.

use deepsearch_config::ModelRole;
use deepsearch_core::error::ProviderError;
use deepsearch_core::message::Message;
use deepsearch_core::usage::UsageTracker;
use deepsearch_providers::LlmClient;
use serde::Deserialize;

pub const SCHEMA_NAME: &str = "page_summary";

/// Upper bound on sentences asked for in a summary.
pub const MAX_SUMMARY_SENTENCES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageVerdict {
    Useful,
    NotRelated,
    Unavailable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageSummary {
    #[serde(default)]
    pub reason: String,
    #[serde(alias = "summarize")]
    pub summary: String,
    #[serde(default)]
    pub quotes: Vec<String>,
    pub evaluate: PageVerdict,
    #[serde(default)]
    pub datetime: Option<String>,
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "reason": { "type": "string" },
            "summary": { "type": "string" },
            "quotes": { "type": "array", "items": { "type": "string" } },
            "evaluate": {
                "type": "string",
                "enum": ["useful", "not_related", "unavailable"]
            },
            "datetime": {
                "type": "string",
                "description": "Publication date of the page, if stated"
            }
        },
        "required": ["reason", "summary", "quotes", "evaluate"]
    })
}

fn question_content(origin_query: &str, query: &str) -> String {
    if origin_query == query {
        query.to_string()
    } else {
        format!("Original question: {origin_query}\nMore specifically: {query}")
    }
}

fn system_prompt(origin_query: &str, query: &str) -> String {
    format!(
        "You extract and condense information from web pages.\n\n\
         Analyze the page content to gather information for this question:\n{question}\n\n\
         -Guidelines-\n\n\
         - Judge how relevant and useful the content is. Put a short justification in `reason`.\n\
         - In `summary`, condense what the page says about: {query}. \
         Be concise, no more than {MAX_SUMMARY_SENTENCES} sentences.\n\
         - In `quotes`, prefer verbatim quotations from the page.\n\
         - If the page is inaccessible (404, access denied, rate limited), set evaluate=\"unavailable\".\n\
         - If the content is not relevant to the question, set evaluate=\"not_related\".\n\
         - Otherwise set evaluate=\"useful\". Fill `datetime` when the page states a date.",
        question = question_content(origin_query, query),
    )
}

pub async fn summarize_page(
    llm: &LlmClient,
    origin_query: &str,
    query: &str,
    title: &str,
    content: &str,
    usage: &UsageTracker,
) -> Result<PageSummary, ProviderError> {
    let user = if title.is_empty() {
        content.to_string()
    } else {
        format!("Title: {title}\n\n{content}")
    };
    llm.structured(
        ModelRole::Summarize,
        SCHEMA_NAME,
        schema(),
        vec![Message::system(system_prompt(origin_query, query)), Message::user(user)],
        usage,
    )
    .await
}

//! Shared test helpers: mock collaborators and response builders.
//!
//! Also compiled into the integration tests via `#[path]`, so only paths
//! through the public crates are used here.

#![allow(dead_code)]

use async_trait::async_trait;
use deepsearch_config::AppConfig;
use deepsearch_core::error::{FetchError, ProviderError, SearchError};
use deepsearch_core::message::{Message, MessageToolCall, Role};
use deepsearch_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use deepsearch_core::search::{FetchedPage, PageFetcher, SearchProvider, SearchQuery, SearchResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Responder = dyn Fn(&ProviderRequest) -> Result<ProviderResponse, ProviderError> + Send + Sync;
type Embedder = dyn Fn(&str) -> Vec<f32> + Send + Sync;

/// A mock provider that answers each request by inspecting it.
///
/// Sibling sub-tasks run concurrently, so a fixed response queue would be
/// consumed in a nondeterministic order. Routing on the request content
/// (schema name, task question, number of tool results) keeps tests stable.
pub struct RoutingMockProvider {
    responder: Box<Responder>,
    embedder: Option<Box<Embedder>>,
    requests: Mutex<Vec<ProviderRequest>>,
    embed_calls: AtomicUsize,
}

impl RoutingMockProvider {
    pub fn new(
        responder: impl Fn(&ProviderRequest) -> Result<ProviderResponse, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            embedder: Some(Box::new(|_| vec![1.0, 0.0])),
            requests: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose completions always fail.
    pub fn unscripted() -> Self {
        Self::new(|_| {
            Err(ProviderError::ApiError {
                status_code: 500,
                message: "unscripted completion".into(),
            })
        })
    }

    pub fn with_embedder(mut self, embedder: impl Fn(&str) -> Vec<f32> + Send + Sync + 'static) -> Self {
        self.embedder = Some(Box::new(embedder));
        self
    }

    pub fn failing_embeddings(mut self) -> Self {
        self.embedder = None;
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Requests made with the given response schema.
    pub fn structured_requests(&self, schema: &str) -> Vec<ProviderRequest> {
        self.requests()
            .into_iter()
            .filter(|r| schema_name(r) == Some(schema))
            .collect()
    }

    /// Planner requests (tool-calling, no response schema) for one task question.
    pub fn planner_requests_for(&self, query: &str) -> Vec<ProviderRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.response_format.is_none() && !r.tools.is_empty() && task_query(r) == query)
            .collect()
    }
}

#[async_trait]
impl Provider for RoutingMockProvider {
    fn name(&self) -> &str {
        "routing_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let response = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let Some(embedder) = &self.embedder else {
            return Err(ProviderError::Network("embedding endpoint unreachable".into()));
        };
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|t| embedder(t.as_str())).collect(),
            model: request.model,
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 0,
                total_tokens: 1,
            }),
        })
    }
}

/// Name of the response schema, if the request is structured.
pub fn schema_name(request: &ProviderRequest) -> Option<&str> {
    request.response_format.as_ref().map(|f| f.name.as_str())
}

/// The first user message: the task question for planner requests.
pub fn task_query(request: &ProviderRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// The system prompt, if any.
pub fn system_prompt(request: &ProviderRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// How many action results the conversation already holds.
pub fn tool_result_count(request: &ProviderRequest) -> usize {
    request.messages.iter().filter(|m| m.role == Role::Tool).count()
}

pub fn last_tool_result(request: &ProviderRequest) -> Option<&str> {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
}

pub fn offered_tools(request: &ProviderRequest) -> Vec<String> {
    request.tools.iter().map(|t| t.name.clone()).collect()
}

fn mock_usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Create a structured (JSON) response.
pub fn make_json_response(value: serde_json::Value) -> ProviderResponse {
    make_text_response(&value.to_string())
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A single tool call response.
pub fn call(name: &str, args: serde_json::Value) -> ProviderResponse {
    make_tool_call_response(vec![make_tool_call(name, args)], "")
}

/// A search provider that counts calls and serves canned results per query.
#[derive(Default)]
pub struct CountingSearch {
    results: HashMap<String, Vec<SearchResult>>,
    failing: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl CountingSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for CountingSearch {
    fn name(&self) -> &str {
        "counting_search"
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        self.queries.lock().unwrap().push(query.query.clone());
        if self.failing.contains(&query.query) {
            return Err(SearchError::RequestFailed {
                query: query.query,
                reason: "mock failure".into(),
            });
        }
        Ok(self.results.get(&query.query).cloned().unwrap_or_default())
    }
}

pub fn search_result(title: &str, link: &str) -> SearchResult {
    SearchResult {
        title: title.into(),
        link: link.into(),
        snippet: format!("snippet for {title}"),
        date: None,
        source: None,
    }
}

/// A page fetcher backed by a url → page table. Unknown URLs fail.
#[derive(Default)]
pub struct TablePageFetcher {
    pages: HashMap<String, FetchedPage>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl TablePageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, title: &str, content: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                url: url.into(),
                status: 200,
                title: title.into(),
                description: String::new(),
                content: content.into(),
                warning: None,
            },
        );
        self
    }

    pub fn with_unavailable(mut self, url: &str, warning: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                url: url.into(),
                status: 200,
                warning: Some(warning.into()),
                ..Default::default()
            },
        );
        self
    }

    pub fn failing_on(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for TablePageFetcher {
    fn name(&self) -> &str {
        "table_fetcher"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|u| u == url) {
            return Err(FetchError::RequestFailed {
                url: url.into(),
                reason: "connection reset".into(),
            });
        }
        self.pages.get(url).cloned().ok_or_else(|| FetchError::RequestFailed {
            url: url.into(),
            reason: "not in table".into(),
        })
    }
}

/// Config with credentials filled in and default limits.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        api_key: Some("sk-test".into()),
        ..AppConfig::default()
    };
    config.search.api_key = Some("serp-test".into());
    config
}

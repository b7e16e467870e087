//! Client for any endpoint speaking the OpenAI chat/embeddings dialect.
//!
//! OpenAI itself, OpenRouter, Ollama, vLLM and Together all accept the same
//! `/chat/completions` and `/embeddings` bodies. Structured output is sent
//! as a `json_schema` response format; action lists become `function` tools.

use async_trait::async_trait;
use deepsearch_core::error::ProviderError;
use deepsearch_core::message::{Message, MessageToolCall};
use deepsearch_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ResponseFormat, ToolDefinition, Usage,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "HTTP client builder failed, using defaults");
                reqwest::Client::new()
            }
        };
        let base_url: String = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            http,
        }
    }

    /// api.openai.com with the default timeout.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key, DEFAULT_TIMEOUT)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// POST a JSON body and decode a 200 reply, mapping HTTP failures onto
    /// [`ProviderError`] variants the agent can reason about.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, detail));
        }

        response.json::<R>().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("Undecodable {path} reply: {e}"),
        })
    }
}

fn status_error(status: u16, detail: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_secs: 5 },
        401 | 403 => ProviderError::AuthenticationFailed(format!("HTTP {status}: check the API key")),
        404 => ProviderError::ModelNotFound(detail),
        _ => {
            warn!(status, body = %detail, "provider error");
            ProviderError::ApiError {
                status_code: status,
                message: detail,
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            structured = request.response_format.is_some(),
            "chat completion"
        );
        let body = ChatBody::from_request(&request);
        let reply: ChatReply = self.post_json("chat/completions", &body).await?;
        reply.into_response()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, inputs = request.inputs.len(), "embedding");
        let body = EmbedBody {
            model: &request.model,
            input: &request.inputs,
            encoding_format: "float",
        };
        let reply: EmbedReply = self.post_json("embeddings", &body).await?;
        reply.into_response(request.inputs.len())
    }
}

// Wire format

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireFormat<'a>>,
}

impl<'a> ChatBody<'a> {
    fn from_request(request: &'a ProviderRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(WireTool::from).collect(),
            response_format: request.response_format.as_ref().map(WireFormat::from),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    /// Null on assistant turns that only carry calls
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        let content = (!(m.content.is_empty() && m.has_calls())).then(|| m.content.clone());
        Self {
            role: m.role.as_str().to_owned(),
            content,
            tool_calls: m.tool_calls.iter().map(WireCall::from).collect(),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

fn function_kind() -> String {
    "function".to_owned()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments object
    arguments: String,
}

impl From<&MessageToolCall> for WireCall {
    fn from(call: &MessageToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

impl From<WireCall> for MessageToolCall {
    fn from(call: WireCall) -> Self {
        Self {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: def,
        }
    }
}

#[derive(Serialize)]
struct WireFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: WireSchema<'a>,
}

#[derive(Serialize)]
struct WireSchema<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
    strict: bool,
}

impl<'a> From<&'a ResponseFormat> for WireFormat<'a> {
    fn from(format: &'a ResponseFormat) -> Self {
        Self {
            kind: "json_schema",
            json_schema: WireSchema {
                name: &format.name,
                schema: &format.schema,
                strict: false,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

impl ChatReply {
    fn into_response(self) -> Result<ProviderResponse, ProviderError> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(ProviderError::EmptyResponse(self.model));
        };
        let wire = choice.message;
        let message = Message {
            tool_calls: wire.tool_calls.into_iter().map(MessageToolCall::from).collect(),
            ..Message::assistant(wire.content.unwrap_or_default())
        };
        Ok(ProviderResponse {
            message,
            usage: self.usage.map(Usage::from),
            model: self.model,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    data: Vec<EmbedItem>,
    model: String,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl EmbedReply {
    /// Reorders vectors by `index` and checks one came back per input.
    fn into_response(mut self, expected: usize) -> Result<EmbeddingResponse, ProviderError> {
        if self.data.len() != expected {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: format!("asked for {expected} embeddings, got {}", self.data.len()),
            });
        }
        self.data.sort_by_key(|item| item.index);
        Ok(EmbeddingResponse {
            embeddings: self.data.into_iter().map(|item| item.embedding).collect(),
            model: self.model,
            usage: self.usage.map(Usage::from),
        })
    }
}

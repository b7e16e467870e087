//! Role-aware LLM client.
//!
//! Wraps a [`Provider`] and resolves, per [`ModelRole`], which model,
//! temperature and token limit to use. Every call records its token usage
//! into the run's [`UsageTracker`].

use deepsearch_config::{AppConfig, ModelRole, ModelSettings};
use deepsearch_core::error::ProviderError;
use deepsearch_core::message::Message;
use deepsearch_core::provider::{
    EmbeddingRequest, Provider, ProviderRequest, ProviderResponse, ResponseFormat, ToolDefinition,
};
use deepsearch_core::usage::UsageTracker;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use crate::openai_compat::OpenAiCompatProvider;

const ROLES: [ModelRole; 5] = [
    ModelRole::Planner,
    ModelRole::Rewrite,
    ModelRole::Summarize,
    ModelRole::Evaluate,
    ModelRole::Embedding,
];

/// Shared handle to the LLM, routed by role.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    settings: HashMap<ModelRole, ModelSettings>,
}

impl LlmClient {
    /// Use `provider` with the per-role settings from `config`.
    pub fn new(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        let settings = ROLES
            .into_iter()
            .map(|role| (role, config.model_settings(role)))
            .collect();
        Self { provider, settings }
    }

    /// Build the OpenAI-compatible provider described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured("no API key for the LLM endpoint".into())
        })?;
        let provider = OpenAiCompatProvider::new(
            "openai-compatible",
            config.api_url.clone(),
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        );
        Ok(Self::new(Arc::new(provider), config))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Settings for `role`. Every role is resolved at construction.
    pub fn settings(&self, role: ModelRole) -> ModelSettings {
        self.settings.get(&role).cloned().unwrap_or_else(|| ModelSettings {
            model: String::new(),
            temperature: 0.0,
            max_tokens: 0,
        })
    }

    fn request(
        &self,
        role: ModelRole,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        response_format: Option<ResponseFormat>,
    ) -> ProviderRequest {
        let settings = self.settings(role);
        ProviderRequest {
            model: settings.model,
            messages,
            temperature: settings.temperature,
            max_tokens: Some(settings.max_tokens),
            tools,
            response_format,
        }
    }

    /// Raw completion, optionally offering tools.
    pub async fn chat(
        &self,
        role: ModelRole,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        usage: &UsageTracker,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.request(role, messages, tools, None);
        debug!(role = role.as_str(), model = %request.model, "llm chat");
        let response = self.provider.complete(request).await?;
        if let Some(u) = &response.usage {
            usage.record(u);
        }
        Ok(response)
    }

    /// Plain text completion of a system + user prompt pair.
    pub async fn text(
        &self,
        role: ModelRole,
        system: &str,
        user: &str,
        usage: &UsageTracker,
    ) -> Result<String, ProviderError> {
        let messages = vec![Message::system(system), Message::user(user)];
        let response = self.chat(role, messages, Vec::new(), usage).await?;
        Ok(response.message.content)
    }

    /// Completion constrained to `schema`, parsed into `T`.
    ///
    /// Output that cannot be parsed as `T` is a [`ProviderError::Schema`].
    pub async fn structured<T: DeserializeOwned>(
        &self,
        role: ModelRole,
        schema_name: &str,
        schema: serde_json::Value,
        messages: Vec<Message>,
        usage: &UsageTracker,
    ) -> Result<T, ProviderError> {
        let format = ResponseFormat {
            name: schema_name.to_string(),
            schema,
        };
        let request = self.request(role, messages, Vec::new(), Some(format));
        debug!(role = role.as_str(), model = %request.model, schema = schema_name, "llm structured");
        let response = self.provider.complete(request).await?;
        if let Some(u) = &response.usage {
            usage.record(u);
        }
        parse_structured(schema_name, &response.message.content)
    }

    /// Embed `inputs` with the embedding model, one vector per input.
    pub async fn embed(
        &self,
        inputs: Vec<String>,
        usage: &UsageTracker,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let expected = inputs.len();
        let model = self.settings(ModelRole::Embedding).model;
        let response = self.provider.embed(EmbeddingRequest { model, inputs }).await?;
        if let Some(u) = &response.usage {
            usage.record(u);
        }
        if response.embeddings.len() != expected {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: format!(
                    "expected {expected} embeddings, got {}",
                    response.embeddings.len()
                ),
            });
        }
        Ok(response.embeddings)
    }
}

/// Parse model output as `T`, tolerating a markdown code fence or prose
/// around a single JSON object.
pub fn parse_structured<T: DeserializeOwned>(schema_name: &str, raw: &str) -> Result<T, ProviderError> {
    let trimmed = strip_code_fence(raw.trim());
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(first) => {
            if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            warn!(schema = schema_name, error = %first, "structured output rejected");
            Err(ProviderError::Schema {
                schema: schema_name.to_string(),
                reason: first.to_string(),
            })
        }
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deepsearch_core::provider::{EmbeddingResponse, Usage};
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        is_pass: bool,
    }

    /// Replies with fixed content and remembers the last request.
    struct Canned {
        reply: String,
        seen: Mutex<Option<ProviderRequest>>,
    }

    impl Canned {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let model = request.model.clone();
            *self.seen.lock().unwrap() = Some(request);
            Ok(ProviderResponse {
                message: Message::assistant(self.reply.clone()),
                usage: Some(Usage {
                    prompt_tokens: 7,
                    completion_tokens: 3,
                    total_tokens: 10,
                }),
                model,
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.models.evaluate.model = Some("judge".into());
        config
    }

    #[test]
    fn parse_plain_json() {
        let v: Verdict = parse_structured("verdict", r#"{"is_pass": true}"#).unwrap();
        assert!(v.is_pass);
    }

    #[test]
    fn parse_fenced_json() {
        let v: Verdict = parse_structured("verdict", "```json\n{\"is_pass\": false}\n```").unwrap();
        assert!(!v.is_pass);
    }

    #[test]
    fn parse_json_inside_prose() {
        let v: Verdict =
            parse_structured("verdict", "Here you go: {\"is_pass\": true} hope it helps").unwrap();
        assert!(v.is_pass);
    }

    #[test]
    fn schema_violation_is_schema_error() {
        let err = parse_structured::<Verdict>("verdict", r#"{"pass": "yes"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Schema { ref schema, .. } if schema == "verdict"));
    }

    #[tokio::test]
    async fn structured_routes_role_and_records_usage() {
        let provider = Arc::new(Canned::new(r#"{"is_pass": true}"#));
        let client = LlmClient::new(provider.clone(), &config());
        let usage = UsageTracker::new();

        let v: Verdict = client
            .structured(
                ModelRole::Evaluate,
                "verdict",
                serde_json::json!({"type": "object"}),
                vec![Message::user("judge this")],
                &usage,
            )
            .await
            .unwrap();
        assert!(v.is_pass);
        assert_eq!(usage.total(), 10);

        let seen = provider.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.model, "judge");
        assert_eq!(seen.response_format.unwrap().name, "verdict");
    }

    #[tokio::test]
    async fn text_uses_default_model() {
        let provider = Arc::new(Canned::new("hello"));
        let client = LlmClient::new(provider.clone(), &config());
        let usage = UsageTracker::new();
        let out = client
            .text(ModelRole::Planner, "system", "user", &usage)
            .await
            .unwrap();
        assert_eq!(out, "hello");
        let seen = provider.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.model, "gpt-4o-mini");
        assert_eq!(seen.messages.len(), 2);
    }

    #[tokio::test]
    async fn embed_empty_input_skips_provider() {
        let client = LlmClient::new(Arc::new(Canned::new("")), &config());
        let usage = UsageTracker::new();
        assert!(client.embed(vec![], &usage).await.unwrap().is_empty());
        let out = client.embed(vec!["a".into(), "b".into()], &usage).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn from_config_requires_key() {
        let err = LlmClient::from_config(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}

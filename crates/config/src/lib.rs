//! Settings for a research run: model endpoints and per-role models,
//! search and crawl credentials, and the execution limits that bound the
//! task tree.
//!
//! Sources, later wins: built-in defaults, `~/.deepsearch/config.toml`,
//! then `DEEPSEARCH_*` / provider environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything read from `config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used by any role without its own setting
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// HTTP timeout for every outbound request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-role model settings
    #[serde(default)]
    pub models: ModelsConfig,

    /// Research limits
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Web search provider
    #[serde(default)]
    pub search: SearchConfig,

    /// Page crawler
    #[serde(default)]
    pub crawl: CrawlConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("models", &self.models)
            .field("execution", &self.execution)
            .field("search", &self.search)
            .field("crawl", &self.crawl)
            .finish()
    }
}

/// The distinct jobs the LLM is used for. Each can run on its own model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// Picks the next action of a task
    Planner,
    /// Rewrites raw search queries
    Rewrite,
    /// Summarizes fetched pages
    Summarize,
    /// Critiques the root answer
    Evaluate,
    /// Embeds queries and content windows
    Embedding,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Planner => "planner",
            ModelRole::Rewrite => "rewrite",
            ModelRole::Summarize => "summarize",
            ModelRole::Evaluate => "evaluate",
            ModelRole::Embedding => "embedding",
        }
    }
}

/// Optional overrides for one role. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub planner: ModelConfig,
    #[serde(default)]
    pub rewrite: ModelConfig,
    #[serde(default)]
    pub summarize: ModelConfig,
    #[serde(default)]
    pub evaluate: ModelConfig,
    #[serde(default = "default_embedding_model_config")]
    pub embedding: ModelConfig,
}

fn default_embedding_model_config() -> ModelConfig {
    ModelConfig {
        model: Some("text-embedding-3-small".into()),
        temperature: None,
        max_tokens: None,
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            planner: ModelConfig::default(),
            rewrite: ModelConfig::default(),
            summarize: ModelConfig::default(),
            evaluate: ModelConfig::default(),
            embedding: default_embedding_model_config(),
        }
    }
}

/// Fully resolved settings for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deepest level a task may sit at. Tasks at this level cannot spawn
    /// sub-tasks, so with the default of 3 the tree is at most 3 levels deep.
    #[serde(default = "default_max_task_depth")]
    pub max_task_depth: u32,

    /// Maximum sub-tasks per task
    #[serde(default = "default_max_tasks_count")]
    pub max_tasks_count: usize,

    /// Maximum actions per task loop
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Run-wide token ceiling
    #[serde(default = "default_max_token_usage")]
    pub max_token_usage: u64,

    /// Share of `max_token_usage` after which only answering is allowed
    #[serde(default = "default_token_usage_threshold")]
    pub token_usage_threshold: f64,

    /// Root answer critiques before the evaluator gives up and passes
    #[serde(default = "default_max_critical_attempts")]
    pub max_critical_attempts: u32,

    #[serde(default = "default_max_search_queries")]
    pub max_search_queries: usize,

    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    #[serde(default = "default_max_visit_urls")]
    pub max_visit_urls: usize,

    #[serde(default = "default_max_reflect_questions")]
    pub max_reflect_questions: usize,

    /// Character budget for page content handed to the summarizer
    #[serde(default = "default_content_max_length")]
    pub content_max_length: usize,

    /// Windows per selected span
    #[serde(default = "default_window_step")]
    pub window_step: usize,
}

fn default_max_task_depth() -> u32 {
    3
}
fn default_max_tasks_count() -> usize {
    3
}
fn default_max_turns() -> u32 {
    10
}
fn default_max_token_usage() -> u64 {
    500_000
}
fn default_token_usage_threshold() -> f64 {
    0.85
}
fn default_max_critical_attempts() -> u32 {
    2
}
fn default_max_search_queries() -> usize {
    3
}
fn default_max_search_results() -> usize {
    10
}
fn default_max_visit_urls() -> usize {
    5
}
fn default_max_reflect_questions() -> usize {
    3
}
fn default_content_max_length() -> usize {
    10_000
}
fn default_window_step() -> usize {
    5
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_task_depth: default_max_task_depth(),
            max_tasks_count: default_max_tasks_count(),
            max_turns: default_max_turns(),
            max_token_usage: default_max_token_usage(),
            token_usage_threshold: default_token_usage_threshold(),
            max_critical_attempts: default_max_critical_attempts(),
            max_search_queries: default_max_search_queries(),
            max_search_results: default_max_search_results(),
            max_visit_urls: default_max_visit_urls(),
            max_reflect_questions: default_max_reflect_questions(),
            content_max_length: default_content_max_length(),
            window_step: default_window_step(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// SerpAPI key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub base_url: String,

    #[serde(default = "default_search_engine")]
    pub engine: String,

    /// Interface language
    #[serde(default = "default_hl")]
    pub hl: String,

    /// Country
    #[serde(default = "default_gl")]
    pub gl: String,
}

fn default_search_url() -> String {
    "https://serpapi.com/search".into()
}
fn default_search_engine() -> String {
    "google".into()
}
fn default_hl() -> String {
    "en".into()
}
fn default_gl() -> String {
    "us".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_url(),
            engine: default_search_engine(),
            hl: default_hl(),
            gl: default_gl(),
        }
    }
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("engine", &self.engine)
            .field("hl", &self.hl)
            .field("gl", &self.gl)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Jina reader key; the reader also works without one at a lower rate limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_crawl_url")]
    pub base_url: String,
}

fn default_crawl_url() -> String {
    "https://r.jina.ai".into()
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_crawl_url(),
        }
    }
}

impl fmt::Debug for CrawlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deepsearch/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `DEEPSEARCH_API_KEY` (highest priority), `OPENAI_API_KEY` if no key is set
    /// - `OPENAI_BASE_URL`, `DEEPSEARCH_MODEL`
    /// - `SERPAPI_API_KEY`, `JINA_API_KEY`
    /// - `MAX_TASK_DEPTH`, `MAX_TURNS`, `MAX_TOKEN_USAGE`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("DEEPSEARCH_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = get("OPENAI_API_KEY");
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.api_url = url;
        }
        if let Some(model) = get("DEEPSEARCH_MODEL") {
            self.default_model = model;
        }
        if let Some(key) = get("SERPAPI_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(key) = get("JINA_API_KEY") {
            self.crawl.api_key = Some(key);
        }
        if let Some(v) = get("MAX_TASK_DEPTH") {
            self.execution.max_task_depth = parse_env("MAX_TASK_DEPTH", &v)?;
        }
        if let Some(v) = get("MAX_TURNS") {
            self.execution.max_turns = parse_env("MAX_TURNS", &v)?;
        }
        if let Some(v) = get("MAX_TOKEN_USAGE") {
            self.execution.max_token_usage = parse_env("MAX_TOKEN_USAGE", &v)?;
        }
        Ok(())
    }

    /// `~/.deepsearch`
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deepsearch")
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let temperatures = [
            Some(self.default_temperature),
            self.models.planner.temperature,
            self.models.rewrite.temperature,
            self.models.summarize.temperature,
            self.models.evaluate.temperature,
        ];
        if temperatures.into_iter().flatten().any(|t| !(0.0..=2.0).contains(&t)) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let exec = &self.execution;
        if exec.max_task_depth == 0 || exec.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "max_task_depth and max_turns must be at least 1".into(),
            ));
        }
        if exec.max_token_usage == 0 {
            return Err(ConfigError::ValidationError("max_token_usage must be > 0".into()));
        }
        if !(exec.token_usage_threshold > 0.0 && exec.token_usage_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "token_usage_threshold must be in (0.0, 1.0]".into(),
            ));
        }
        if exec.max_search_queries == 0 || exec.max_search_results == 0 || exec.max_visit_urls == 0 {
            return Err(ConfigError::ValidationError(
                "search and visit limits must be at least 1".into(),
            ));
        }
        if exec.window_step == 0 || exec.content_max_length < exec.window_step {
            return Err(ConfigError::ValidationError(
                "window_step must be >= 1 and content_max_length >= window_step".into(),
            ));
        }

        Ok(())
    }

    /// Names of the credentials a run cannot start without.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("DEEPSEARCH_API_KEY or OPENAI_API_KEY");
        }
        if self.search.api_key.is_none() {
            missing.push("SERPAPI_API_KEY");
        }
        missing
    }

    /// Fail if any required credential is absent.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        let missing = self.missing_credentials();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing.join(", ")))
        }
    }

    /// Resolve the model settings for `role`, falling back to the defaults.
    pub fn model_settings(&self, role: ModelRole) -> ModelSettings {
        let overrides = match role {
            ModelRole::Planner => &self.models.planner,
            ModelRole::Rewrite => &self.models.rewrite,
            ModelRole::Summarize => &self.models.summarize,
            ModelRole::Evaluate => &self.models.evaluate,
            ModelRole::Embedding => &self.models.embedding,
        };
        ModelSettings {
            model: overrides
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            temperature: overrides.temperature.unwrap_or(self.default_temperature),
            max_tokens: overrides.max_tokens.unwrap_or(self.default_max_tokens),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            models: ModelsConfig::default(),
            execution: ExecutionConfig::default(),
            search: SearchConfig::default(),
            crawl: CrawlConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

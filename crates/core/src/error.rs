//! Error types for the deepsearch domain.
//!
//! Each bounded context has its own `thiserror` enum. [`Error`] carries the
//! ones that can end a run: setup failures of a backend and task-tree
//! invariant violations. Action failures stay inside the planner loop.

use thiserror::Error;

/// The top-level error type for all deepsearch operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM / embedding errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Search provider errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Task tree invariant violations ---
    #[error("Task invariant violated: {0}")]
    Task(#[from] TaskError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The model answered, but the output does not match the requested schema.
    #[error("Response does not match schema '{schema}': {reason}")]
    Schema { schema: String, reason: String },

    #[error("Empty response from model {0}")]
    EmptyResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Search provider not configured: {0}")]
    NotConfigured(String),

    #[error("Search request failed for '{query}': {reason}")]
    RequestFailed { query: String, reason: String },

    #[error("Malformed search response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Failed to fetch {url}: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Malformed page response for {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),

    #[error("Action '{action}' is not available this turn")]
    NotAvailable { action: String },

    #[error("Invalid action arguments: {0}")]
    InvalidArguments(String),

    #[error("Action {action} failed: {reason}")]
    ExecutionFailed { action: String, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Violations of task-tree invariants. These indicate a scoping bug,
/// never a recoverable runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("no current task bound to scope (task id: {0})")]
    NoCurrentTask(String),

    #[error("task id collision: {0}")]
    TaskIdCollision(String),

    #[error("expected exactly one root task, found {found}")]
    MissingRoot { found: usize },
}

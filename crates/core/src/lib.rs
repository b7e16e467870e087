//! # deepsearch core
//!
//! Domain types, traits, and error definitions for the deepsearch research
//! agent. Collaborators (LLM, search, crawler) are defined as traits here;
//! implementations live in their respective crates.
//!
//! - Swapping implementations via configuration
//! - Testing the task engine with mock collaborators
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod search;
pub mod task;
pub mod context;
pub mod usage;
pub mod action;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ResponseFormat, ToolDefinition, Usage,
};
pub use search::{FetchedPage, Locale, PageFetcher, SearchProvider, SearchQuery, SearchResult};
pub use task::{Answer, Evaluation, Knowledge, Reference, Task, TaskId, ROOT_TASK_ID};
pub use context::{build_context, TaskContext, TaskScope};
pub use usage::{UsageSnapshot, UsageTracker};
pub use action::{Action, ActionCatalog, ActionKind, ActionOutcome, FollowUp};

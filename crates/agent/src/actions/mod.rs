//! The research actions offered to the planner.
//!
//! Each action holds the shared [`Services`] and works on the task bound
//! to the scope it is executed with.

pub mod answer;
pub mod reflect;
pub mod search;
pub mod visit;

pub use answer::AnswerAction;
pub use reflect::ReflectAction;
pub use search::SearchAction;
pub use visit::VisitAction;

use crate::services::Services;
use deepsearch_core::error::ActionError;
use deepsearch_core::{ActionCatalog, ActionKind};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// The four research actions wired to `services`.
pub fn default_catalog(services: Arc<Services>) -> ActionCatalog {
    let mut catalog = ActionCatalog::new();
    catalog.register(Arc::new(SearchAction::new(Arc::clone(&services))));
    catalog.register(Arc::new(VisitAction::new(Arc::clone(&services))));
    catalog.register(Arc::new(ReflectAction::new(Arc::clone(&services))));
    catalog.register(Arc::new(AnswerAction::new(services)));
    catalog
}

/// Decode tool-call arguments into the action's argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(
    kind: ActionKind,
    arguments: serde_json::Value,
) -> Result<T, ActionError> {
    serde_json::from_value(arguments)
        .map_err(|e| ActionError::InvalidArguments(format!("{kind}: {e}")))
}

/// Parse the raw JSON argument string of a tool call. An empty string is
/// an empty object; malformed JSON keeps the parser's message so the model
/// can correct itself.
pub(crate) fn decode_arguments(kind: ActionKind, raw: &str) -> Result<serde_json::Value, ActionError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
        .map_err(|e| ActionError::InvalidArguments(format!("{kind}: malformed JSON: {e}")))
}

/// Trim entries, drop blank ones and keep at most `limit`.
pub(crate) fn clean_list(items: Vec<String>, limit: usize) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(limit)
        .collect()
}

//! Actions: the research moves available to a task's agent.
//!
//! Each action (search, visit, reflect, answer) is offered to the model as
//! a function definition. The planner executes the one the model picks and
//! feeds the outcome back into the conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use crate::context::TaskScope;
use crate::error::ActionError;
use crate::provider::ToolDefinition;

/// The closed set of research actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Search,
    Visit,
    Reflect,
    Answer,
}

impl ActionKind {
    /// Every action in prompt order.
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Search,
        ActionKind::Visit,
        ActionKind::Reflect,
        ActionKind::Answer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Search => "search",
            ActionKind::Visit => "visit",
            ActionKind::Reflect => "reflect",
            ActionKind::Answer => "answer",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ActionError::NotFound(s.to_string()))
    }
}

/// What the planner must do after an action returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Run one child task per question, then report back
    SpawnSubTasks(Vec<String>),
    /// The task's answer passed evaluation
    Finished,
}

/// Result of executing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Text fed back to the model as the tool result
    pub output: String,
    pub follow_up: FollowUp,
}

impl ActionOutcome {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            follow_up: FollowUp::None,
        }
    }

    pub fn spawn(output: impl Into<String>, questions: Vec<String>) -> Self {
        Self {
            output: output.into(),
            follow_up: FollowUp::SpawnSubTasks(questions),
        }
    }

    pub fn finished(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            follow_up: FollowUp::Finished,
        }
    }
}

/// The core Action trait.
///
/// Actions never touch the turn counter; the planner owns it.
#[async_trait]
pub trait Action: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// One-line description sent with the function definition.
    fn description(&self) -> &str;

    /// Long-form guidance embedded in the system prompt.
    fn instructions(&self) -> &str;

    /// JSON Schema describing this action's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute against the task bound to `scope`.
    async fn execute(
        &self,
        scope: &TaskScope,
        arguments: serde_json::Value,
    ) -> std::result::Result<ActionOutcome, ActionError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.kind().as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The set of actions the planner can offer, kept in [`ActionKind::ALL`] order.
#[derive(Clone, Default)]
pub struct ActionCatalog {
    actions: Vec<Arc<dyn Action>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Replaces any existing action of the same kind.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.retain(|a| a.kind() != action.kind());
        self.actions.push(action);
        self.actions.sort_by_key(|a| a.kind());
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Arc<dyn Action>> {
        self.actions.iter().find(|a| a.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|a| a.kind()).collect()
    }

    /// The registered actions among `available`, in catalog order.
    pub fn select(&self, available: &[ActionKind]) -> Vec<Arc<dyn Action>> {
        self.actions
            .iter()
            .filter(|a| available.contains(&a.kind()))
            .cloned()
            .collect()
    }

    /// Function definitions for the actions among `available`.
    pub fn definitions(&self, available: &[ActionKind]) -> Vec<ToolDefinition> {
        self.select(available)
            .iter()
            .map(|a| a.to_definition())
            .collect()
    }
}

impl fmt::Debug for ActionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCatalog")
            .field("actions", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_context;

    struct EchoAnswer;

    #[async_trait]
    impl Action for EchoAnswer {
        fn kind(&self) -> ActionKind {
            ActionKind::Answer
        }
        fn description(&self) -> &str {
            "Echoes the answer back"
        }
        fn instructions(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "answer": { "type": "string" } },
                "required": ["answer"]
            })
        }
        async fn execute(
            &self,
            _scope: &TaskScope,
            arguments: serde_json::Value,
        ) -> Result<ActionOutcome, ActionError> {
            let text = arguments["answer"].as_str().unwrap_or("").to_string();
            Ok(ActionOutcome::finished(text))
        }
    }

    struct NoopSearch;

    #[async_trait]
    impl Action for NoopSearch {
        fn kind(&self) -> ActionKind {
            ActionKind::Search
        }
        fn description(&self) -> &str {
            "Does nothing"
        }
        fn instructions(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(
            &self,
            _scope: &TaskScope,
            _arguments: serde_json::Value,
        ) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::text("[]"))
        }
    }

    #[test]
    fn kind_parses_from_name() {
        assert_eq!("visit".parse::<ActionKind>().unwrap(), ActionKind::Visit);
        assert!(matches!(
            "shell".parse::<ActionKind>(),
            Err(ActionError::NotFound(_))
        ));
    }

    #[test]
    fn catalog_keeps_canonical_order() {
        let mut catalog = ActionCatalog::new();
        catalog.register(Arc::new(EchoAnswer));
        catalog.register(Arc::new(NoopSearch));
        assert_eq!(catalog.kinds(), vec![ActionKind::Search, ActionKind::Answer]);

        catalog.register(Arc::new(NoopSearch));
        assert_eq!(catalog.kinds().len(), 2);
    }

    #[test]
    fn definitions_follow_availability() {
        let mut catalog = ActionCatalog::new();
        catalog.register(Arc::new(EchoAnswer));
        catalog.register(Arc::new(NoopSearch));
        let defs = catalog.definitions(&[ActionKind::Answer]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "answer");
    }

    #[tokio::test]
    async fn execute_through_catalog() {
        let mut catalog = ActionCatalog::new();
        catalog.register(Arc::new(EchoAnswer));
        let scope = build_context("q");
        let action = catalog.get(ActionKind::Answer).unwrap();
        let outcome = action
            .execute(&scope, serde_json::json!({"answer": "42"}))
            .await
            .unwrap();
        assert_eq!(outcome.output, "42");
        assert_eq!(outcome.follow_up, FollowUp::Finished);
    }
}

//! `reflect`: split the question into sub-questions for child tasks.

use async_trait::async_trait;
use deepsearch_core::error::ActionError;
use deepsearch_core::{Action, ActionKind, ActionOutcome, TaskScope};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use super::{clean_list, parse_args};
use crate::services::Services;

pub const NO_NEW_TASKS: &str = "No new tasks generated.";

#[derive(Debug, Deserialize)]
struct ReflectArgs {
    #[serde(default)]
    think: String,
    #[serde(default)]
    questions: Vec<String>,
}

pub struct ReflectAction {
    services: Arc<Services>,
}

impl ReflectAction {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Action for ReflectAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Reflect
    }

    fn description(&self) -> &str {
        "Identify knowledge gaps and delegate clarifying sub-questions to new research tasks."
    }

    fn instructions(&self) -> &str {
        "- Only reflect once you have a basic understanding of the question, so the knowledge gaps are clear.\n\
         - Examine the question, the knowledge gathered and the conversation to find what is missing.\n\
         - Plan the key clarifying questions that lead to the answer. Each one is researched by a separate agent.\n\
         - Questions must be specific and self-contained, understandable and answerable without the others.\n\
         - At most 3 questions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "think": {
                    "type": "string",
                    "description": "The knowledge gaps and why these questions close them"
                },
                "questions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The most important questions to research, at most 3"
                }
            },
            "required": ["think", "questions"]
        })
    }

    async fn execute(
        &self,
        scope: &TaskScope,
        arguments: serde_json::Value,
    ) -> Result<ActionOutcome, ActionError> {
        let args: ReflectArgs = parse_args(self.kind(), arguments)?;
        let task = scope.current_task()?;
        let limits = &self.services.limits;
        let capacity = limits.max_tasks_count.saturating_sub(task.sub_task_count());
        let questions = clean_list(args.questions, limits.max_reflect_questions.min(capacity));

        info!(
            task_id = %task.id,
            questions = questions.len(),
            capacity,
            think = %args.think,
            "reflect planned"
        );
        if questions.is_empty() {
            return Ok(ActionOutcome::text(NO_NEW_TASKS));
        }
        let listed = questions
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ActionOutcome::spawn(
            format!("Delegated {} sub-question(s):\n{listed}", questions.len()),
            questions,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{CountingSearch, RoutingMockProvider, TablePageFetcher, test_config};
    use deepsearch_core::{build_context, FollowUp};
    use deepsearch_providers::LlmClient;

    fn action() -> (ReflectAction, Arc<RoutingMockProvider>) {
        let provider = Arc::new(RoutingMockProvider::unscripted());
        let config = test_config();
        let services = Services::new(
            LlmClient::new(provider.clone(), &config),
            Arc::new(CountingSearch::new()),
            Arc::new(TablePageFetcher::new()),
            config.execution.clone(),
        );
        (ReflectAction::new(Arc::new(services)), provider)
    }

    #[tokio::test]
    async fn questions_become_follow_up() {
        let (action, provider) = action();
        let scope = build_context("why is spx down?");
        let out = action
            .execute(
                &scope,
                serde_json::json!({
                    "think": "need macro context",
                    "questions": [" what did the fed say? ", "", "what tariffs were announced?", "x", "y"]
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            out.follow_up,
            FollowUp::SpawnSubTasks(vec![
                "what did the fed say?".into(),
                "what tariffs were announced?".into(),
                "x".into(),
            ])
        );
        assert_eq!(provider.call_count(), 0);
        // Spawning is the planner's job.
        assert_eq!(scope.current_task().unwrap().sub_task_count(), 0);
    }

    #[tokio::test]
    async fn capped_by_remaining_capacity() {
        let (action, _) = action();
        let scope = build_context("q");
        let root = scope.current_task().unwrap();
        scope.spawn_sub_task(&root, "a").unwrap();
        scope.spawn_sub_task(&root, "b").unwrap();

        let out = action
            .execute(&scope, serde_json::json!({"questions": ["c", "d"]}))
            .await
            .unwrap();
        assert_eq!(out.follow_up, FollowUp::SpawnSubTasks(vec!["c".into()]));
    }

    #[tokio::test]
    async fn empty_list_generates_nothing() {
        let (action, _) = action();
        let scope = build_context("q");
        let out = action
            .execute(&scope, serde_json::json!({"think": "", "questions": []}))
            .await
            .unwrap();
        assert_eq!(out.output, NO_NEW_TASKS);
        assert_eq!(out.follow_up, FollowUp::None);
    }

    #[tokio::test]
    async fn sentinel_string_is_rejected() {
        let (action, _) = action();
        let scope = build_context("q");
        let err = action
            .execute(&scope, serde_json::json!({"questions": "a|b"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments(_)));
    }
}

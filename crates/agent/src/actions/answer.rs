//! `answer`: submit an answer for evaluation.

use async_trait::async_trait;
use deepsearch_core::error::ActionError;
use deepsearch_core::{Action, ActionKind, ActionOutcome, Answer, Reference, TaskScope};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use super::parse_args;
use crate::evaluator::evaluate_answer;
use crate::services::Services;

pub const COMPLETED: &str = "You have provided a final verified answer with references. \
The task is complete and the conversation ends here.";

#[derive(Debug, Deserialize)]
struct ReferenceArg {
    #[serde(default, alias = "exactQuote")]
    exact_quote: Option<String>,
    url: String,
    #[serde(default)]
    datetime: Option<String>,
}

impl From<ReferenceArg> for Reference {
    fn from(r: ReferenceArg) -> Self {
        Reference {
            url: r.url,
            title: None,
            datetime: r.datetime.filter(|d| !d.trim().is_empty()),
            exact_quote: r.exact_quote.filter(|q| !q.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnswerArgs {
    #[serde(default)]
    think: String,
    answer: String,
    #[serde(default)]
    references: Vec<ReferenceArg>,
}

pub struct AnswerAction {
    services: Arc<Services>,
}

impl AnswerAction {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Action for AnswerAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Answer
    }

    fn description(&self) -> &str {
        "Provide a final, verified answer with references."
    }

    fn instructions(&self) -> &str {
        "- For greetings, casual conversation and general knowledge, answer directly without references.\n\
         - For everything else, give a verified answer with references. Each reference carries an exact quote, \
         the URL and a date.\n\
         - Give deep, insightful analysis that connects the evidence.\n\
         - Only answer definitively with enough information. Otherwise reflect or keep researching."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "think": {
                    "type": "string",
                    "description": "A very concise explanation of why you are ready to answer"
                },
                "answer": {
                    "type": "string",
                    "description": "The full answer drawing on all gathered knowledge. Definitive, without \
                                    disclaimers or placeholders. Cite references with markdown footnotes like [^1]."
                },
                "references": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "exact_quote": { "type": "string" },
                            "url": { "type": "string" },
                            "datetime": { "type": "string" }
                        },
                        "required": ["exact_quote", "url", "datetime"]
                    }
                }
            },
            "required": ["think", "answer", "references"]
        })
    }

    async fn execute(
        &self,
        scope: &TaskScope,
        arguments: serde_json::Value,
    ) -> Result<ActionOutcome, ActionError> {
        let args: AnswerArgs = parse_args(self.kind(), arguments)?;
        let task = scope.current_task()?;
        let references: Vec<Reference> = args.references.into_iter().map(Reference::from).collect();

        let evaluation = evaluate_answer(
            &self.services.llm,
            &self.services.limits,
            &task,
            &args.answer,
            &references,
            scope.context().usage(),
        )
        .await?;

        let passed = evaluation.is_pass;
        let output = if passed {
            COMPLETED.to_string()
        } else {
            format!(
                "Your draft answer is not good enough yet.\n\
                 Critic: {}\n\
                 Improvement:\n{}\n\n\
                 Take the improvement into account and act accordingly.",
                evaluation.critic, evaluation.improvement
            )
        };
        info!(
            task_id = %task.id,
            attempt = task.attempt(),
            passed,
            references = references.len(),
            think = %args.think,
            "answer submitted"
        );
        task.set_answer(Answer {
            answer: args.answer,
            references,
            evaluation: Some(evaluation),
        });

        if passed {
            Ok(ActionOutcome::finished(output))
        } else {
            Ok(ActionOutcome::text(output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        CountingSearch, RoutingMockProvider, TablePageFetcher, make_json_response, test_config,
    };
    use deepsearch_core::{build_context, FollowUp};
    use deepsearch_providers::LlmClient;

    fn action(verdict: serde_json::Value) -> AnswerAction {
        let provider = RoutingMockProvider::new(move |_| Ok(make_json_response(verdict.clone())));
        let config = test_config();
        let services = Services::new(
            LlmClient::new(Arc::new(provider), &config),
            Arc::new(CountingSearch::new()),
            Arc::new(TablePageFetcher::new()),
            config.execution.clone(),
        );
        AnswerAction::new(Arc::new(services))
    }

    fn args() -> serde_json::Value {
        serde_json::json!({
            "think": "enough evidence",
            "answer": "Tariffs triggered the selloff [^1].",
            "references": [{
                "exactQuote": "stocks tumbled after the tariff announcement",
                "url": "https://news.example/spx",
                "datetime": "2025-04-04"
            }]
        })
    }

    #[tokio::test]
    async fn passing_answer_finishes_task() {
        let action = action(serde_json::json!({"is_pass": true, "critic": "", "improvement": "", "reason": "solid"}));
        let scope = build_context("why is spx down?");
        let out = action.execute(&scope, args()).await.unwrap();
        assert_eq!(out.follow_up, FollowUp::Finished);

        let task = scope.current_task().unwrap();
        assert!(task.is_solved());
        let answer = task.answer().unwrap();
        assert_eq!(answer.references.len(), 1);
        assert_eq!(
            answer.references[0].exact_quote.as_deref(),
            Some("stocks tumbled after the tariff announcement")
        );
    }

    #[tokio::test]
    async fn failing_answer_returns_feedback() {
        let action = action(serde_json::json!({
            "is_pass": false,
            "critic": "No index levels.",
            "improvement": "For the best answer, you must quote the index drop.",
            "reason": "vague"
        }));
        let scope = build_context("why is spx down?");
        let out = action.execute(&scope, args()).await.unwrap();
        assert_eq!(out.follow_up, FollowUp::None);
        assert!(out.output.contains("No index levels."));
        assert!(out.output.contains("For the best answer, you must quote the index drop."));

        let task = scope.current_task().unwrap();
        assert!(!task.is_solved());
        assert!(task.answer().is_some());
    }

    #[tokio::test]
    async fn evaluator_schema_failure_fails_action() {
        let action = action(serde_json::json!({"verdict": "fine"}));
        let scope = build_context("q");
        let err = action.execute(&scope, args()).await.unwrap_err();
        assert!(matches!(err, ActionError::Provider(_)));
        let task = scope.current_task().unwrap();
        assert_eq!(task.attempt(), 1);
        assert!(task.answer().is_none());
    }
}

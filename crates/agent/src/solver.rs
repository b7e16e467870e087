//! Top-level driver for one query.

use deepsearch_config::ModelRole;
use deepsearch_core::{build_context, Answer, Result, Task, TaskScope, UsageSnapshot};
use std::sync::Arc;
use tracing::{info, warn};
use crate::planner::{Planner, TaskOutcome};
use crate::prompt::build_close_out_prompt;
use crate::services::Services;

/// What a run produced.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub query: String,
    /// The root task's answer, verified or best-effort
    pub answer: Option<Answer>,
    /// The answer passed evaluation
    pub verified: bool,
    pub outcome: TaskOutcome,
    pub usage: UsageSnapshot,
    /// Number of tasks in the tree
    pub tasks: usize,
}

pub struct TaskSolver {
    planner: Arc<Planner>,
}

impl TaskSolver {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            planner: Arc::new(Planner::new(services)),
        }
    }

    pub fn with_planner(planner: Arc<Planner>) -> Self {
        Self { planner }
    }

    /// Research `query` and return the best answer found.
    ///
    /// When the root loop ends without an answer, one is synthesized from
    /// the gathered knowledge and stored unverified. A task-tree invariant
    /// violation aborts the run with `Error::Task` and nothing is synthesized.
    pub async fn solve(&self, query: &str) -> Result<SolveReport> {
        let scope = build_context(query);
        let run_id = scope.context().run_id();
        info!(%run_id, query, "research started");
        let outcome = self.planner.run_task(scope.clone()).await?;

        let context = scope.context();
        let root = context.root()?;
        if root.answer().is_none() {
            self.close_out(&scope, &root).await;
        }

        let answer = context.final_answer()?;
        let verified = answer.as_ref().is_some_and(Answer::is_pass);
        let usage = context.usage().snapshot();
        info!(
            %run_id,
            ?outcome,
            verified,
            tasks = context.len(),
            tokens = usage.total_tokens,
            calls = usage.calls,
            "research finished"
        );
        Ok(SolveReport {
            query: query.to_string(),
            answer,
            verified,
            outcome,
            usage,
            tasks: context.len(),
        })
    }

    async fn close_out(&self, scope: &TaskScope, root: &Arc<Task>) {
        let system = build_close_out_prompt(
            &root.query,
            &root.knowledges(),
            &root.descendant_answers(),
            scope.context().start_date_time(),
        );
        match self
            .planner
            .services()
            .llm
            .text(ModelRole::Planner, &system, &root.query, scope.context().usage())
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                info!("best-effort answer synthesized");
                let references = root.knowledges().into_iter().map(|k| k.reference).collect();
                root.set_answer(Answer {
                    answer: text,
                    references,
                    evaluation: None,
                });
            }
            Ok(_) => warn!("close-out produced an empty answer"),
            Err(e) => warn!(error = %e, "close-out failed, no answer produced"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        CountingSearch, RoutingMockProvider, TablePageFetcher, make_text_response, test_config,
    };
    use async_trait::async_trait;
    use deepsearch_core::error::{ActionError, TaskError};
    use deepsearch_core::{Action, ActionKind, ActionOutcome, Error};
    use deepsearch_providers::LlmClient;
    use crate::actions::default_catalog;
    use crate::test_helpers::call;

    fn solver(provider: Arc<RoutingMockProvider>, max_turns: u32) -> TaskSolver {
        let mut config = test_config();
        config.execution.max_turns = max_turns;
        let services = Services::new(
            LlmClient::new(provider, &config),
            Arc::new(CountingSearch::new()),
            Arc::new(TablePageFetcher::new()),
            config.execution.clone(),
        );
        TaskSolver::new(Arc::new(services))
    }

    #[tokio::test]
    async fn exhausted_run_gets_best_effort_answer() {
        let provider = Arc::new(RoutingMockProvider::new(|req| {
            if req.tools.is_empty() {
                Ok(make_text_response("Probably tariffs."))
            } else {
                Ok(make_text_response("still thinking"))
            }
        }));
        let report = solver(provider.clone(), 2).solve("why is spx down?").await.unwrap();

        assert_eq!(report.outcome, TaskOutcome::Exhausted);
        assert!(!report.verified);
        assert_eq!(report.answer.unwrap().answer, "Probably tariffs.");
        assert_eq!(report.tasks, 1);
        // Two planner turns plus the close-out.
        assert_eq!(provider.call_count(), 3);
        assert_eq!(report.usage.calls, 3);
    }

    #[tokio::test]
    async fn failed_close_out_leaves_no_answer() {
        let provider = Arc::new(RoutingMockProvider::unscripted());
        let report = solver(provider, 2).solve("q").await.unwrap();
        assert!(matches!(report.outcome, TaskOutcome::Failed(_)));
        assert!(report.answer.is_none());
        assert!(!report.verified);
    }

    /// A reflect whose scope no longer resolves.
    struct DetachedReflect;

    #[async_trait]
    impl Action for DetachedReflect {
        fn kind(&self) -> ActionKind {
            ActionKind::Reflect
        }
        fn description(&self) -> &str {
            "detached"
        }
        fn instructions(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            scope: &TaskScope,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ActionOutcome, ActionError> {
            scope.rebind("1_9").current_task()?;
            Ok(ActionOutcome::text("unreachable"))
        }
    }

    #[tokio::test]
    async fn invariant_violation_aborts_without_close_out() {
        let provider = Arc::new(RoutingMockProvider::new(|req| {
            if req.tools.is_empty() {
                Ok(make_text_response("should not be synthesized"))
            } else {
                Ok(call("reflect", serde_json::json!({"think": "", "questions": ["a"]})))
            }
        }));
        let config = test_config();
        let services = Arc::new(Services::new(
            LlmClient::new(provider.clone(), &config),
            Arc::new(CountingSearch::new()),
            Arc::new(TablePageFetcher::new()),
            config.execution.clone(),
        ));
        let mut catalog = default_catalog(Arc::clone(&services));
        catalog.register(Arc::new(DetachedReflect));
        let solver = TaskSolver::with_planner(Arc::new(Planner::with_catalog(services, catalog)));

        let err = solver.solve("why is spx down?").await.unwrap_err();
        assert!(matches!(err, Error::Task(TaskError::NoCurrentTask(ref id)) if id == "1_9"));
        // One planner turn, no close-out completion.
        assert_eq!(provider.call_count(), 1);
    }
}

//! The per-task research loop.
//!
//! Each turn the planner rebuilds the set of available actions, renders the
//! system prompt, asks the model for one action and executes it. A `reflect`
//! spawns child tasks which run the same loop, concurrently, on their own
//! scopes; the parent resumes once all of them are joined.
//!
//! ```text
//! gate ──► prompt ──► model ──► execute ──┬──► answer passed ──► Solved
//!  ▲                                      ├──► reflect ──► run children ──┐
//!  └──────────────────────────────────────┴───────────────────────────────┘
//! ```

use deepsearch_config::ModelRole;
use deepsearch_core::error::{ActionError, TaskError};
use deepsearch_core::message::{Message, MessageToolCall};
use deepsearch_core::{ActionCatalog, ActionKind, ActionOutcome, FollowUp, Task, TaskScope};
use futures::FutureExt;
use futures::future::{join_all, BoxFuture};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use crate::actions::{decode_arguments, default_catalog};
use crate::gating::{available_actions, GatingLimits, GatingState};
use crate::prompt::{build_system_prompt, PromptInput, NUDGE, SKIPPED};
use crate::services::Services;

/// How a task loop ended. Task-tree invariant violations are not an
/// outcome: `run_task` returns them as `Err` and they abort the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// An answer passed evaluation
    Solved,
    /// The turn limit was reached without a passing answer
    Exhausted,
    /// The planner model call failed
    Failed(String),
}

/// Result of handling one tool call.
enum Step {
    Continue(String),
    Finished(String),
    Abort(TaskError),
}

pub struct Planner {
    services: Arc<Services>,
    catalog: ActionCatalog,
}

impl Planner {
    /// A planner offering the four research actions.
    pub fn new(services: Arc<Services>) -> Self {
        let catalog = default_catalog(Arc::clone(&services));
        Self { services, catalog }
    }

    pub fn with_catalog(services: Arc<Services>, catalog: ActionCatalog) -> Self {
        Self { services, catalog }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Run the loop for the task bound to `scope` until it is solved,
    /// exhausted or fails. A violated task-tree invariant anywhere below
    /// this task is returned as `Err`.
    pub fn run_task(
        self: &Arc<Self>,
        scope: TaskScope,
    ) -> BoxFuture<'static, Result<TaskOutcome, TaskError>> {
        let planner = Arc::clone(self);
        let level = scope
            .context()
            .get(scope.task_id())
            .map(|t| t.level)
            .unwrap_or_default();
        let span = info_span!("task", id = %scope.task_id(), level);
        async move { planner.task_loop(scope).await }
            .instrument(span)
            .boxed()
    }

    async fn task_loop(self: Arc<Self>, scope: TaskScope) -> Result<TaskOutcome, TaskError> {
        let task = scope.current_task()?;
        let limits = GatingLimits::from(&self.services.limits);
        let kinds = self.catalog.kinds();
        let mut conversation = vec![Message::user(task.query.clone())];
        let mut last_used = None;

        info!(query = %task.query, "task started");
        for turn_index in 0..limits.max_turns {
            let state = GatingState {
                level: task.level,
                sub_task_count: task.sub_task_count(),
                last_used,
                turn_index,
                usage_exceeded: self.usage_exceeded(&scope),
            };
            let available = available_actions(&kinds, &state, &limits);
            let actions = self.catalog.select(&available);
            let knowledge = task.knowledges();
            let system = build_system_prompt(&PromptInput {
                query: &task.query,
                origin_query: &task.origin_query,
                actions: &actions,
                knowledge: &knowledge,
                start_date_time: scope.context().start_date_time(),
                close_out: state.must_answer(&limits),
            });
            let tools = actions.iter().map(|a| a.to_definition()).collect();

            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(Message::system(system));
            messages.extend(conversation.iter().cloned());

            let response = match self
                .services
                .llm
                .chat(ModelRole::Planner, messages, tools, scope.context().usage())
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, turn_index, "planner call failed");
                    return Ok(TaskOutcome::Failed(e.to_string()));
                }
            };

            let calls = response.message.tool_calls.clone();
            conversation.push(response.message);
            let Some((first, extra)) = calls.split_first() else {
                debug!(turn_index, "no action chosen, nudging");
                conversation.push(Message::user(NUDGE));
                continue;
            };

            let step = self
                .handle_call(&scope, &task, first, &available, &mut last_used)
                .await;
            let finished = match step {
                Step::Continue(output) => {
                    conversation.push(Message::tool_result(&first.id, output));
                    false
                }
                Step::Finished(output) => {
                    conversation.push(Message::tool_result(&first.id, output));
                    true
                }
                Step::Abort(e) => {
                    error!(error = %e, "task invariant violated");
                    return Err(e);
                }
            };
            for call in extra {
                debug!(action = %call.name, "extra action skipped");
                conversation.push(Message::tool_result(&call.id, SKIPPED));
            }
            if finished {
                info!(turns = task.turn(), "task solved");
                return Ok(TaskOutcome::Solved);
            }
        }

        warn!(turns = task.turn(), max_turns = limits.max_turns, "turn limit reached");
        Ok(TaskOutcome::Exhausted)
    }

    fn usage_exceeded(&self, scope: &TaskScope) -> bool {
        let limits = &self.services.limits;
        scope
            .context()
            .usage()
            .exceeds(limits.max_token_usage, limits.token_usage_threshold)
    }

    /// Execute one tool call if it names an available action.
    async fn handle_call(
        self: &Arc<Self>,
        scope: &TaskScope,
        task: &Arc<Task>,
        call: &MessageToolCall,
        available: &[ActionKind],
        last_used: &mut Option<ActionKind>,
    ) -> Step {
        let kind = match call.name.parse::<ActionKind>() {
            Ok(kind) if available.contains(&kind) => kind,
            _ => {
                warn!(action = %call.name, "model chose an unavailable action");
                let names = available.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
                return Step::Continue(format!(
                    "Error: {}. Choose one of: {names}.",
                    ActionError::NotAvailable {
                        action: call.name.clone()
                    }
                ));
            }
        };
        let Some(action) = self.catalog.get(kind).cloned() else {
            return Step::Continue(format!("Error: {}", ActionError::NotFound(call.name.clone())));
        };

        let arguments = decode_arguments(kind, &call.arguments);
        let think = arguments
            .as_ref()
            .ok()
            .and_then(|args| args["think"].as_str())
            .unwrap_or_default()
            .to_string();
        let turn = task.bump_turn();
        *last_used = Some(kind);

        let usage = scope.context().usage();
        info!(
            task_id = %task.id,
            turn,
            tokens = usage.total(),
            percent = format!("{:.1}", usage.percent_of(self.services.limits.max_token_usage)),
            action = %kind,
            think = %think,
            "action"
        );

        let executed = match arguments {
            Ok(arguments) => action.execute(scope, arguments).await,
            Err(e) => Err(e),
        };
        let outcome = match executed {
            Ok(outcome) => outcome,
            Err(ActionError::Task(e)) => return Step::Abort(e),
            Err(e) => {
                warn!(action = %kind, error = %e, "action failed");
                ActionOutcome::text(format!("Error: {e}"))
            }
        };

        match outcome.follow_up {
            FollowUp::None => Step::Continue(outcome.output),
            FollowUp::Finished => Step::Finished(outcome.output),
            FollowUp::SpawnSubTasks(questions) => match self.run_sub_tasks(scope, task, questions).await {
                Ok(digest) => Step::Continue(digest),
                Err(e) => Step::Abort(e),
            },
        }
    }

    /// Spawn one child per question, run them concurrently and report what
    /// each one found. A panicking child is reported as having found
    /// nothing; an invariant violation in any child is returned once all
    /// siblings are joined.
    async fn run_sub_tasks(
        self: &Arc<Self>,
        scope: &TaskScope,
        parent: &Arc<Task>,
        questions: Vec<String>,
    ) -> Result<String, TaskError> {
        let mut children = Vec::with_capacity(questions.len());
        for question in questions {
            children.push(scope.spawn_sub_task(parent, question)?);
        }
        info!(count = children.len(), "running sub-tasks");

        let runs = children
            .iter()
            .map(|child| AssertUnwindSafe(self.run_task(child.clone())).catch_unwind());
        let results = join_all(runs).await;

        let mut digest = Vec::with_capacity(children.len());
        for (child, result) in children.iter().zip(results) {
            let task = child.current_task()?;
            match result {
                Ok(Ok(outcome)) => debug!(task_id = %task.id, ?outcome, "sub-task finished"),
                Ok(Err(e)) => return Err(e),
                Err(_) => error!(task_id = %task.id, "sub-task panicked"),
            }
            digest.push(match task.answer() {
                Some(answer) => format!(
                    "For Question: {}\nYou did some research. Here is the answer: {}",
                    task.query, answer.answer
                ),
                None => format!(
                    "For Question: {}\nYou did some research on it, but could not find information for it.",
                    task.query
                ),
            });
        }
        Ok(digest.join("\n\n"))
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("services", &self.services)
            .field("catalog", &self.catalog)
            .finish()
    }
}

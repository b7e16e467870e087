//! Adversarial answer evaluation.
//!
//! Only the root task's answers are critiqued; sub-task answers feed the
//! root's research and pass as-is. Every call counts as an attempt, and once
//! a task has used up `max_critical_attempts` its answers pass unchallenged.

use deepsearch_config::{ExecutionConfig, ModelRole};
use deepsearch_core::error::ProviderError;
use deepsearch_core::message::Message;
use deepsearch_core::usage::UsageTracker;
use deepsearch_core::{Evaluation, Reference, Task};
use deepsearch_providers::LlmClient;
use std::fmt::Write;
use tracing::{debug, info};
use crate::prompt::{format_knowledge, format_sub_answers};

pub const SCHEMA_NAME: &str = "evaluation";

const SYSTEM: &str = "You are a ruthless answer evaluator trained to REJECT answers.\n\
Given a question and an answer, find ANY weakness in the answer.\n\n\
-Rules-\n\
1. Apply extremely strict standards of evidence.\n\
2. Identify EVERY missing detail.\n\
3. First, argue AGAINST the answer with the strongest possible case.\n\
4. Then, argue FOR the answer.\n\
5. Only after weighing both, write an improvement plan that starts with \
\"For the best answer, you must...\".\n\n\
The user also lists the knowledge used to write the answer. Some of it may not \
be directly related to the question.";

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "is_pass": { "type": "boolean" },
            "critic": { "type": "string", "description": "The case against and for the answer" },
            "improvement": { "type": "string", "description": "Starts with \"For the best answer, you must...\"" },
            "reason": { "type": "string" }
        },
        "required": ["is_pass", "critic", "improvement", "reason"]
    })
}

/// Knowledge of `task` plus every answer its sub-tree has produced.
fn knowledge_context(task: &Task) -> String {
    let mut out = format_knowledge(&task.knowledges());
    let sub_answers = task.descendant_answers();
    if !sub_answers.is_empty() {
        out.push_str(
            "\nTo dig deeper and give a more comprehensive answer, \
             I researched these aspects:\n\n",
        );
        out.push_str(&format_sub_answers(&sub_answers));
    }
    out
}

fn format_references(references: &[Reference]) -> String {
    let mut out = String::new();
    for (i, r) in references.iter().enumerate() {
        let _ = write!(out, "[^{}] {}", i + 1, r.url);
        if let Some(datetime) = &r.datetime {
            let _ = write!(out, " ({datetime})");
        }
        if let Some(quote) = &r.exact_quote {
            let _ = write!(out, ": \"{quote}\"");
        }
        out.push('\n');
    }
    out
}

/// Judge `answer` for `task`, bumping its attempt counter first.
pub async fn evaluate_answer(
    llm: &LlmClient,
    limits: &ExecutionConfig,
    task: &Task,
    answer: &str,
    references: &[Reference],
    usage: &UsageTracker,
) -> Result<Evaluation, ProviderError> {
    let attempt = task.bump_attempt();
    if !task.is_root() {
        debug!(task_id = %task.id, "sub-task answer accepted without critique");
        return Ok(Evaluation::auto_pass("sub-task answers are not critiqued"));
    }
    if attempt > limits.max_critical_attempts {
        info!(task_id = %task.id, attempt, "critique attempts used up, accepting answer");
        return Ok(Evaluation::auto_pass("critique attempts used up"));
    }

    let user = format!(
        "The question is: {question}\n\n\
         Here is what I found to answer it:\n{knowledge}\n\
         Here is my answer:\n{answer}\n\n\
         Here are the references I used:\n{references}",
        question = task.query,
        knowledge = knowledge_context(task),
        references = format_references(references),
    );
    let evaluation: Evaluation = llm
        .structured(
            ModelRole::Evaluate,
            SCHEMA_NAME,
            schema(),
            vec![Message::system(SYSTEM), Message::user(user)],
            usage,
        )
        .await?;
    info!(task_id = %task.id, attempt, is_pass = evaluation.is_pass, "answer evaluated");
    Ok(evaluation)
}

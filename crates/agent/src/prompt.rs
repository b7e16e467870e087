//! System prompt construction for the planner.
//!
//! Everything here is a pure function of its inputs so prompts can be
//! asserted on directly in tests.

use chrono::{DateTime, Utc};
use deepsearch_core::{Action, Answer, Knowledge};
use std::fmt::Write;
use std::sync::Arc;

/// What the planner shows the model about the task it is working on.
pub struct PromptInput<'a> {
    pub query: &'a str,
    pub origin_query: &'a str,
    pub actions: &'a [Arc<dyn Action>],
    pub knowledge: &'a [Knowledge],
    pub start_date_time: DateTime<Utc>,
    /// Switch to the best-effort close-out wording
    pub close_out: bool,
}

/// Sent after a reply that picked no action.
pub const NUDGE: &str =
    "You did not choose an action. Pick exactly one of the available actions and call it.";

/// Tool result for extra calls in a single reply.
pub const SKIPPED: &str =
    "Skipped: only one action is executed per turn. Call it again next turn if still needed.";

fn question_block(query: &str, origin_query: &str) -> String {
    if query == origin_query {
        format!("The question you are trying to answer is: {query}")
    } else {
        format!(
            "The original question is: {origin_query}\n\
             You are currently focusing on one aspect of it.\n\
             The question you are trying to answer is: {query}"
        )
    }
}

/// Numbered list of what has been learned so far, one entry per source.
pub fn format_knowledge(knowledge: &[Knowledge]) -> String {
    let mut out = String::new();
    for (i, k) in knowledge.iter().enumerate() {
        let _ = writeln!(out, "{}. Source: {}", i + 1, k.reference.url);
        if let Some(title) = &k.reference.title {
            let _ = writeln!(out, "   Title: {title}");
        }
        if let Some(datetime) = &k.reference.datetime {
            let _ = writeln!(out, "   Date: {datetime}");
        }
        let _ = writeln!(out, "   Summary: {}", k.summary);
        for quote in &k.quotes {
            let _ = writeln!(out, "   > {quote}");
        }
    }
    out
}

/// Answers found by sub-tasks, as (question, answer) pairs.
pub fn format_sub_answers(answers: &[(String, Answer)]) -> String {
    let mut out = String::new();
    for (query, answer) in answers {
        let _ = writeln!(out, "Question: {query}\nAnswer: {}\n", answer.answer);
    }
    out
}

pub fn build_system_prompt(input: &PromptInput<'_>) -> String {
    let date = input.start_date_time.format("%Y-%m-%d %H:%M UTC");

    if input.close_out {
        let mut prompt =
            build_close_out_prompt(input.query, input.knowledge, &[], input.start_date_time);
        prompt.push_str("Submit it with the `answer` action.\n");
        return prompt;
    }

    let action_names = input
        .actions
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a.kind()))
        .collect::<Vec<_>>()
        .join("\n");

    let action_details = input
        .actions
        .iter()
        .map(|a| format!("<action-{name}>\n{}\n</action-{name}>", a.instructions().trim(), name = a.kind()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!(
        "Current date: {date}\n\n\
         You are an advanced research agent specialized in multistep reasoning.\n\
         Using your best knowledge, the conversation so far and the lessons learned, \
         answer the question with certainty.\n\n\
         -Goal-\n\n\
         Given a question in any domain, do research to find the answer. \
         Provide a detailed, comprehensive and factually accurate answer.\n\n\
         -Rules-\n\n\
         1. Think step by step and choose the action carefully.\n\
         2. Always put your reasoning in the `think` argument before acting: \
         reflect on what you already know, then explain your next move.\n\
         3. Do not rush to answer. Examine the question and the evidence first.\n\
         4. The conversation does not end until the answer is verified.\n\n\
         -Question-\n{question}\n\n",
        question = question_block(input.query, input.origin_query),
    );

    if !input.knowledge.is_empty() {
        let _ = write!(
            prompt,
            "-Knowledge gathered so far-\n\n{}\n",
            format_knowledge(input.knowledge)
        );
    }

    let _ = write!(
        prompt,
        "-Available actions-\n\n\
         You can only choose one of these actions. Do not use any action not listed here:\n\n\
         {action_names}\n\n\
         -Action details-\n\n\
         {action_details}\n\n\
         Think step by step and choose the action carefully.\n"
    );

    prompt
}

/// Wording used when the run must stop researching and answer with what it has.
pub fn build_close_out_prompt(
    query: &str,
    knowledge: &[Knowledge],
    sub_answers: &[(String, Answer)],
    start_date_time: DateTime<Utc>,
) -> String {
    let date = start_date_time.format("%Y-%m-%d %H:%M UTC");
    let mut prompt = format!(
        "Current date: {date}\n\n\
         You are an advanced research agent specialized in multistep reasoning.\n\n\
         -Question-\n{query}\n\n\
         -Goals-\n\
         - Do not hesitate, answer now.\n\
         - Partial answers are fine, but they must be well-informed.\n\
         - Use the earlier conversation and the background below.\n\
         - When unsure, base your answer on what is known so far.\n\n"
    );
    if !knowledge.is_empty() {
        let _ = write!(prompt, "-Background-\n\n{}\n", format_knowledge(knowledge));
    }
    if !sub_answers.is_empty() {
        let _ = write!(
            prompt,
            "-Findings on related questions-\n\n{}\n",
            format_sub_answers(sub_answers)
        );
    }
    prompt.push_str("Based on the background information, make your best attempt at answering the question.\n");
    prompt
}

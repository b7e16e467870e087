//! Task tree domain types.
//!
//! A [`Task`] is one unit of research: a question, the knowledge gathered
//! for it, the sub-tasks it spawned and, eventually, an evaluated answer.
//! Tasks are shared behind `Arc`; a child holds only a weak pointer back
//! to its parent so the tree never forms an ownership cycle.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Task identifier. The root is `"1"`, children are `"{parent}_{n}"`.
pub type TaskId = String;

/// Id given to the root task of every run.
pub const ROOT_TASK_ID: &str = "1";

/// Where a piece of information came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_quote: Option<String>,
}

impl Reference {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// One fact extracted from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knowledge {
    pub reference: Reference,
    pub summary: String,
    #[serde(default)]
    pub quotes: Vec<String>,
}

/// Verdict of the answer evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_pass: bool,
    #[serde(default)]
    pub critic: String,
    #[serde(default)]
    pub improvement: String,
    #[serde(default)]
    pub reason: String,
}

impl Evaluation {
    /// A pass issued without consulting the model.
    pub fn auto_pass(reason: impl Into<String>) -> Self {
        Self {
            is_pass: true,
            critic: String::new(),
            improvement: String::new(),
            reason: reason.into(),
        }
    }
}

/// A proposed answer to a task's question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
}

impl Answer {
    pub fn is_pass(&self) -> bool {
        self.evaluation.as_ref().is_some_and(|e| e.is_pass)
    }
}

/// Mutable part of a task, guarded by the task's mutex.
#[derive(Debug, Default)]
pub struct TaskState {
    /// Actions taken in this task's loop
    pub turn: u32,
    /// Answer evaluations attempted
    pub attempt: u32,
    /// Children in spawn order
    pub sub_tasks: Vec<Arc<Task>>,
    /// Knowledge in discovery order
    pub knowledges: Vec<Knowledge>,
    pub answer: Option<Answer>,
    pub query_embedding: Option<Vec<f32>>,
}

/// One node of the research tree.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    pub origin_query: String,
    pub query: String,
    /// Depth in the tree, root = 1
    pub level: u32,
    parent: Option<Weak<Task>>,
    state: Mutex<TaskState>,
}

impl Task {
    /// Create the root of a new tree.
    pub fn root(query: impl Into<String>) -> Arc<Self> {
        let query = query.into();
        Arc::new(Self {
            id: ROOT_TASK_ID.to_string(),
            origin_query: query.clone(),
            query,
            level: 1,
            parent: None,
            state: Mutex::new(TaskState::default()),
        })
    }

    /// Create a child one level below `parent`. Registration is the
    /// caller's job, see `TaskScope::spawn_sub_task`.
    pub fn child(parent: &Arc<Task>, id: TaskId, query: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            origin_query: parent.origin_query.clone(),
            query: query.into(),
            level: parent.level + 1,
            parent: Some(Arc::downgrade(parent)),
            state: Mutex::new(TaskState::default()),
        })
    }

    /// Structural root check: only the task built by [`Task::root`] has no parent link.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<Arc<Task>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Lock the mutable state. A poisoned lock is recovered: task state is
    /// plain data and stays consistent field by field.
    pub fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn turn(&self) -> u32 {
        self.state().turn
    }

    /// Increment the turn counter and return the new value.
    pub fn bump_turn(&self) -> u32 {
        let mut state = self.state();
        state.turn += 1;
        state.turn
    }

    pub fn attempt(&self) -> u32 {
        self.state().attempt
    }

    /// Increment the attempt counter and return the new value.
    pub fn bump_attempt(&self) -> u32 {
        let mut state = self.state();
        state.attempt += 1;
        state.attempt
    }

    pub fn sub_tasks(&self) -> Vec<Arc<Task>> {
        self.state().sub_tasks.clone()
    }

    pub fn sub_task_count(&self) -> usize {
        self.state().sub_tasks.len()
    }

    pub fn knowledges(&self) -> Vec<Knowledge> {
        self.state().knowledges.clone()
    }

    pub fn add_knowledges(&self, items: impl IntoIterator<Item = Knowledge>) {
        self.state().knowledges.extend(items);
    }

    pub fn answer(&self) -> Option<Answer> {
        self.state().answer.clone()
    }

    pub fn set_answer(&self, answer: Answer) {
        self.state().answer = Some(answer);
    }

    /// Solved iff an answer is stored and its evaluation passed.
    pub fn is_solved(&self) -> bool {
        self.state().answer.as_ref().is_some_and(Answer::is_pass)
    }

    pub fn query_embedding(&self) -> Option<Vec<f32>> {
        self.state().query_embedding.clone()
    }

    pub fn set_query_embedding(&self, embedding: Vec<f32>) {
        self.state().query_embedding = Some(embedding);
    }

    /// Every descendant that holds an answer, depth-first in spawn order,
    /// paired with the question it answers.
    pub fn descendant_answers(&self) -> Vec<(String, Answer)> {
        let mut out = Vec::new();
        for child in self.sub_tasks() {
            if let Some(answer) = child.answer() {
                out.push((child.query.clone(), answer));
            }
            out.extend(child.descendant_answers());
        }
        out
    }
}

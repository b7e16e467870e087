//! Per-query task context and branch-scoped task resolution.
//!
//! The [`TaskContext`] owns every task of one run. A [`TaskScope`] is the
//! handle a branch of execution carries around: the shared context plus the
//! id of the task that branch is working on. Spawning a child clones the
//! scope and rebinds it, so concurrent branches never share a mutable
//! "current task" pointer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;
use uuid::Uuid;
use crate::error::TaskError;
use crate::task::{Answer, Task, TaskId};
use crate::usage::UsageTracker;

/// All state of one research run.
#[derive(Debug)]
pub struct TaskContext {
    run_id: Uuid,
    tasks: RwLock<HashMap<TaskId, Arc<Task>>>,
    start_date_time: DateTime<Utc>,
    usage: UsageTracker,
}

impl TaskContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            tasks: RwLock::new(HashMap::new()),
            start_date_time: Utc::now(),
            usage: UsageTracker::new(),
        }
    }

    /// Correlates every log line of one run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn start_date_time(&self) -> DateTime<Utc> {
        self.start_date_time
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn get(&self, id: &str) -> Option<Arc<Task>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered task.
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Add a task to the map. Ids are never reused.
    pub fn register(&self, task: Arc<Task>) -> Result<(), TaskError> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&task.id) {
            return Err(TaskError::TaskIdCollision(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// The unique parentless task, found by scanning the map.
    pub fn root(&self) -> Result<Arc<Task>, TaskError> {
        let mut roots = self.tasks().into_iter().filter(|t| t.is_root());
        match (roots.next(), roots.next()) {
            (Some(root), None) => Ok(root),
            (None, _) => Err(TaskError::MissingRoot { found: 0 }),
            (Some(_), Some(_)) => Err(TaskError::MissingRoot {
                found: 2 + roots.count(),
            }),
        }
    }

    /// The root task's answer, if it has one.
    pub fn final_answer(&self) -> Result<Option<Answer>, TaskError> {
        Ok(self.root()?.answer())
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a fresh context holding a root task for `query`, and a scope bound to it.
pub fn build_context(query: impl Into<String>) -> TaskScope {
    let context = Arc::new(TaskContext::new());
    let root = Task::root(query);
    let id = root.id.clone();
    // A brand new map cannot collide.
    context
        .tasks
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id.clone(), root);
    TaskScope::new(context, id)
}

/// A branch's view of the run: the shared context plus its bound task.
#[derive(Debug, Clone)]
pub struct TaskScope {
    context: Arc<TaskContext>,
    task_id: TaskId,
}

impl TaskScope {
    pub fn new(context: Arc<TaskContext>, task_id: impl Into<TaskId>) -> Self {
        Self {
            context,
            task_id: task_id.into(),
        }
    }

    pub fn context(&self) -> &Arc<TaskContext> {
        &self.context
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Clone this scope, bound to another task.
    pub fn rebind(&self, task_id: impl Into<TaskId>) -> Self {
        Self::new(Arc::clone(&self.context), task_id)
    }

    /// Resolve the task this scope is bound to.
    pub fn current_task(&self) -> Result<Arc<Task>, TaskError> {
        self.context.get(&self.task_id).ok_or_else(|| {
            error!(task_id = %self.task_id, "scope is bound to an unregistered task");
            TaskError::NoCurrentTask(self.task_id.clone())
        })
    }

    /// Create a child of `parent` and return a scope bound to it.
    ///
    /// The id is `"{parent.id}_{n}"` where `n` is the parent's sub-task
    /// count plus one. On collision nothing is registered.
    pub fn spawn_sub_task(
        &self,
        parent: &Arc<Task>,
        query: impl Into<String>,
    ) -> Result<TaskScope, TaskError> {
        let mut parent_state = parent.state();
        let id = format!("{}_{}", parent.id, parent_state.sub_tasks.len() + 1);
        let child = Task::child(parent, id.clone(), query);
        if let Err(err) = self.context.register(Arc::clone(&child)) {
            error!(task_id = %id, parent = %parent.id, "sub-task id already registered");
            return Err(err);
        }
        parent_state.sub_tasks.push(child);
        Ok(self.rebind(id))
    }
}

//! Which actions a task may take on a given turn.
//!
//! Recomputed before every planner call from a snapshot of the task.

use deepsearch_config::ExecutionConfig;
use deepsearch_core::ActionKind;

/// Snapshot of the task and run at the start of a turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatingState {
    pub level: u32,
    pub sub_task_count: usize,
    pub last_used: Option<ActionKind>,
    /// Zero-based index of the planner call within the task loop
    pub turn_index: u32,
    /// Run-wide usage is above the close-out threshold
    pub usage_exceeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatingLimits {
    pub max_task_depth: u32,
    pub max_tasks_count: usize,
    pub max_turns: u32,
}

impl From<&ExecutionConfig> for GatingLimits {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_task_depth: config.max_task_depth,
            max_tasks_count: config.max_tasks_count,
            max_turns: config.max_turns,
        }
    }
}

impl GatingState {
    /// Out of budget or on the last turn: the task must answer now.
    pub fn must_answer(&self, limits: &GatingLimits) -> bool {
        self.usage_exceeded || self.turn_index + 1 >= limits.max_turns
    }
}

/// The subset of `catalog` offered this turn, in catalog order.
///
/// `answer` is never removed.
pub fn available_actions(
    catalog: &[ActionKind],
    state: &GatingState,
    limits: &GatingLimits,
) -> Vec<ActionKind> {
    if state.must_answer(limits) {
        return catalog
            .iter()
            .copied()
            .filter(|k| *k == ActionKind::Answer)
            .collect();
    }

    catalog
        .iter()
        .copied()
        .filter(|kind| match kind {
            ActionKind::Answer => true,
            ActionKind::Reflect
                if state.level >= limits.max_task_depth
                    || state.sub_task_count >= limits.max_tasks_count =>
            {
                false
            }
            other => state.last_used != Some(*other),
        })
        .collect()
}

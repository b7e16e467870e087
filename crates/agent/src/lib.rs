//! The research engine.
//!
//! A query becomes a root task. The [`Planner`] drives each task through
//! turns of **gate → prompt → act**:
//!
//! 1. **Gate** which actions are allowed this turn (depth, sub-task count,
//!    last action, turn and token budgets)
//! 2. **Prompt** the model with the task, its knowledge and those actions
//! 3. **Act** on the single action the model picks: search, visit,
//!    reflect (spawning concurrent sub-tasks) or answer (evaluated)
//!
//! The [`TaskSolver`] runs the root task and extracts the final answer.

pub mod actions;
pub mod evaluator;
pub mod gating;
pub mod planner;
pub mod prompt;
pub mod rewrite;
pub mod selector;
pub mod services;
pub mod solver;
pub mod summarize;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use actions::default_catalog;
pub use gating::{available_actions, GatingLimits, GatingState};
pub use planner::{Planner, TaskOutcome};
pub use services::Services;
pub use solver::{SolveReport, TaskSolver};

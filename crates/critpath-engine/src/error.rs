//! Engine-level error taxonomy (§7): failures that can only be detected
//! while building the dependency graph or running a CPM pass.

use critpath_core::{CoreError, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The dependency graph has a cycle; the CPM run aborts and the caller
    /// should re-publish the prior snapshot (§7 propagation policy).
    #[error("dependency cycle detected, involving task(s): {0:?}")]
    Cycle(Vec<TaskId>),

    /// A link referenced a predecessor/parent the graph builder can't find
    /// in the leaf set it was given (should not happen if the store's own
    /// validation ran first; defensive).
    #[error("dependency graph references unknown task `{0}`")]
    UnknownTask(TaskId),

    /// A task in `schedulingMode = manual` is missing a pinned `start` or
    /// `end`; the store's own validation does not require these together,
    /// so the engine is the first place this can be caught.
    #[error("manual-mode task `{0}` is missing a pinned start/end date")]
    ManualTaskMissingDates(TaskId),

    #[error(transparent)]
    Core(#[from] CoreError),
}

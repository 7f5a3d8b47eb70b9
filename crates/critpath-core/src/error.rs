//! Error taxonomy for the core domain model (calendar + task store).
//!
//! `CycleError` and `ConstraintInfeasible` are owned by `critpath-engine`
//! since they only arise during a CPM run; this crate only ever fails with
//! the variants it can itself detect (mutation-time validation, calendar
//! configuration, calendar scan exhaustion).

use crate::TaskId;
use thiserror::Error;

/// Errors surfaced by [`crate::Calendar`] and [`crate::TaskStore`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("calendar configuration invalid: {0}")]
    Config(String),

    #[error("calendar scan exceeded {limit} days without finding a working day")]
    CalendarExhausted { limit: u32 },
}

/// Invariant violations (I1-I8), reported at the task store's mutation
/// boundary. The store is left unchanged when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task `{0}` not found")]
    UnknownTask(TaskId),

    #[error("parent `{parent}` referenced by task `{task}` does not exist")]
    UnknownParent { task: TaskId, parent: TaskId },

    #[error("moving `{task}` under `{parent}` would create a cycle in the parent forest")]
    ParentCycle { task: TaskId, parent: TaskId },

    #[error("sort key `{sort_key}` is already used by a sibling under {parent:?}")]
    DuplicateSortKey {
        parent: Option<TaskId>,
        sort_key: String,
    },

    #[error("dependency predecessor `{pred}` referenced by task `{task}` does not exist")]
    UnknownPredecessor { task: TaskId, pred: TaskId },

    #[error("task `{0}` cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("blank row `{0}` cannot participate in dependencies")]
    BlankRowHasDependency(TaskId),

    #[error("parent task `{0}` cannot participate in dependencies")]
    ParentCannotDepend(TaskId),

    #[error("constraint on task `{0}` requires a constraintDate")]
    MissingConstraintDate(TaskId),

    #[error("task `{0}` has actualFinish set without a valid actualStart <= actualFinish")]
    InvalidActuals(TaskId),

    /// Raised by `critpath-interchange` when an imported file's field
    /// cannot be parsed into the domain model (§6.3 "never panics").
    #[error("task `{task}` field `{field}` is malformed: {reason}")]
    MalformedField {
        task: TaskId,
        field: String,
        reason: String,
    },
}

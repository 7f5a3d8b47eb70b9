//! Core domain model for the critpath scheduling engine: the task data
//! model (§3), working-day calendar arithmetic (C1), the task store (C2),
//! fractional sort keys, and baseline snapshots.
//!
//! This crate has no knowledge of CPM scheduling itself (see
//! `critpath-engine`) — it only defines and enforces the shape of the data
//! that the engine consumes and produces.

pub mod baseline;
pub mod calendar;
pub mod error;
pub mod sortkey;
pub mod store;
pub mod task;

pub use baseline::{Baseline, BaselineError, BaselineStore, BaselineVariance, TaskSnapshot};
pub use calendar::{Calendar, CalendarException};
pub use error::{CoreError, ValidationError};
pub use store::{TaskPatch, TaskStore};
pub use task::{
    ConstraintType, Dependency, DependencyType, DerivedFields, RowType, SchedulingMode, Task,
    TaskId,
};

//! Task data model (§3). Field names mirror the project file's native JSON
//! representation: camelCase on the wire, snake_case in Rust, via serde
//! rename attributes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque, stable task identifier.
pub type TaskId = String;

/// A row in the task grid. `Blank` rows are placeholders excluded from the
/// CPM run; `Summary` rows are parents whose dates are derived by rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowType {
    Task,
    Blank,
    Summary,
}

impl Default for RowType {
    fn default() -> Self {
        Self::Task
    }
}

/// Finish-to-Start / Start-to-Start / Finish-to-Finish / Start-to-Finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    FS,
    SS,
    FF,
    SF,
}

impl Default for DependencyType {
    fn default() -> Self {
        Self::FS
    }
}

/// A predecessor link on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub pred_id: TaskId,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    /// Signed work-day offset; may be negative.
    pub lag: i64,
}

/// Bound on a task's start or finish date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// As Soon As Possible — no date bound, the default.
    ASAP,
    /// Start No Earlier Than.
    SNET,
    /// Start No Later Than.
    SNLT,
    /// Finish No Earlier Than.
    FNET,
    /// Finish No Later Than.
    FNLT,
    /// Must Start On — hard pin.
    MSO,
    /// Must Finish On — hard pin.
    MFO,
}

impl Default for ConstraintType {
    fn default() -> Self {
        Self::ASAP
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchedulingMode {
    Auto,
    Manual,
}

impl Default for SchedulingMode {
    fn default() -> Self {
        Self::Auto
    }
}

/// Derived fields, cleared and recomputed on every CPM run. Never set
/// directly by a mutation — only [`crate::TaskStore`]'s snapshot merges the
/// result a CPM run publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFields {
    pub is_critical: bool,
    pub total_float: Option<i64>,
    pub free_float: Option<i64>,
    pub late_start: Option<NaiveDate>,
    pub late_end: Option<NaiveDate>,
    pub is_driver: bool,
    /// Set when a constraint on this task could not be honored without
    /// violating a predecessor; the run still completes (§7).
    pub constraint_infeasible: bool,
}

/// The atomic scheduling entity (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub row_type: RowType,
    pub name: String,
    pub parent_id: Option<TaskId>,
    pub sort_key: String,

    /// Work days; 0 = milestone.
    pub duration: u32,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    #[serde(default)]
    pub constraint_type: ConstraintType,
    pub constraint_date: Option<NaiveDate>,

    #[serde(default)]
    pub scheduling_mode: SchedulingMode,

    pub actual_start: Option<NaiveDate>,
    pub actual_finish: Option<NaiveDate>,
    #[serde(default)]
    pub progress: u8,

    pub baseline_start: Option<NaiveDate>,
    pub baseline_finish: Option<NaiveDate>,
    pub baseline_duration: Option<u32>,

    #[serde(default)]
    pub trade_partner_ids: Vec<String>,

    #[serde(default)]
    pub collapsed: bool,

    #[serde(default)]
    pub derived: DerivedFields,
}

impl Task {
    /// Minimal constructor used by tests and programmatic task creation;
    /// all optional fields default empty.
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>, duration: u32) -> Self {
        Self {
            id: id.into(),
            row_type: RowType::Task,
            name: name.into(),
            parent_id: None,
            sort_key: String::new(),
            duration,
            start: None,
            end: None,
            dependencies: Vec::new(),
            constraint_type: ConstraintType::ASAP,
            constraint_date: None,
            scheduling_mode: SchedulingMode::Auto,
            actual_start: None,
            actual_finish: None,
            progress: 0,
            baseline_start: None,
            baseline_finish: None,
            baseline_duration: None,
            trade_partner_ids: Vec::new(),
            collapsed: false,
            derived: DerivedFields::default(),
        }
    }

    pub fn is_milestone(&self) -> bool {
        self.duration == 0
    }

    pub fn is_blank(&self) -> bool {
        self.row_type == RowType::Blank
    }

    pub fn is_parent(&self) -> bool {
        self.row_type == RowType::Summary
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_blank() && !self.is_parent()
    }

    /// I8: `actualFinish` present implies `actualStart` present and
    /// `actualStart <= actualFinish`, and the task reads as complete.
    pub fn has_valid_actuals(&self) -> bool {
        match (self.actual_start, self.actual_finish) {
            (None, None) => true,
            (Some(_), None) => true,
            (Some(s), Some(f)) => s <= f,
            (None, Some(_)) => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.actual_finish.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_has_zero_duration() {
        let t = Task::new("t1", "Milestone", 0);
        assert!(t.is_milestone());
    }

    #[test]
    fn actual_finish_without_actual_start_is_invalid() {
        let mut t = Task::new("t1", "T", 3);
        t.actual_finish = Some(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(!t.has_valid_actuals());
    }

    #[test]
    fn actual_start_after_actual_finish_is_invalid() {
        let mut t = Task::new("t1", "T", 3);
        t.actual_start = Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        t.actual_finish = Some(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(!t.has_valid_actuals());
    }
}

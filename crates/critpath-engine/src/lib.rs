//! CPM scheduling kernel: the dependency graph (C3), the forward/backward
//! pass engine (C4 — THE CORE), and parent rollup (C5).
//!
//! This crate is pure: [`schedule`] is a function of its inputs with no
//! side effects beyond `tracing` events, and never mutates the task list it
//! is given (§5). Callers (typically `critpath-controller`) own the task
//! store and invoke this crate once per operation batch.

pub mod cpm;
pub mod dag;
pub mod error;
pub mod rollup;

pub use cpm::{CpmEngine, ScheduledTask};
pub use dag::DependencyGraph;
pub use error::EngineError;
pub use rollup::{rollup, RollupResult};

use chrono::NaiveDate;
use critpath_core::{Calendar, Task, TaskId};
use tracing::info;

/// A recorded, non-aborting failure found during a run (§7
/// `ConstraintInfeasible` is never a `Result::Err` at this level — it is
/// collected here instead, so the caller can inspect it without the run
/// being a failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub task_id: TaskId,
    pub message: String,
}

/// The published result of one CPM run: every input task with derived
/// fields filled in (leaves from the CPM pass, parents from rollup, blanks
/// untouched), the resolved project start/finish, and any recorded
/// constraint-infeasibility diagnostics.
#[derive(Debug, Clone)]
pub struct ScheduleOutput {
    pub tasks: Vec<Task>,
    pub project_start: NaiveDate,
    pub project_finish: NaiveDate,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs one full CPM pass: builds the dependency graph, forward/backward
/// passes, float/criticality/driver detection, and parent rollup, returning
/// a complete published snapshot (§4.4.1).
///
/// `project_start` is the caller-resolved project start date (§4.4.1: "the
/// earliest of user-specified project start or earliest unbounded
/// predecessor" — resolving that ambiguity is `critpath-controller`'s job;
/// this function takes the resolved date as an explicit input so the kernel
/// itself stays a pure function, per DESIGN.md's Open Question decision).
#[tracing::instrument(skip_all, fields(task_count = tasks.len()))]
pub fn schedule(
    tasks: &[Task],
    calendar: &Calendar,
    project_start: NaiveDate,
) -> Result<ScheduleOutput, EngineError> {
    let graph = DependencyGraph::build(tasks)?;
    let cpm_out = CpmEngine::run(tasks, &graph, calendar, project_start)?;
    let rollups = rollup::rollup(tasks, &cpm_out.scheduled, calendar);

    let mut diagnostics = Vec::new();
    let mut out_tasks = Vec::with_capacity(tasks.len());
    for task in tasks {
        let mut t = task.clone();
        if let Some(s) = cpm_out.scheduled.get(&task.id) {
            t.start = Some(s.start);
            t.end = Some(s.end);
            t.derived.late_start = Some(s.late_start);
            t.derived.late_end = Some(s.late_end);
            t.derived.total_float = Some(s.total_float);
            t.derived.free_float = Some(s.free_float);
            t.derived.is_critical = s.is_critical;
            t.derived.is_driver = s.is_driver;
            t.derived.constraint_infeasible = s.constraint_infeasible;
            if s.constraint_infeasible {
                diagnostics.push(Diagnostic {
                    task_id: task.id.clone(),
                    message: format!(
                        "task `{}` constraint could not be honored without violating a predecessor",
                        task.id
                    ),
                });
            }
        } else if let Some(r) = rollups.get(&task.id) {
            t.start = Some(r.start);
            t.end = Some(r.end);
            t.duration = r.duration;
            t.derived.is_critical = r.is_critical;
            t.derived.total_float = Some(r.total_float);
            t.derived.free_float = Some(r.free_float);
        } else {
            t.derived = critpath_core::DerivedFields::default();
        }
        out_tasks.push(t);
    }

    info!(
        project_start = %project_start,
        project_finish = %cpm_out.project_finish,
        diagnostics = diagnostics.len(),
        "CPM run published"
    );

    Ok(ScheduleOutput {
        tasks: out_tasks,
        project_start,
        project_finish: cpm_out.project_finish,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use critpath_core::{Dependency, DependencyType, RowType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_task_list_publishes_empty_snapshot() {
        let calendar = Calendar::standard_five_day();
        let out = schedule(&[], &calendar, date(2024, 1, 1)).unwrap();
        assert!(out.tasks.is_empty());
    }

    #[test]
    fn single_task_no_dependencies_starts_at_project_start() {
        let t = Task::new("t1", "Solo", 5);
        let calendar = Calendar::standard_five_day();
        let out = schedule(&[t], &calendar, date(2024, 1, 1)).unwrap();
        let t1 = &out.tasks[0];
        assert_eq!(t1.start, Some(date(2024, 1, 1)));
        assert_eq!(t1.end, Some(date(2024, 1, 5)));
    }

    #[test]
    fn cycle_aborts_the_run() {
        let mut a = Task::new("a", "A", 1);
        a.sort_key = "a".into();
        a.dependencies.push(Dependency {
            pred_id: "b".into(),
            dep_type: DependencyType::FS,
            lag: 0,
        });
        let mut b = Task::new("b", "B", 1);
        b.sort_key = "b".into();
        b.dependencies.push(Dependency {
            pred_id: "a".into(),
            dep_type: DependencyType::FS,
            lag: 0,
        });
        let calendar = Calendar::standard_five_day();
        let err = schedule(&[a, b], &calendar, date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::Cycle(_)));
    }

    #[test]
    fn parent_rollup_seed_scenario_six() {
        let mut parent = Task::new("p", "Parent", 0);
        parent.row_type = RowType::Summary;
        parent.sort_key = "p".into();

        let mut c1 = Task::new("c1", "C1", 3);
        c1.parent_id = Some("p".into());
        c1.sort_key = "a".into();

        let mut c2 = Task::new("c2", "C2", 3);
        c2.parent_id = Some("p".into());
        c2.sort_key = "b".into();
        // Starts the Friday after C1 finishes (01-05), lag 1 work day past
        // C1's finish; a 3-day duration from there runs 01-05, 01-08, 01-09
        // (skipping the weekend), so C2 ends 2024-01-09.
        c2.dependencies.push(Dependency {
            pred_id: "c1".into(),
            dep_type: DependencyType::FS,
            lag: 1,
        });

        let calendar = Calendar::standard_five_day();
        let out = schedule(&[parent, c1, c2], &calendar, date(2024, 1, 1)).unwrap();
        let p = out.tasks.iter().find(|t| t.id == "p").unwrap();
        assert_eq!(p.start, Some(date(2024, 1, 1)));
        assert_eq!(p.end, Some(date(2024, 1, 9)));
        assert_eq!(p.duration, 7);
    }

    #[test]
    fn blank_rows_are_passed_through_untouched() {
        let mut blank = Task::new("bl", "Blank", 0);
        blank.row_type = RowType::Blank;
        let calendar = Calendar::standard_five_day();
        let out = schedule(&[blank], &calendar, date(2024, 1, 1)).unwrap();
        assert_eq!(out.tasks[0].start, None);
    }
}

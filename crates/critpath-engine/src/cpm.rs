//! CPMEngine (C4) — the forward pass, backward pass, float/criticality, and
//! driver detection described in §4.4. This is the core of the crate.

use crate::dag::DependencyGraph;
use crate::error::EngineError;
use critpath_core::{Calendar, ConstraintType, DependencyType, SchedulingMode, Task, TaskId};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// One bare calendar day forward, independent of working-day status — an
/// FS link's "next day" is a calendar concept; `lag` is what is expressed
/// in working days on top of it.
fn day_after(d: chrono::NaiveDate) -> chrono::NaiveDate {
    d + chrono::Duration::days(1)
}

fn day_before(d: chrono::NaiveDate) -> chrono::NaiveDate {
    d - chrono::Duration::days(1)
}

/// Per-task result of a CPM run, before it is merged back into the
/// published [`Task`] (see `crate::schedule`).
#[derive(Debug, Clone, Copy)]
pub struct ScheduledTask {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
    pub late_start: chrono::NaiveDate,
    pub late_end: chrono::NaiveDate,
    pub total_float: i64,
    pub free_float: i64,
    pub is_critical: bool,
    pub is_driver: bool,
    pub constraint_infeasible: bool,
}

pub struct CpmOutput {
    pub scheduled: HashMap<TaskId, ScheduledTask>,
    pub project_finish: chrono::NaiveDate,
}

/// Working state threaded through the forward pass for a single task.
struct ForwardState {
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
    constraint_infeasible: bool,
    driver: Option<TaskId>,
}

/// Forward/backward pass over a [`DependencyGraph`]. Stateless — every
/// `run` call is a pure function of its inputs, matching §5's "pure and
/// deterministic" requirement.
pub struct CpmEngine;

impl CpmEngine {
    #[tracing::instrument(
        skip_all,
        fields(
            task_count = tasks.len(),
            edge_count = graph.topo_order().iter().map(|id| graph.predecessors(id).len()).sum::<usize>(),
        )
    )]
    pub fn run(
        tasks: &[Task],
        graph: &DependencyGraph,
        calendar: &Calendar,
        project_start: chrono::NaiveDate,
    ) -> Result<CpmOutput, EngineError> {
        let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
        let mut forward: HashMap<TaskId, ForwardState> = HashMap::new();

        debug!("forward pass: {} leaf tasks", graph.topo_order().len());
        for &id in graph.topo_order() {
            let task = by_id[id];
            let state = Self::forward_one(task, graph, calendar, project_start, &by_id, &forward)?;
            trace!(id = %id, start = %state.start, end = %state.end, "forward pass step");
            forward.insert(id.clone(), state);
        }

        let project_finish = Self::project_finish(tasks, &forward, &by_id);

        debug!(%project_finish, "backward pass starting");
        let mut backward: HashMap<TaskId, (chrono::NaiveDate, chrono::NaiveDate)> = HashMap::new();
        for &id in graph.topo_order().iter().rev() {
            let task = by_id[id];
            let (late_start, late_end) = Self::backward_one(
                task,
                graph,
                calendar,
                project_finish,
                &backward,
                &forward,
            )?;
            trace!(id = %id, %late_start, %late_end, "backward pass step");
            backward.insert(id.clone(), (late_start, late_end));
        }

        let mut driver_of: HashMap<&TaskId, bool> = by_id.keys().map(|&id| (id, false)).collect();
        for state in forward.values() {
            if let Some(driver) = &state.driver {
                if let Some(flag) = driver_of.get_mut(driver) {
                    *flag = true;
                }
            }
        }

        let mut scheduled = HashMap::new();
        for &id in graph.leaf_ids() {
            let fwd = &forward[id];
            let (late_start, late_end) = backward[id];
            let total_float = calendar.work_days_between(fwd.start, late_start);
            let free_float = Self::free_float(id, fwd.end, graph, &forward, &backward, calendar, project_finish);
            let is_critical = total_float <= 0;
            if is_critical {
                trace!(id = %id, total_float, "task is on the critical path");
            }
            scheduled.insert(
                id.clone(),
                ScheduledTask {
                    start: fwd.start,
                    end: fwd.end,
                    late_start,
                    late_end,
                    total_float,
                    free_float,
                    is_critical,
                    is_driver: driver_of[id],
                    constraint_infeasible: fwd.constraint_infeasible,
                },
            );
        }

        Ok(CpmOutput {
            scheduled,
            project_finish,
        })
    }

    fn forward_one(
        task: &Task,
        graph: &DependencyGraph,
        calendar: &Calendar,
        project_start: chrono::NaiveDate,
        by_id: &HashMap<&TaskId, &Task>,
        forward: &HashMap<TaskId, ForwardState>,
    ) -> Result<ForwardState, EngineError> {
        if task.scheduling_mode == SchedulingMode::Manual {
            let start = task
                .start
                .ok_or_else(|| EngineError::ManualTaskMissingDates(task.id.clone()))?;
            let end = task
                .end
                .ok_or_else(|| EngineError::ManualTaskMissingDates(task.id.clone()))?;
            return Ok(ForwardState {
                start,
                end,
                constraint_infeasible: false,
                driver: None,
            });
        }

        // MSO is a hard pin on start, bypassing predecessor-driven ES
        // entirely (§4.4.6's "must" constraints, §9's hard-pin resolution).
        let mso_pin = (task.constraint_type == ConstraintType::MSO && task.actual_start.is_none())
            .then_some(task.constraint_date)
            .flatten();

        let (mut es, driver) = if let Some(actual) = task.actual_start {
            (actual, None)
        } else if let Some(pinned) = mso_pin {
            (pinned, None)
        } else {
            Self::candidate_early_start(task, graph, calendar, project_start, by_id, forward)?
        };

        // SNET/SNLT only apply when no actualStart overrides the start.
        if task.actual_start.is_none() && mso_pin.is_none() {
            if let (ConstraintType::SNET, Some(d)) = (task.constraint_type, task.constraint_date) {
                es = es.max(d);
            }
        }
        let mut constraint_infeasible = false;
        if task.actual_start.is_none() && mso_pin.is_none() {
            if let (ConstraintType::SNLT, Some(d)) = (task.constraint_type, task.constraint_date) {
                if es > d {
                    constraint_infeasible = true;
                }
            }
        }

        // Milestones never roll past a non-working day (§4.4.6): a
        // milestone's ES is whatever date binds it, working or not.
        let rolled_es = if mso_pin.is_some() || task.is_milestone() {
            es
        } else {
            calendar.next_working_day(es)?
        };

        let mut ef = if let Some(actual) = task.actual_finish {
            actual
        } else if task.is_milestone() {
            rolled_es
        } else {
            calendar.add_work_days(rolled_es, i64::from(task.duration) - 1)?
        };
        let mut start = rolled_es;

        // MFO is a hard pin on finish, bypassing forward-pass EF entirely.
        let mfo_pin = (task.constraint_type == ConstraintType::MFO && task.actual_finish.is_none())
            .then_some(task.constraint_date)
            .flatten();
        if let Some(pinned) = mfo_pin {
            ef = pinned;
            start = if task.is_milestone() {
                ef
            } else {
                calendar.sub_work_days(ef, i64::from(task.duration) - 1)?
            };
        } else if task.actual_finish.is_none() {
            if let (ConstraintType::FNET, Some(d)) = (task.constraint_type, task.constraint_date) {
                if ef < d {
                    ef = d;
                    start = if task.is_milestone() {
                        ef
                    } else {
                        calendar.sub_work_days(ef, i64::from(task.duration) - 1)?
                    };
                }
            }
            if let (ConstraintType::FNLT, Some(d)) = (task.constraint_type, task.constraint_date) {
                if ef > d {
                    constraint_infeasible = true;
                }
            }
        }

        if constraint_infeasible {
            warn!(id = %task.id, "constraint recorded as infeasible, run continues (§7)");
        }

        Ok(ForwardState {
            start,
            end: ef,
            constraint_infeasible,
            driver,
        })
    }

    /// Aggregates the candidate early-start date over every predecessor
    /// link, returning the binding (latest) candidate and its predecessor
    /// id as the driver, tie-broken by the lowest `sortKey` (§4.4.6).
    fn candidate_early_start(
        task: &Task,
        graph: &DependencyGraph,
        calendar: &Calendar,
        project_start: chrono::NaiveDate,
        by_id: &HashMap<&TaskId, &Task>,
        forward: &HashMap<TaskId, ForwardState>,
    ) -> Result<(chrono::NaiveDate, Option<TaskId>), EngineError> {
        let preds = graph.predecessors(&task.id);
        if preds.is_empty() {
            return Ok((project_start, None));
        }

        let mut candidates: Vec<(chrono::NaiveDate, &TaskId)> = Vec::with_capacity(preds.len());
        for edge in preds {
            let pred_state = &forward[edge.other];
            let pred_task = by_id[edge.other];
            let candidate_es = match edge.dep_type {
                DependencyType::FS => {
                    calendar.add_work_days(day_after(pred_state.end), edge.lag)?
                }
                DependencyType::SS => calendar.add_work_days(pred_state.start, edge.lag)?,
                DependencyType::FF => {
                    let candidate_end = calendar.add_work_days(pred_state.end, edge.lag)?;
                    if task.is_milestone() {
                        candidate_end
                    } else {
                        calendar.sub_work_days(candidate_end, i64::from(task.duration) - 1)?
                    }
                }
                DependencyType::SF => {
                    let candidate_end = calendar.add_work_days(pred_state.start, edge.lag)?;
                    if task.is_milestone() {
                        candidate_end
                    } else {
                        calendar.sub_work_days(candidate_end, i64::from(task.duration) - 1)?
                    }
                }
            };
            let _ = pred_task;
            candidates.push((candidate_es, edge.other));
        }

        // Latest date wins; among ties the lowest sortKey is the driver.
        let (winning_date, _) = candidates
            .iter()
            .max_by(|a, b| a.0.cmp(&b.0))
            .copied()
            .expect("preds is non-empty");
        let driver = candidates
            .iter()
            .filter(|(d, _)| *d == winning_date)
            .min_by_key(|(_, id)| &by_id[*id].sort_key)
            .map(|(_, id)| (*id).clone());

        Ok((winning_date, driver))
    }

    fn backward_one(
        task: &Task,
        graph: &DependencyGraph,
        calendar: &Calendar,
        project_finish: chrono::NaiveDate,
        backward: &HashMap<TaskId, (chrono::NaiveDate, chrono::NaiveDate)>,
        forward: &HashMap<TaskId, ForwardState>,
    ) -> Result<(chrono::NaiveDate, chrono::NaiveDate), EngineError> {
        let succs = graph.successors(&task.id);

        let mut late_finish = if succs.is_empty() {
            project_finish
        } else {
            let mut candidates = Vec::with_capacity(succs.len());
            for edge in succs {
                let (succ_late_start, succ_late_end) = backward[edge.other];
                let candidate_lf = match edge.dep_type {
                    DependencyType::FS => {
                        day_before(calendar.sub_work_days(succ_late_start, edge.lag)?)
                    }
                    DependencyType::SS => {
                        let candidate_ls = calendar.sub_work_days(succ_late_start, edge.lag)?;
                        if task.is_milestone() {
                            candidate_ls
                        } else {
                            calendar.add_work_days(candidate_ls, i64::from(task.duration) - 1)?
                        }
                    }
                    DependencyType::FF => calendar.sub_work_days(succ_late_end, edge.lag)?,
                    DependencyType::SF => {
                        let candidate_ls = calendar.sub_work_days(succ_late_end, edge.lag)?;
                        if task.is_milestone() {
                            candidate_ls
                        } else {
                            calendar.add_work_days(candidate_ls, i64::from(task.duration) - 1)?
                        }
                    }
                };
                candidates.push(candidate_lf);
            }
            candidates.into_iter().min().expect("succs is non-empty")
        };

        // Manual tasks are pinned for the forward pass only (§4.4.6); the
        // backward pass still derives late dates and float normally so
        // they participate in criticality like any other leaf task.
        if task.actual_finish.is_none() {
            if let (ConstraintType::FNLT, Some(d)) = (task.constraint_type, task.constraint_date) {
                late_finish = late_finish.min(d);
            }
            if task.constraint_type == ConstraintType::MFO {
                if let Some(d) = task.constraint_date {
                    late_finish = d;
                }
            }
        }

        let mut late_start = if task.is_milestone() {
            late_finish
        } else {
            calendar.sub_work_days(late_finish, i64::from(task.duration) - 1)?
        };

        if task.actual_start.is_none() {
            if let (ConstraintType::SNLT, Some(d)) = (task.constraint_type, task.constraint_date) {
                late_start = late_start.min(d);
                late_finish = if task.is_milestone() {
                    late_start
                } else {
                    calendar.add_work_days(late_start, i64::from(task.duration) - 1)?
                };
            }
            if task.constraint_type == ConstraintType::MSO {
                if let Some(d) = task.constraint_date {
                    late_start = d;
                    late_finish = if task.is_milestone() {
                        late_start
                    } else {
                        calendar.add_work_days(late_start, i64::from(task.duration) - 1)?
                    };
                }
            }
        }

        Ok((late_start, late_finish))
    }

    /// PF = max(leaf end) over the forward pass, raised to meet any FNLT or
    /// MFO deadline that falls later still (§4.4.3).
    fn project_finish(
        tasks: &[Task],
        forward: &HashMap<TaskId, ForwardState>,
        by_id: &HashMap<&TaskId, &Task>,
    ) -> chrono::NaiveDate {
        let max_end = forward
            .values()
            .map(|s| s.end)
            .max()
            .unwrap_or_else(|| chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let max_deadline = tasks
            .iter()
            .filter(|t| by_id.contains_key(&t.id))
            .filter(|t| matches!(t.constraint_type, ConstraintType::FNLT | ConstraintType::MFO))
            .filter_map(|t| t.constraint_date)
            .max();
        match max_deadline {
            Some(d) if d > max_end => d,
            _ => max_end,
        }
    }

    /// Free float: the minimum slack against any immediate successor on its
    /// binding link, or the slack to project finish when there are none.
    fn free_float(
        id: &TaskId,
        end: chrono::NaiveDate,
        graph: &DependencyGraph,
        forward: &HashMap<TaskId, ForwardState>,
        backward: &HashMap<TaskId, (chrono::NaiveDate, chrono::NaiveDate)>,
        calendar: &Calendar,
        project_finish: chrono::NaiveDate,
    ) -> i64 {
        let _ = backward;
        let succs = graph.successors(id);
        if succs.is_empty() {
            return calendar.work_days_between(end, project_finish);
        }
        let start = forward[id].start;
        succs
            .iter()
            .map(|edge| {
                let succ = &forward[edge.other];
                match edge.dep_type {
                    DependencyType::FS => {
                        calendar.work_days_between(end, succ.start) - 1 - edge.lag
                    }
                    DependencyType::SS => calendar.work_days_between(start, succ.start) - edge.lag,
                    DependencyType::FF => calendar.work_days_between(end, succ.end) - edge.lag,
                    DependencyType::SF => calendar.work_days_between(start, succ.end) - edge.lag,
                }
            })
            .min()
            .unwrap_or(0)
    }
}

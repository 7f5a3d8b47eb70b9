//! ParentRollup (C5): summarizes a leaf-level CPM result into parent
//! (`Summary`) task bars, post-order so a parent's own parent sees its
//! already-rolled-up dates (§4.5).

use crate::cpm::ScheduledTask;
use chrono::NaiveDate;
use critpath_core::{Task, TaskId};
use std::collections::HashMap;

/// Rolled-up fields for one parent task.
#[derive(Debug, Clone, Copy)]
pub struct RollupResult {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub duration: u32,
    pub is_critical: bool,
    /// Not separately defined by the base spec; this crate reports the
    /// minimum over the parent's leaf descendants (DESIGN.md open-question
    /// resolution), matching C5's "summarizes child schedule" framing
    /// without inventing new scheduling semantics.
    pub total_float: i64,
    pub free_float: i64,
}

/// Computes rollups for every parent (`Summary`) task in `tasks`, given the
/// leaf-level CPM result. Parents are processed deepest-first so a
/// grandparent's rollup can read its child parent's already-computed bar.
pub fn rollup(
    tasks: &[Task],
    scheduled: &HashMap<TaskId, ScheduledTask>,
    calendar: &critpath_core::Calendar,
) -> HashMap<TaskId, RollupResult> {
    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
    let children_of: HashMap<Option<&TaskId>, Vec<&Task>> = {
        let mut map: HashMap<Option<&TaskId>, Vec<&Task>> = HashMap::new();
        for t in tasks {
            map.entry(t.parent_id.as_ref()).or_default().push(t);
        }
        for children in map.values_mut() {
            children.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
        }
        map
    };

    let mut results: HashMap<TaskId, RollupResult> = HashMap::new();
    let parents: Vec<&Task> = tasks.iter().filter(|t| t.is_parent()).collect();
    let depth = |t: &Task| -> usize {
        let mut d = 0;
        let mut cur = t.parent_id.as_ref();
        while let Some(id) = cur {
            d += 1;
            cur = by_id.get(id).and_then(|t| t.parent_id.as_ref());
        }
        d
    };
    let mut ordered: Vec<&Task> = parents;
    ordered.sort_by_key(|t| std::cmp::Reverse(depth(t)));

    for parent in ordered {
        let children = children_of.get(&Some(&parent.id)).cloned().unwrap_or_default();
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        let mut any_critical = false;
        let mut min_total_float = i64::MAX;
        let mut min_free_float = i64::MAX;

        for child in &children {
            if child.is_blank() {
                continue;
            }
            if child.is_parent() {
                if let Some(r) = results.get(&child.id) {
                    starts.push(r.start);
                    ends.push(r.end);
                    any_critical |= r.is_critical;
                    min_total_float = min_total_float.min(r.total_float);
                    min_free_float = min_free_float.min(r.free_float);
                }
            } else if let Some(s) = scheduled.get(&child.id) {
                starts.push(s.start);
                ends.push(s.end);
                any_critical |= s.is_critical;
                min_total_float = min_total_float.min(s.total_float);
                min_free_float = min_free_float.min(s.free_float);
            }
        }

        let (Some(start), Some(end)) = (starts.iter().min().copied(), ends.iter().max().copied())
        else {
            continue;
        };
        let duration = (calendar.work_days_between(start, end) + 1) as u32;
        results.insert(
            parent.id.clone(),
            RollupResult {
                start,
                end,
                duration,
                is_critical: any_critical,
                total_float: if min_total_float == i64::MAX { 0 } else { min_total_float },
                free_float: if min_free_float == i64::MAX { 0 } else { min_free_float },
            },
        );
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DependencyGraph;
    use crate::cpm::CpmEngine;
    use critpath_core::{Calendar, RowType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parent_spans_its_children() {
        let mut parent = Task::new("p", "Parent", 0);
        parent.row_type = RowType::Summary;
        parent.sort_key = "A".into();

        let mut c1 = Task::new("c1", "C1", 3);
        c1.parent_id = Some("p".into());
        c1.sort_key = "A".into();

        let mut c2 = Task::new("c2", "C2", 3);
        c2.parent_id = Some("p".into());
        c2.sort_key = "B".into();
        c2.dependencies.push(critpath_core::Dependency {
            pred_id: "c1".into(),
            dep_type: critpath_core::DependencyType::FS,
            lag: 1,
        });

        let tasks = vec![parent, c1, c2];
        let calendar = Calendar::standard_five_day();
        let graph = DependencyGraph::build(&tasks).unwrap();
        let out = CpmEngine::run(&tasks, &graph, &calendar, date(2024, 1, 1)).unwrap();
        let rollups = rollup(&tasks, &out.scheduled, &calendar);

        let p = &rollups["p"];
        assert_eq!(p.start, date(2024, 1, 1));
        assert_eq!(p.end, out.scheduled["c2"].end);
    }
}

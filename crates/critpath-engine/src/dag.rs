//! DependencyGraph (C3): forward/reverse adjacency over leaf tasks, built
//! fresh from a store snapshot before every CPM run.
//!
//! Parents and blank rows never appear here — they are excluded from the
//! dependency graph entirely (§4.3) and rolled up separately (C5).

use crate::error::EngineError;
use critpath_core::{DependencyType, Task, TaskId};
use std::collections::{HashMap, HashSet, VecDeque};

/// One predecessor/successor link, carried in both adjacency directions.
#[derive(Debug, Clone, Copy)]
pub struct Edge<'a> {
    pub other: &'a TaskId,
    pub dep_type: DependencyType,
    pub lag: i64,
}

/// Adjacency lists and topological order over the leaf task set.
pub struct DependencyGraph<'a> {
    leaf_ids: Vec<&'a TaskId>,
    successors: HashMap<&'a TaskId, Vec<Edge<'a>>>,
    predecessors: HashMap<&'a TaskId, Vec<Edge<'a>>>,
    topo_order: Vec<&'a TaskId>,
}

impl<'a> DependencyGraph<'a> {
    /// Builds the graph from every leaf task in `tasks`. Fails with
    /// [`EngineError::UnknownTask`] if a dependency references a task absent
    /// from the leaf set (a parent, a blank, or a dangling id — the store's
    /// own validation should have already ruled out the latter) and with
    /// [`EngineError::Cycle`] if Kahn's algorithm cannot place every leaf.
    pub fn build(tasks: &'a [Task]) -> Result<Self, EngineError> {
        let leaves: Vec<&Task> = tasks.iter().filter(|t| t.is_leaf()).collect();
        let leaf_ids: HashSet<&TaskId> = leaves.iter().map(|t| &t.id).collect();

        let mut successors: HashMap<&TaskId, Vec<Edge>> =
            leaves.iter().map(|t| (&t.id, Vec::new())).collect();
        let mut predecessors: HashMap<&TaskId, Vec<Edge>> =
            leaves.iter().map(|t| (&t.id, Vec::new())).collect();

        for task in &leaves {
            for dep in &task.dependencies {
                if !leaf_ids.contains(&dep.pred_id) {
                    return Err(EngineError::UnknownTask(dep.pred_id.clone()));
                }
                predecessors.get_mut(&task.id).unwrap().push(Edge {
                    other: &dep.pred_id,
                    dep_type: dep.dep_type,
                    lag: dep.lag,
                });
                successors.get_mut(&dep.pred_id).unwrap().push(Edge {
                    other: &task.id,
                    dep_type: dep.dep_type,
                    lag: dep.lag,
                });
            }
        }

        let topo_order = topological_sort(&leaf_ids, &predecessors)?;

        Ok(Self {
            leaf_ids: leaves.iter().map(|t| &t.id).collect(),
            successors,
            predecessors,
            topo_order,
        })
    }

    pub fn leaf_ids(&self) -> &[&'a TaskId] {
        &self.leaf_ids
    }

    /// Forward topological order: every predecessor precedes its successors.
    pub fn topo_order(&self) -> &[&'a TaskId] {
        &self.topo_order
    }

    pub fn predecessors(&self, id: &TaskId) -> &[Edge<'a>] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn successors(&self, id: &TaskId) -> &[Edge<'a>] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Kahn's algorithm over the predecessor adjacency, tie-broken by id for a
/// deterministic order among tasks with equal in-degree at a given step.
fn topological_sort<'a>(
    leaf_ids: &HashSet<&'a TaskId>,
    predecessors: &HashMap<&'a TaskId, Vec<Edge<'a>>>,
) -> Result<Vec<&'a TaskId>, EngineError> {
    let mut in_degree: HashMap<&TaskId, usize> = leaf_ids
        .iter()
        .map(|&id| (id, predecessors.get(id).map(Vec::len).unwrap_or(0)))
        .collect();

    let mut successors_of: HashMap<&TaskId, Vec<&TaskId>> =
        leaf_ids.iter().map(|&id| (id, Vec::new())).collect();
    for (&succ, edges) in predecessors {
        for edge in edges {
            successors_of.get_mut(edge.other).unwrap().push(succ);
        }
    }

    let mut ready: VecDeque<&TaskId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut ready_sorted: Vec<&TaskId> = ready.drain(..).collect();
    ready_sorted.sort();
    let mut queue: VecDeque<&TaskId> = ready_sorted.into();

    let mut order = Vec::with_capacity(leaf_ids.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        let mut newly_ready = Vec::new();
        for &succ in &successors_of[id] {
            let deg = in_degree.get_mut(succ).unwrap();
            *deg -= 1;
            if *deg == 0 {
                newly_ready.push(succ);
            }
        }
        newly_ready.sort();
        for succ in newly_ready {
            queue.push_back(succ);
        }
    }

    if order.len() != leaf_ids.len() {
        let placed: HashSet<&TaskId> = order.iter().copied().collect();
        let mut remaining: Vec<TaskId> = leaf_ids
            .iter()
            .filter(|id| !placed.contains(*id))
            .map(|id| (*id).clone())
            .collect();
        remaining.sort();
        return Err(EngineError::Cycle(remaining));
    }
    Ok(order)
}

//! TaskStore (C2): owns the canonical task list and enforces invariants
//! I1-I8 at the mutation boundary. Mutation primitives here are called only
//! from the operation queue / controller (C6/C7) — never directly by a
//! view layer.

use crate::error::ValidationError;
use crate::sortkey;
use crate::task::{ConstraintType, DerivedFields, RowType, Task, TaskId};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

/// A partial update to a task. Fields that should be left untouched are
/// `None`; fields whose *value* is itself optional use a nested `Option` so
/// "leave untouched" and "clear to None" are distinguishable.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub parent_id: Option<Option<TaskId>>,
    pub sort_key: Option<String>,
    pub duration: Option<u32>,
    pub dependencies: Option<Vec<crate::task::Dependency>>,
    pub constraint_type: Option<ConstraintType>,
    pub constraint_date: Option<Option<NaiveDate>>,
    pub scheduling_mode: Option<crate::task::SchedulingMode>,
    pub actual_start: Option<Option<NaiveDate>>,
    pub actual_finish: Option<Option<NaiveDate>>,
    pub progress: Option<u8>,
    pub baseline_start: Option<Option<NaiveDate>>,
    pub baseline_finish: Option<Option<NaiveDate>>,
    pub baseline_duration: Option<Option<u32>>,
    pub trade_partner_ids: Option<Vec<String>>,
    pub collapsed: Option<bool>,
}

impl TaskPatch {
    fn apply(&self, task: &mut Task) {
        if let Some(v) = &self.name {
            task.name = v.clone();
        }
        if let Some(v) = &self.parent_id {
            task.parent_id = v.clone();
        }
        if let Some(v) = &self.sort_key {
            task.sort_key = v.clone();
        }
        if let Some(v) = self.duration {
            task.duration = v;
        }
        if let Some(v) = &self.dependencies {
            task.dependencies = v.clone();
        }
        if let Some(v) = self.constraint_type {
            task.constraint_type = v;
        }
        if let Some(v) = self.constraint_date {
            task.constraint_date = v;
        }
        if let Some(v) = self.scheduling_mode {
            task.scheduling_mode = v;
        }
        if let Some(v) = self.actual_start {
            task.actual_start = v;
        }
        if let Some(v) = self.actual_finish {
            task.actual_finish = v;
        }
        if let Some(v) = self.progress {
            task.progress = v;
        }
        if let Some(v) = self.baseline_start {
            task.baseline_start = v;
        }
        if let Some(v) = self.baseline_finish {
            task.baseline_finish = v;
        }
        if let Some(v) = self.baseline_duration {
            task.baseline_duration = v;
        }
        if let Some(v) = &self.trade_partner_ids {
            task.trade_partner_ids = v.clone();
        }
        if let Some(v) = self.collapsed {
            task.collapsed = v;
        }
    }
}

/// Owns the canonical, mutable task list.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// An immutable snapshot of every task, in unspecified-but-stable
    /// (id-sorted) order. Use [`Self::get_visible_tasks`] for hierarchy
    /// preorder.
    pub fn get_all(&self) -> Vec<Task> {
        let mut all: Vec<Task> = self.tasks.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Children of `parent_id`, sorted by `sortKey`.
    pub fn get_children(&self, parent_id: Option<&str>) -> Vec<&Task> {
        let mut children: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.parent_id.as_deref() == parent_id)
            .collect();
        children.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
        children
    }

    pub fn get_last_sort_key(&self, parent_id: Option<&str>) -> Option<String> {
        self.get_children(parent_id)
            .last()
            .map(|t| t.sort_key.clone())
    }

    /// Hierarchy-preorder traversal of the forest, skipping subtrees whose
    /// root satisfies `is_collapsed`.
    pub fn get_visible_tasks(&self, is_collapsed: impl Fn(&Task) -> bool) -> Vec<&Task> {
        let mut out = Vec::new();
        self.visit(None, &is_collapsed, &mut out);
        out
    }

    fn visit<'a>(
        &'a self,
        parent_id: Option<&str>,
        is_collapsed: &impl Fn(&Task) -> bool,
        out: &mut Vec<&'a Task>,
    ) {
        for child in self.get_children(parent_id) {
            out.push(child);
            if !is_collapsed(child) {
                self.visit(Some(child.id.as_str()), is_collapsed, out);
            }
        }
    }

    /// All leaf (non-blank, non-parent) tasks, used as CPM input.
    pub fn leaf_tasks(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.is_leaf()).collect()
    }

    fn would_cycle(&self, task_id: &str, new_parent: &str) -> bool {
        let mut cur = Some(new_parent.to_string());
        while let Some(id) = cur {
            if id == task_id {
                return true;
            }
            cur = self.tasks.get(&id).and_then(|t| t.parent_id.clone());
        }
        false
    }

    fn validate(&self, task: &Task, ignore_id: Option<&str>) -> Result<(), ValidationError> {
        if let Some(parent) = &task.parent_id {
            if !self.tasks.contains_key(parent) || Some(parent.as_str()) == Some(task.id.as_str())
            {
                return Err(ValidationError::UnknownParent {
                    task: task.id.clone(),
                    parent: parent.clone(),
                });
            }
            if self.would_cycle(&task.id, parent) {
                return Err(ValidationError::ParentCycle {
                    task: task.id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        let sibling_conflict = self
            .tasks
            .values()
            .any(|t| {
                Some(t.id.as_str()) != ignore_id
                    && t.parent_id == task.parent_id
                    && t.sort_key == task.sort_key
            });
        if sibling_conflict {
            return Err(ValidationError::DuplicateSortKey {
                parent: task.parent_id.clone(),
                sort_key: task.sort_key.clone(),
            });
        }

        if task.is_parent() && !task.dependencies.is_empty() {
            return Err(ValidationError::ParentCannotDepend(task.id.clone()));
        }
        if task.is_blank() && !task.dependencies.is_empty() {
            return Err(ValidationError::BlankRowHasDependency(task.id.clone()));
        }
        for dep in &task.dependencies {
            if dep.pred_id == task.id {
                return Err(ValidationError::SelfDependency(task.id.clone()));
            }
            if ignore_id != Some(dep.pred_id.as_str()) && !self.tasks.contains_key(&dep.pred_id) {
                // the predecessor may be the task being inserted itself in a
                // batch load; TaskStore only checks against what is already
                // present, full acyclic-graph validation is C3's job.
                return Err(ValidationError::UnknownPredecessor {
                    task: task.id.clone(),
                    pred: dep.pred_id.clone(),
                });
            }
        }

        if !matches!(task.constraint_type, ConstraintType::ASAP) && task.constraint_date.is_none()
        {
            return Err(ValidationError::MissingConstraintDate(task.id.clone()));
        }

        if !task.has_valid_actuals() {
            return Err(ValidationError::InvalidActuals(task.id.clone()));
        }

        Ok(())
    }

    /// Inserts a new task. If `sort_key` is empty, one is generated after
    /// the current last sibling.
    pub fn insert(&mut self, mut task: Task) -> Result<Task, ValidationError> {
        if task.sort_key.is_empty() {
            let last = self.get_last_sort_key(task.parent_id.as_deref());
            task.sort_key = sortkey::key_between(last.as_deref(), None);
        }
        self.validate(&task, None)?;
        debug!(id = %task.id, "task inserted");
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    /// Applies `patch` to task `id`, validating the result before commit.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task, ValidationError> {
        let mut candidate = self
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
        patch.apply(&mut candidate);
        self.validate(&candidate, Some(id))?;
        self.tasks.insert(id.to_string(), candidate.clone());
        debug!(id, "task updated");
        Ok(candidate)
    }

    /// Removes `id` and every descendant.
    pub fn remove(&mut self, id: &str) -> Result<(), ValidationError> {
        if !self.tasks.contains_key(id) {
            return Err(ValidationError::UnknownTask(id.to_string()));
        }
        let mut to_remove = vec![id.to_string()];
        let mut frontier = vec![id.to_string()];
        while let Some(cur) = frontier.pop() {
            for child in self.get_children(Some(&cur)) {
                to_remove.push(child.id.clone());
                frontier.push(child.id.clone());
            }
        }
        for victim in &to_remove {
            self.tasks.remove(victim);
        }
        debug!(id, removed = to_remove.len(), "task removed (cascaded)");
        Ok(())
    }

    /// Moves `id` under `new_parent` with `new_sort_key`.
    pub fn move_task(
        &mut self,
        id: &str,
        new_parent: Option<TaskId>,
        new_sort_key: String,
    ) -> Result<Task, ValidationError> {
        let patch = TaskPatch {
            parent_id: Some(new_parent),
            sort_key: Some(new_sort_key),
            ..Default::default()
        };
        self.update(id, patch)
    }

    /// Replaces the entire task list (used for file import / bulk sync).
    /// Returns the first validation failure encountered, if any, in which
    /// case the store is left unchanged.
    pub fn replace_all(&mut self, tasks: Vec<Task>) -> Result<(), ValidationError> {
        let mut staged = TaskStore::new();
        for task in tasks {
            staged.tasks.insert(task.id.clone(), task);
        }
        for task in staged.tasks.values() {
            staged.validate(task, None)?;
        }
        self.tasks = staged.tasks;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Dependency, DependencyType};

    #[test]
    fn insert_generates_sort_key_when_absent() {
        let mut store = TaskStore::new();
        let t1 = Task::new("t1", "One", 1);
        let inserted = store.insert(t1).unwrap();
        assert!(!inserted.sort_key.is_empty());
    }

    #[test]
    fn duplicate_sort_key_among_siblings_is_rejected() {
        let mut store = TaskStore::new();
        let mut t1 = Task::new("t1", "One", 1);
        t1.sort_key = "A".into();
        store.insert(t1).unwrap();
        let mut t2 = Task::new("t2", "Two", 1);
        t2.sort_key = "A".into();
        assert!(store.insert(t2).is_err());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut store = TaskStore::new();
        let mut t1 = Task::new("t1", "One", 1);
        t1.sort_key = "A".into();
        t1.parent_id = Some("missing".into());
        assert!(store.insert(t1).is_err());
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut store = TaskStore::new();
        let mut t1 = Task::new("t1", "One", 1);
        t1.sort_key = "A".into();
        t1.dependencies.push(Dependency {
            pred_id: "t1".into(),
            dep_type: DependencyType::FS,
            lag: 0,
        });
        assert!(store.insert(t1).is_err());
    }

    #[test]
    fn remove_cascades_to_descendants() {
        let mut store = TaskStore::new();
        let mut parent = Task::new("p", "Parent", 0);
        parent.row_type = RowType::Summary;
        parent.sort_key = "A".into();
        store.insert(parent).unwrap();
        let mut child = Task::new("c", "Child", 1);
        child.parent_id = Some("p".into());
        child.sort_key = "A".into();
        store.insert(child).unwrap();

        store.remove("p").unwrap();
        assert!(store.get("p").is_none());
        assert!(store.get("c").is_none());
    }

    #[test]
    fn get_children_sorted_by_sort_key() {
        let mut store = TaskStore::new();
        let mut a = Task::new("a", "A", 1);
        a.sort_key = "M".into();
        let mut b = Task::new("b", "B", 1);
        b.sort_key = "A".into();
        store.insert(a).unwrap();
        store.insert(b).unwrap();
        let children = store.get_children(None);
        assert_eq!(children[0].id, "b");
        assert_eq!(children[1].id, "a");
    }

    #[test]
    fn get_visible_tasks_skips_collapsed_subtree() {
        let mut store = TaskStore::new();
        let mut parent = Task::new("p", "Parent", 0);
        parent.row_type = RowType::Summary;
        parent.sort_key = "A".into();
        parent.collapsed = true;
        store.insert(parent).unwrap();
        let mut child = Task::new("c", "Child", 1);
        child.parent_id = Some("p".into());
        child.sort_key = "A".into();
        store.insert(child).unwrap();

        let visible = store.get_visible_tasks(|t| t.collapsed);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "p");
    }

    #[test]
    fn move_rejects_cycle() {
        let mut store = TaskStore::new();
        let mut parent = Task::new("p", "Parent", 0);
        parent.row_type = RowType::Summary;
        parent.sort_key = "A".into();
        store.insert(parent).unwrap();
        let mut child = Task::new("c", "Child", 0);
        child.row_type = RowType::Summary;
        child.parent_id = Some("p".into());
        child.sort_key = "A".into();
        store.insert(child).unwrap();

        let result = store.move_task("p", Some("c".into()), "A".into());
        assert!(result.is_err());
    }
}

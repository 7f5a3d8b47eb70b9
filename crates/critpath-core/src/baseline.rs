//! Baseline snapshots (SPEC_FULL §3 "Baseline snapshots").
//!
//! A baseline is a named, immutable capture of a prior CPM result's leaf
//! task start/finish dates, used only for variance display — the CPM
//! kernel never reads baseline fields as scheduling input.

use crate::task::TaskId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub start: NaiveDate,
    pub finish: NaiveDate,
}

/// An immutable, named schedule snapshot. Baselines can be deleted and
/// recreated but never updated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub name: String,
    pub saved: DateTime<Utc>,
    pub description: Option<String>,
    /// Lineage only — never read through for field values.
    pub parent: Option<String>,
    pub tasks: BTreeMap<TaskId, TaskSnapshot>,
    pub project_finish: NaiveDate,
}

impl Baseline {
    pub fn capture(
        name: impl Into<String>,
        saved: DateTime<Utc>,
        description: Option<String>,
        parent: Option<String>,
        tasks: BTreeMap<TaskId, TaskSnapshot>,
    ) -> Self {
        let project_finish = tasks
            .values()
            .map(|t| t.finish)
            .max()
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        Self {
            name: name.into(),
            saved,
            description,
            parent,
            tasks,
            project_finish,
        }
    }
}

/// Per-task variance of the current schedule against a baseline, in signed
/// work days (positive = later than baseline).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineVariance {
    pub task_id: TaskId,
    pub start_variance_days: i64,
    pub finish_variance_days: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BaselineError {
    #[error("baseline `{0}` already exists")]
    AlreadyExists(String),
    #[error("baseline `{0}` not found")]
    NotFound(String),
}

/// Collection of baselines for a project, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct BaselineStore {
    baselines: BTreeMap<String, Baseline>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, baseline: Baseline) -> Result<(), BaselineError> {
        if self.baselines.contains_key(&baseline.name) {
            return Err(BaselineError::AlreadyExists(baseline.name));
        }
        self.baselines.insert(baseline.name.clone(), baseline);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), BaselineError> {
        self.baselines
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BaselineError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Baseline> {
        self.baselines.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &Baseline> {
        self.baselines.values()
    }

    /// Signed work-day variance of `current` (keyed by task id, using the
    /// calendar's working-day distance) against a named baseline.
    pub fn compare(
        &self,
        name: &str,
        current: &BTreeMap<TaskId, TaskSnapshot>,
        calendar: &crate::calendar::Calendar,
    ) -> Result<Vec<BaselineVariance>, BaselineError> {
        let baseline = self.get(name).ok_or_else(|| BaselineError::NotFound(name.to_string()))?;
        let mut out = Vec::new();
        for (id, snap) in current {
            if let Some(base) = baseline.tasks.get(id) {
                out.push(BaselineVariance {
                    task_id: id.clone(),
                    start_variance_days: calendar.work_days_between(base.start, snap.start),
                    finish_variance_days: calendar.work_days_between(base.finish, snap.finish),
                });
            }
        }
        Ok(out)
    }
}

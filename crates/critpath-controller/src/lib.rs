//! ProjectController (C7): the single owner of a project's task store,
//! calendar, and baselines. Every mutation goes through the operation queue
//! (C6); every queued batch that mutates state triggers exactly one
//! coalesced CPM recomputation, published to `tasks$`/`calendar$`
//! subscribers (§4.7, §5).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use critpath_core::{
    Baseline, BaselineStore, Calendar, Dependency, Task, TaskId, TaskPatch, TaskSnapshot,
    TaskStore,
};
use critpath_queue::{OperationEffect, OperationQueue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// One entry in the append-only event log (§6.2). `payload` carries
/// whatever shape is documented per `kind`; the controller never replays
/// these itself (persistence is the caller's concern) but keeps them in
/// memory so a caller can drain and persist them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TaskAdded,
    TaskUpdated,
    TaskDeleted,
    TaskMoved,
    CalendarUpdated,
    BaselineSet,
    BaselineCleared,
    /// The trade-partner directory itself is out of scope; this kind is
    /// part of the event taxonomy but nothing in this crate emits it.
    TradePartnerCreated,
}

/// A fully-merged, immutable result of one CPM run (or, on failure, the
/// previous one re-published alongside `run_error` — §7 "failed run
/// re-publishes previous snapshot plus an error flag").
#[derive(Debug, Clone)]
pub struct PublishedSnapshot {
    pub tasks: Vec<Task>,
    pub project_start: NaiveDate,
    pub project_finish: NaiveDate,
    pub diagnostics: Vec<critpath_engine::Diagnostic>,
    pub run_error: Option<String>,
}

impl Default for PublishedSnapshot {
    fn default() -> Self {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        Self {
            tasks: Vec::new(),
            project_start: epoch,
            project_finish: epoch,
            diagnostics: Vec::new(),
            run_error: None,
        }
    }
}

struct Inner {
    store: TaskStore,
    calendar: Calendar,
    baselines: BaselineStore,
    project_start: NaiveDate,
    events: Vec<Event>,
}

/// Owns a project's mutable state and serializes access to it through an
/// [`OperationQueue`]. Cloning shares the same underlying state and queue.
#[derive(Clone)]
pub struct ProjectController {
    inner: Arc<Mutex<Inner>>,
    queue: OperationQueue,
    tasks_tx: Arc<watch::Sender<PublishedSnapshot>>,
    tasks_rx: watch::Receiver<PublishedSnapshot>,
    calendar_tx: Arc<watch::Sender<Calendar>>,
    calendar_rx: watch::Receiver<Calendar>,
}

impl ProjectController {
    /// Creates a controller over an empty project. `project_start` is the
    /// user-specified project start (§4.4.1's "earliest of user-specified
    /// project start or earliest unbounded predecessor" — this crate takes
    /// the explicit, always-available branch of that resolution; see
    /// DESIGN.md).
    pub fn new(calendar: Calendar, project_start: NaiveDate) -> Self {
        let (tasks_tx, tasks_rx) = watch::channel(PublishedSnapshot::default());
        let (calendar_tx, calendar_rx) = watch::channel(calendar.clone());
        let tasks_tx = Arc::new(tasks_tx);
        let inner = Arc::new(Mutex::new(Inner {
            store: TaskStore::new(),
            calendar,
            baselines: BaselineStore::new(),
            project_start,
            events: Vec::new(),
        }));

        let recompute_inner = inner.clone();
        let recompute_tx = tasks_tx.clone();
        let queue = OperationQueue::spawn(move || {
            let guard = recompute_inner.lock().expect("controller mutex poisoned");
            let all_tasks = guard.store.get_all();
            let calendar = guard.calendar.clone();
            let project_start = guard.project_start;
            let active = active_baseline_tasks(&guard.baselines);
            drop(guard);

            match critpath_engine::schedule(&all_tasks, &calendar, project_start) {
                Ok(out) => {
                    let mut tasks = out.tasks;
                    apply_baseline_display_fields(&mut tasks, &active);
                    info!(project_finish = %out.project_finish, "recompute published");
                    let _ = recompute_tx.send(PublishedSnapshot {
                        tasks,
                        project_start: out.project_start,
                        project_finish: out.project_finish,
                        diagnostics: out.diagnostics,
                        run_error: None,
                    });
                }
                Err(e) => {
                    error!(error = %e, "CPM recompute failed, re-publishing previous snapshot");
                    let previous = recompute_tx.borrow().clone();
                    let _ = recompute_tx.send(PublishedSnapshot {
                        run_error: Some(e.to_string()),
                        ..previous
                    });
                }
            }
        });

        Self {
            inner,
            queue,
            tasks_tx,
            tasks_rx,
            calendar_tx: Arc::new(calendar_tx),
            calendar_rx,
        }
    }

    fn push_event(&self, kind: EventKind, entity_id: impl Into<String>, payload: serde_json::Value) {
        let mut guard = self.inner.lock().expect("controller mutex poisoned");
        guard.events.push(Event {
            kind,
            entity_id: entity_id.into(),
            payload,
            timestamp: Utc::now(),
        });
    }

    /// Every event recorded so far, in order. Persistence is the caller's
    /// concern; the controller only accumulates them in memory.
    pub fn drain_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.inner.lock().expect("controller mutex poisoned").events)
    }

    pub async fn add_task(&self, task: Task) -> Result<()> {
        let id = task.id.clone();
        let payload = serde_json::to_value(&task).unwrap_or(serde_json::Value::Null);
        let inner = self.inner.clone();
        self.run_mutation(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .store
                .insert(task)
                .map(|_| ())
        })
        .await?;
        self.push_event(EventKind::TaskAdded, id, payload);
        Ok(())
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<()> {
        let id = id.to_string();
        let payload = patch_display(&patch);
        let inner = self.inner.clone();
        let id_for_closure = id.clone();
        self.run_mutation(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .store
                .update(&id_for_closure, patch)
                .map(|_| ())
        })
        .await?;
        self.push_event(EventKind::TaskUpdated, id, payload);
        Ok(())
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let inner = self.inner.clone();
        let id_for_closure = id.clone();
        self.run_mutation(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .store
                .remove(&id_for_closure)
        })
        .await?;
        self.push_event(EventKind::TaskDeleted, id, serde_json::Value::Null);
        Ok(())
    }

    pub async fn move_task(
        &self,
        id: &str,
        new_parent: Option<TaskId>,
        new_sort_key: String,
    ) -> Result<()> {
        let id = id.to_string();
        let payload = serde_json::json!({ "parentId": new_parent, "sortKey": new_sort_key });
        let inner = self.inner.clone();
        let id_for_closure = id.clone();
        self.run_mutation(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .store
                .move_task(&id_for_closure, new_parent, new_sort_key)
                .map(|_| ())
        })
        .await?;
        self.push_event(EventKind::TaskMoved, id, payload);
        Ok(())
    }

    /// Replaces the project calendar. Unlike the baseline operations, this
    /// mutates scheduling-relevant state and triggers the usual coalesced
    /// recomputation.
    pub async fn update_calendar(&self, calendar: Calendar) -> Result<()> {
        let inner = self.inner.clone();
        let calendar_tx = self.calendar_tx.clone();
        let calendar_for_closure = calendar.clone();
        self.queue
            .enqueue(move || {
                inner.lock().expect("controller mutex poisoned").calendar =
                    calendar_for_closure.clone();
                let _ = calendar_tx.send(calendar_for_closure);
                OperationEffect::Mutating
            })
            .await
            .context("operation queue closed")?;
        self.push_event(EventKind::CalendarUpdated, "calendar", serde_json::Value::Null);
        Ok(())
    }

    /// Bulk replace, used for file import / full sync (§4.2 `syncTasks`).
    pub async fn sync_tasks(&self, tasks: Vec<Task>) -> Result<()> {
        let inner = self.inner.clone();
        self.run_mutation(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .store
                .replace_all(tasks)
        })
        .await?;
        self.push_event(EventKind::TaskUpdated, "sync", serde_json::Value::Null);
        Ok(())
    }

    /// Captures the last published snapshot as a new named baseline. This
    /// never triggers a recomputation (§4.7 — "view-only in the sense that
    /// [baseline ops] read the last published snapshot").
    pub async fn set_baseline(&self, name: impl Into<String>, description: Option<String>) -> Result<()> {
        let name = name.into();
        let payload = serde_json::json!({ "name": name, "description": description });
        let snapshot = self.tasks_rx.borrow().clone();
        let tasks = snapshot_tasks_from_published(&snapshot);
        let baseline = Baseline::capture(name.clone(), Utc::now(), description, None, tasks);
        let inner = self.inner.clone();
        self.run_baseline_op(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .baselines
                .add(baseline)
        })
        .await?;
        self.push_event(EventKind::BaselineSet, name, payload);
        Ok(())
    }

    pub async fn clear_baseline(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        let inner = self.inner.clone();
        let name_for_closure = name.clone();
        self.run_baseline_op(move || {
            inner
                .lock()
                .expect("controller mutex poisoned")
                .baselines
                .remove(&name_for_closure)
        })
        .await?;
        self.push_event(
            EventKind::BaselineCleared,
            name.clone(),
            serde_json::json!({ "name": name }),
        );
        Ok(())
    }

    /// Read-only controller query, not a queue operation (§4.7).
    pub fn list_baselines(&self) -> Vec<Baseline> {
        self.inner
            .lock()
            .expect("controller mutex poisoned")
            .baselines
            .list()
            .cloned()
            .collect()
    }

    /// Signed work-day variance of the current published snapshot against
    /// a named baseline, per leaf task. Read-only controller query.
    pub fn compare_to_baseline(&self, name: &str) -> Result<Vec<critpath_core::BaselineVariance>> {
        let guard = self.inner.lock().expect("controller mutex poisoned");
        let snapshot = self.tasks_rx.borrow().clone();
        let current = snapshot_tasks_from_published(&snapshot);
        guard
            .baselines
            .compare(name, &current, &guard.calendar)
            .context("baseline comparison failed")
    }

    /// The raw task store's contents, *before* the next CPM run fills in
    /// derived fields — use [`Self::subscribe_tasks`] for the scheduled
    /// view.
    pub fn get_tasks(&self) -> Vec<Task> {
        self.inner.lock().expect("controller mutex poisoned").store.get_all()
    }

    pub fn get_calendar(&self) -> Calendar {
        self.inner.lock().expect("controller mutex poisoned").calendar.clone()
    }

    /// The `tasks$` reactive stream (§4.7): a watch receiver of the latest
    /// published snapshot.
    pub fn subscribe_tasks(&self) -> watch::Receiver<PublishedSnapshot> {
        self.tasks_rx.clone()
    }

    /// The `calendar$` reactive stream.
    pub fn subscribe_calendar(&self) -> watch::Receiver<Calendar> {
        self.calendar_rx.clone()
    }

    async fn run_mutation<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce() -> Result<(), critpath_core::ValidationError> + Send + 'static,
    {
        let result: Arc<Mutex<Option<Result<(), critpath_core::ValidationError>>>> =
            Arc::new(Mutex::new(None));
        let result_for_closure = result.clone();
        self.queue
            .enqueue(move || {
                let r = op();
                if r.is_err() {
                    warn!("queued mutation rejected by validation");
                }
                *result_for_closure.lock().expect("result mutex poisoned") = Some(r);
                OperationEffect::Mutating
            })
            .await
            .context("operation queue closed")?;
        result
            .lock()
            .expect("result mutex poisoned")
            .take()
            .expect("operation queue did not run the enqueued op")
            .context("task mutation failed validation")
    }

    async fn run_baseline_op<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce() -> Result<(), critpath_core::BaselineError> + Send + 'static,
    {
        let result: Arc<Mutex<Option<Result<(), critpath_core::BaselineError>>>> =
            Arc::new(Mutex::new(None));
        let result_for_closure = result.clone();
        self.queue
            .enqueue(move || {
                *result_for_closure.lock().expect("result mutex poisoned") = Some(op());
                OperationEffect::ViewOnly
            })
            .await
            .context("operation queue closed")?;
        result
            .lock()
            .expect("result mutex poisoned")
            .take()
            .expect("operation queue did not run the enqueued op")
            .context("baseline operation failed")
    }
}

fn patch_display(patch: &TaskPatch) -> serde_json::Value {
    serde_json::json!({
        "name": patch.name,
        "durationChanged": patch.duration.is_some(),
        "dependenciesChanged": patch.dependencies.is_some(),
    })
}

fn active_baseline_tasks(baselines: &BaselineStore) -> BTreeMap<TaskId, TaskSnapshot> {
    // Baseline selection beyond "the most recently set baseline" is a
    // view-layer concern outside this crate's scope; display fields use
    // whichever baseline was captured last, if any.
    baselines.list().last().map(|b| b.tasks.clone()).unwrap_or_default()
}

fn apply_baseline_display_fields(tasks: &mut [Task], active: &BTreeMap<TaskId, TaskSnapshot>) {
    for t in tasks.iter_mut() {
        if let Some(snap) = active.get(&t.id) {
            t.baseline_start = Some(snap.start);
            t.baseline_finish = Some(snap.finish);
            t.baseline_duration = t.baseline_duration.or(Some(t.duration));
        }
    }
}

fn snapshot_tasks_from_published(snapshot: &PublishedSnapshot) -> BTreeMap<TaskId, TaskSnapshot> {
    snapshot
        .tasks
        .iter()
        .filter(|t| t.is_leaf())
        .filter_map(|t| {
            Some((
                t.id.clone(),
                TaskSnapshot {
                    task_id: t.id.clone(),
                    start: t.start?,
                    finish: t.end?,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use critpath_core::DependencyType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn add_task_publishes_a_schedule() {
        let controller = ProjectController::new(Calendar::standard_five_day(), date(2024, 1, 1));
        let mut t = Task::new("t1", "Solo", 3);
        t.sort_key = "A".into();
        controller.add_task(t).await.unwrap();
        let snapshot = controller.subscribe_tasks().borrow().clone();
        let t1 = snapshot.tasks.iter().find(|t| t.id == "t1").unwrap();
        assert_eq!(t1.start, Some(date(2024, 1, 1)));
        assert_eq!(t1.end, Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn invalid_mutation_is_rejected_without_poisoning_the_queue() {
        let controller = ProjectController::new(Calendar::standard_five_day(), date(2024, 1, 1));
        let mut bad = Task::new("t1", "Bad", 1);
        bad.sort_key = "A".into();
        bad.parent_id = Some("missing".into());
        assert!(controller.add_task(bad).await.is_err());

        let mut good = Task::new("t2", "Good", 1);
        good.sort_key = "A".into();
        controller.add_task(good).await.unwrap();
        let snapshot = controller.subscribe_tasks().borrow().clone();
        assert!(snapshot.tasks.iter().any(|t| t.id == "t2"));
    }

    #[tokio::test]
    async fn set_and_compare_baseline() {
        let controller = ProjectController::new(Calendar::standard_five_day(), date(2024, 1, 1));
        let mut t = Task::new("t1", "Solo", 3);
        t.sort_key = "A".into();
        controller.add_task(t).await.unwrap();

        controller.set_baseline("v1", None).await.unwrap();
        let baselines = controller.list_baselines();
        assert_eq!(baselines.len(), 1);

        controller
            .update_task(
                "t1",
                TaskPatch {
                    duration: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let variance = controller.compare_to_baseline("v1").unwrap();
        assert_eq!(variance[0].task_id, "t1");
        assert!(variance[0].finish_variance_days >= 2);
    }

    #[tokio::test]
    async fn fs_dependency_schedules_successor_after_predecessor() {
        let controller = ProjectController::new(Calendar::standard_five_day(), date(2024, 1, 1));
        let mut t1 = Task::new("t1", "T1", 3);
        t1.sort_key = "A".into();
        let mut t2 = Task::new("t2", "T2", 2);
        t2.sort_key = "B".into();
        t2.dependencies.push(Dependency {
            pred_id: "t1".into(),
            dep_type: DependencyType::FS,
            lag: 0,
        });
        controller.add_task(t1).await.unwrap();
        controller.add_task(t2).await.unwrap();

        let snapshot = controller.subscribe_tasks().borrow().clone();
        let t2 = snapshot.tasks.iter().find(|t| t.id == "t2").unwrap();
        assert_eq!(t2.start, Some(date(2024, 1, 4)));
    }

    #[tokio::test]
    async fn event_log_records_task_added() {
        let controller = ProjectController::new(Calendar::standard_five_day(), date(2024, 1, 1));
        let mut t = Task::new("t1", "Solo", 1);
        t.sort_key = "A".into();
        controller.add_task(t).await.unwrap();
        let events = controller.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::TaskAdded);
        assert!(controller.drain_events().is_empty());
    }
}

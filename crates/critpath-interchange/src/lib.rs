//! Native JSON and MS Project (MSPDI) import/export (§6.3). Each format is
//! an [`Importer`]/[`Exporter`] pair; the CPM kernel never depends on this
//! crate, only the other direction.

pub mod json;
pub mod mspdi;

pub use json::JsonFormat;
pub use mspdi::MspdiFormat;

use critpath_core::{Calendar, Task};
use thiserror::Error;

/// The full round-trippable unit: the task list plus the project calendar.
#[derive(Debug, Clone)]
pub struct ProjectFile {
    pub tasks: Vec<Task>,
    pub calendar: Calendar,
}

/// Parses a format into a [`ProjectFile`]. Malformed input is always a
/// [`InterchangeError`], never a panic.
pub trait Importer {
    fn import(&self, input: &str) -> Result<ProjectFile, InterchangeError>;
}

/// Serializes a [`ProjectFile`] into a format's textual representation.
pub trait Exporter {
    fn export(&self, project: &ProjectFile) -> Result<String, InterchangeError>;
}

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error(transparent)]
    Validation(#[from] critpath_core::ValidationError),

    #[error(transparent)]
    Core(#[from] critpath_core::CoreError),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed XML: {0}")]
    Xml(String),
}

/// Fills in a sort key for any task missing one, preserving the relative
/// order tasks already arrived in (file array position, per §6.3), so
/// imported files that never carried a `sortKey` (e.g. a fresh MSPDI
/// export from another tool) still produce a well-formed sibling order.
fn regenerate_missing_sort_keys(tasks: &mut [Task]) {
    use std::collections::HashMap;
    let mut last_key_per_parent: HashMap<Option<String>, String> = HashMap::new();
    for t in tasks.iter_mut() {
        if t.sort_key.is_empty() {
            let last = last_key_per_parent.get(&t.parent_id).cloned();
            t.sort_key = critpath_core::sortkey::key_between(last.as_deref(), None);
        }
        last_key_per_parent.insert(t.parent_id.clone(), t.sort_key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critpath_core::Task;

    #[test]
    fn regenerates_sort_keys_in_array_order() {
        let mut tasks = vec![Task::new("a", "A", 1), Task::new("b", "B", 1)];
        regenerate_missing_sort_keys(&mut tasks);
        assert!(!tasks[0].sort_key.is_empty());
        assert!(tasks[0].sort_key < tasks[1].sort_key);
    }

    #[test]
    fn preserves_an_existing_sort_key() {
        let mut tasks = vec![Task::new("a", "A", 1)];
        tasks[0].sort_key = "Z".into();
        regenerate_missing_sort_keys(&mut tasks);
        assert_eq!(tasks[0].sort_key, "Z");
    }
}

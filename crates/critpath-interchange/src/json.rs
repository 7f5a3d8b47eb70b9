//! Native JSON interchange: `{ tasks, calendar }`, the wire shape the
//! controller's own task/calendar model already speaks via `serde`.

use crate::{regenerate_missing_sort_keys, Exporter, Importer, InterchangeError, ProjectFile};
use critpath_core::{Calendar, Task};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeFile {
    tasks: Vec<Task>,
    calendar: Calendar,
}

/// The project's own `{tasks, calendar}` JSON representation.
pub struct JsonFormat;

impl Importer for JsonFormat {
    fn import(&self, input: &str) -> Result<ProjectFile, InterchangeError> {
        let file: NativeFile = serde_json::from_str(input)?;
        let mut tasks = file.tasks;
        regenerate_missing_sort_keys(&mut tasks);
        Ok(ProjectFile {
            tasks,
            calendar: file.calendar,
        })
    }
}

impl Exporter for JsonFormat {
    fn export(&self, project: &ProjectFile) -> Result<String, InterchangeError> {
        let file = NativeFile {
            tasks: project.tasks.clone(),
            calendar: project.calendar.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critpath_core::RowType;

    #[test]
    fn round_trips_a_small_project() {
        let mut t1 = Task::new("t1", "Dig footings", 3);
        t1.sort_key = "A".into();
        let project = ProjectFile {
            tasks: vec![t1],
            calendar: Calendar::standard_five_day(),
        };
        let exported = JsonFormat.export(&project).unwrap();
        let imported = JsonFormat.import(&exported).unwrap();
        assert_eq!(imported.tasks.len(), 1);
        assert_eq!(imported.tasks[0].id, "t1");
        assert_eq!(imported.calendar, project.calendar);
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        let err = JsonFormat.import("{ not json");
        assert!(err.is_err());
    }

    #[test]
    fn import_regenerates_missing_sort_keys() {
        let a = Task::new("a", "A", 1); // sort_key left empty by Task::new
        let project = ProjectFile {
            tasks: vec![a],
            calendar: Calendar::standard_five_day(),
        };
        let exported = JsonFormat.export(&project).unwrap();
        let imported = JsonFormat.import(&exported).unwrap();
        assert!(!imported.tasks[0].sort_key.is_empty());
        assert_eq!(imported.tasks[0].row_type, RowType::Task);
    }
}

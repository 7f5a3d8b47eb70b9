//! MS Project XML (MSPDI) interchange: a subset of the MSPDI 2007+ schema
//! sufficient to round-trip task id/name/start/finish/duration,
//! predecessor links (type + lag), constraint type/date, percent complete,
//! and the project calendar's working days and exceptions (§6.3).
//!
//! This is a subset, not a full MSPDI implementation: summary/blank row
//! distinctions beyond a `Summary` flag, scheduling mode, baselines, and
//! trade partners have no MSPDI counterpart and are dropped on export.

use crate::{regenerate_missing_sort_keys, Exporter, Importer, InterchangeError, ProjectFile};
use chrono::{NaiveDate, Weekday};
use critpath_core::{
    Calendar, CalendarException, ConstraintType, Dependency, DependencyType, RowType, Task,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "Project")]
struct XmlProject {
    #[serde(rename = "Tasks", default)]
    tasks: XmlTasks,
    #[serde(rename = "Calendars", default)]
    calendars: XmlCalendars,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlTasks {
    #[serde(rename = "Task", default)]
    task: Vec<XmlTask>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlTask {
    #[serde(rename = "UID")]
    uid: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ParentUID", skip_serializing_if = "Option::is_none", default)]
    parent_uid: Option<String>,
    #[serde(rename = "SortKey", skip_serializing_if = "Option::is_none", default)]
    sort_key: Option<String>,
    #[serde(rename = "Summary", default)]
    summary: bool,
    #[serde(rename = "Start", skip_serializing_if = "Option::is_none", default)]
    start: Option<NaiveDate>,
    #[serde(rename = "Finish", skip_serializing_if = "Option::is_none", default)]
    finish: Option<NaiveDate>,
    /// A plain work-day count rather than MSPDI's ISO-8601 `PT..H..M..S`
    /// duration encoding — sufficient to round-trip within this
    /// application, not to interoperate with Microsoft Project itself.
    #[serde(rename = "DurationWorkDays")]
    duration_work_days: u32,
    #[serde(rename = "PercentComplete", default)]
    percent_complete: u8,
    #[serde(rename = "ConstraintType", default)]
    constraint_type: ConstraintType,
    #[serde(rename = "ConstraintDate", skip_serializing_if = "Option::is_none", default)]
    constraint_date: Option<NaiveDate>,
    #[serde(rename = "ActualStart", skip_serializing_if = "Option::is_none", default)]
    actual_start: Option<NaiveDate>,
    #[serde(rename = "ActualFinish", skip_serializing_if = "Option::is_none", default)]
    actual_finish: Option<NaiveDate>,
    #[serde(rename = "PredecessorLink", default)]
    predecessor_link: Vec<XmlPredecessorLink>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlPredecessorLink {
    #[serde(rename = "PredecessorUID")]
    predecessor_uid: String,
    #[serde(rename = "Type", default)]
    link_type: DependencyType,
    #[serde(rename = "LinkLag", default)]
    link_lag: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlCalendars {
    #[serde(rename = "Calendar", default)]
    calendar: Vec<XmlCalendar>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlCalendar {
    #[serde(rename = "WeekDays", default)]
    week_days: XmlWeekDays,
    #[serde(rename = "Exceptions", default)]
    exceptions: XmlExceptions,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlWeekDays {
    #[serde(rename = "WeekDay", default)]
    week_day: Vec<XmlWeekDay>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlWeekDay {
    #[serde(rename = "DayType")]
    day_type: String,
    #[serde(rename = "DayWorking")]
    day_working: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlExceptions {
    #[serde(rename = "TimePeriod", default)]
    time_period: Vec<XmlException>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlException {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Working")]
    working: bool,
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none", default)]
    name: Option<String>,
}

/// MS Project XML (MSPDI) subset format.
pub struct MspdiFormat;

impl Importer for MspdiFormat {
    fn import(&self, input: &str) -> Result<ProjectFile, InterchangeError> {
        let doc: XmlProject =
            quick_xml::de::from_str(input).map_err(|e| InterchangeError::Xml(e.to_string()))?;

        let mut tasks = Vec::with_capacity(doc.tasks.task.len());
        for xt in &doc.tasks.task {
            let mut dependencies = Vec::with_capacity(xt.predecessor_link.len());
            for link in &xt.predecessor_link {
                dependencies.push(Dependency {
                    pred_id: link.predecessor_uid.clone(),
                    dep_type: link.link_type,
                    lag: link.link_lag,
                });
            }
            let mut task = Task::new(xt.uid.clone(), xt.name.clone(), xt.duration_work_days);
            task.row_type = if xt.summary { RowType::Summary } else { RowType::Task };
            task.parent_id = xt.parent_uid.clone();
            task.sort_key = xt.sort_key.clone().unwrap_or_default();
            task.start = xt.start;
            task.end = xt.finish;
            task.dependencies = dependencies;
            task.constraint_type = xt.constraint_type;
            task.constraint_date = xt.constraint_date;
            task.actual_start = xt.actual_start;
            task.actual_finish = xt.actual_finish;
            task.progress = xt.percent_complete;
            tasks.push(task);
        }
        regenerate_missing_sort_keys(&mut tasks);

        let calendar = import_calendar(&doc.calendars)?;
        Ok(ProjectFile { tasks, calendar })
    }
}

impl Exporter for MspdiFormat {
    fn export(&self, project: &ProjectFile) -> Result<String, InterchangeError> {
        let mut task_elems = Vec::with_capacity(project.tasks.len());
        for t in &project.tasks {
            if t.is_blank() {
                // Blank rows are a view-layer concept with no MSPDI
                // equivalent; they are dropped, not round-tripped.
                continue;
            }
            let predecessor_link = t
                .dependencies
                .iter()
                .map(|d| XmlPredecessorLink {
                    predecessor_uid: d.pred_id.clone(),
                    link_type: d.dep_type,
                    link_lag: d.lag,
                })
                .collect();
            task_elems.push(XmlTask {
                uid: t.id.clone(),
                name: t.name.clone(),
                parent_uid: t.parent_id.clone(),
                sort_key: Some(t.sort_key.clone()),
                summary: t.is_parent(),
                start: t.start,
                finish: t.end,
                duration_work_days: t.duration,
                percent_complete: t.progress,
                constraint_type: t.constraint_type,
                constraint_date: t.constraint_date,
                actual_start: t.actual_start,
                actual_finish: t.actual_finish,
                predecessor_link,
            });
        }

        let doc = XmlProject {
            tasks: XmlTasks { task: task_elems },
            calendars: export_calendar(&project.calendar),
        };
        quick_xml::se::to_string(&doc).map_err(|e| InterchangeError::Xml(e.to_string()))
    }
}

fn import_calendar(calendars: &XmlCalendars) -> Result<Calendar, InterchangeError> {
    let Some(cal) = calendars.calendar.first() else {
        return Ok(Calendar::standard_five_day());
    };

    let mut working_days = BTreeSet::new();
    for wd in &cal.week_days.week_day {
        if !wd.day_working {
            continue;
        }
        let weekday = Weekday::from_str(&wd.day_type).map_err(|_| {
            InterchangeError::Xml(format!("unrecognized weekday `{}`", wd.day_type))
        })?;
        working_days.insert(weekday);
    }

    let mut exceptions = BTreeMap::new();
    for ex in &cal.exceptions.time_period {
        exceptions.insert(
            ex.date,
            CalendarException {
                working: ex.working,
                name: ex.name.clone(),
            },
        );
    }

    Calendar::new(working_days, exceptions).map_err(InterchangeError::Core)
}

fn export_calendar(calendar: &Calendar) -> XmlCalendars {
    let week_day = calendar
        .working_days()
        .iter()
        .map(|d| XmlWeekDay {
            day_type: d.to_string(),
            day_working: true,
        })
        .collect();
    let time_period = calendar
        .exceptions()
        .iter()
        .map(|(date, ex)| XmlException {
            date: *date,
            working: ex.working,
            name: ex.name.clone(),
        })
        .collect();
    XmlCalendars {
        calendar: vec![XmlCalendar {
            week_days: XmlWeekDays { week_day },
            exceptions: XmlExceptions { time_period },
        }],
    }
}

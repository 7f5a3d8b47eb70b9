//! Rendering a published [`critpath_engine::ScheduleOutput`] to text or
//! JSON (§6.4 `--format text|json`), and the `baseline compare` variance
//! table.

use chrono::NaiveDate;
use critpath_core::BaselineVariance;
use critpath_engine::ScheduleOutput;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonReport<'a> {
    project_start: NaiveDate,
    project_finish: NaiveDate,
    tasks: &'a [critpath_core::Task],
    diagnostics: Vec<JsonDiagnostic>,
}

#[derive(Serialize)]
struct JsonDiagnostic {
    task_id: String,
    message: String,
}

pub fn write_json(out: &ScheduleOutput, writer: &mut impl Write) -> anyhow::Result<()> {
    let report = JsonReport {
        project_start: out.project_start,
        project_finish: out.project_finish,
        tasks: &out.tasks,
        diagnostics: out
            .diagnostics
            .iter()
            .map(|d| JsonDiagnostic {
                task_id: d.task_id.clone(),
                message: d.message.clone(),
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

pub fn write_text(out: &ScheduleOutput, writer: &mut impl Write) -> anyhow::Result<()> {
    writeln!(
        writer,
        "project: {} -> {}",
        out.project_start, out.project_finish
    )?;
    writeln!(
        writer,
        "{:<12} {:<28} {:>5} {:>11} {:>11} {:>6} {:<8} {:<6}",
        "id", "name", "dur", "start", "end", "float", "critical", "driver"
    )?;
    let mut tasks: Vec<&critpath_core::Task> = out.tasks.iter().collect();
    tasks.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
    for task in tasks {
        if task.is_blank() {
            continue;
        }
        let start = task.start.map(|d| d.to_string()).unwrap_or_default();
        let end = task.end.map(|d| d.to_string()).unwrap_or_default();
        let float = task
            .derived
            .total_float
            .map(|f| f.to_string())
            .unwrap_or_default();
        writeln!(
            writer,
            "{:<12} {:<28} {:>5} {:>11} {:>11} {:>6} {:<8} {:<6}",
            task.id,
            truncate(&task.name, 28),
            task.duration,
            start,
            end,
            float,
            if task.derived.is_critical { "yes" } else { "" },
            if task.derived.is_driver { "yes" } else { "" },
        )?;
    }
    if !out.diagnostics.is_empty() {
        writeln!(writer)?;
        for d in &out.diagnostics {
            writeln!(writer, "warning[constraint-infeasible]: {}", d.message)?;
        }
    }
    Ok(())
}

pub fn write_variance(variance: &[BaselineVariance], writer: &mut impl Write) -> anyhow::Result<()> {
    writeln!(
        writer,
        "{:<12} {:>10} {:>10}",
        "id", "start Δ", "finish Δ"
    )?;
    for v in variance {
        writeln!(
            writer,
            "{:<12} {:>+10} {:>+10}",
            v.task_id, v.start_variance_days, v.finish_variance_days
        )?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

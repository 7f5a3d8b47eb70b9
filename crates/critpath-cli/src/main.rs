//! `schedule` — headless CLI for the critpath CPM scheduling engine (§6.4).
//!
//! A thin driver over `critpath-engine`/`critpath-controller`/
//! `critpath-interchange`: every subcommand loads a project file, runs one
//! library operation, and prints the result. There is no daemon and no
//! persistent queue across invocations — each run starts from the file on
//! disk, per §6.4's "the CLI has no persistent queue across invocations".

mod config;
mod output;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use critpath_controller::ProjectController;
use critpath_core::{Baseline, BaselineStore, CoreError, Task, TaskSnapshot};
use critpath_engine::EngineError;
use critpath_interchange::{Exporter, Importer, JsonFormat, MspdiFormat, ProjectFile};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::FileConfig;

#[derive(Parser)]
#[command(name = "schedule")]
#[command(author, version, about = "Headless Critical Path scheduling engine", long_about = None)]
struct Cli {
    /// Verbose output: -v raises the default level to info, -vv to debug.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optional calendar/project-start overrides (§12).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs one CPM pass and prints/writes the published snapshot.
    Compute {
        input: PathBuf,
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Project start date to schedule against; defaults to today.
        #[arg(long, value_name = "DATE")]
        as_of: Option<NaiveDate>,
    },
    /// Validates invariants and reports findings without a full compute.
    Check {
        input: PathBuf,
        /// Treat recorded `ConstraintInfeasible` findings as failures.
        #[arg(long)]
        strict: bool,
    },
    /// Round-trips a project between the native JSON and MSPDI formats.
    Convert {
        input: PathBuf,
        #[arg(long = "to", value_enum)]
        to: InterchangeFormat,
        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Baseline snapshot operations (§3 "Baseline snapshots").
    Baseline {
        #[command(subcommand)]
        action: BaselineCommand,
    },
}

#[derive(Subcommand)]
enum BaselineCommand {
    /// Captures the current schedule as a named baseline.
    Set {
        input: PathBuf,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Compares the current schedule against a previously captured baseline.
    Compare { input: PathBuf, name: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InterchangeFormat {
    Json,
    Mspdi,
}

/// Errors surfaced at the top level carry a stable, machine-readable
/// `kind` and a distinct exit code per §7's "short human message and a
/// stable error code" / §6.4's "machine-readable error".
#[derive(Debug, thiserror::Error)]
enum CliFailure {
    #[error("{0}")]
    Cycle(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Other(anyhow::Error),
}

impl CliFailure {
    fn kind(&self) -> &'static str {
        match self {
            Self::Cycle(_) => "CycleError",
            Self::Validation(_) => "ValidationError",
            Self::Config(_) => "ConfigError",
            Self::Other(_) => "Error",
        }
    }

    fn exit_code(&self) -> u8 {
        match self {
            Self::Cycle(_) => 2,
            Self::Validation(_) => 3,
            Self::Config(_) => 4,
            Self::Other(_) => 1,
        }
    }
}

impl From<anyhow::Error> for CliFailure {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => match FileConfig::load(path) {
            Ok(c) => c,
            Err(e) => return emit_failure(&CliFailure::Config(e.to_string())),
        },
        None => FileConfig::default(),
    };

    let result = match &cli.command {
        Commands::Compute {
            input,
            output,
            format,
            as_of,
        } => run_compute(input, output.as_deref(), *format, *as_of, &config),
        Commands::Check { input, strict } => run_check(input, *strict),
        Commands::Convert { input, to, output } => run_convert(input, *to, output),
        Commands::Baseline { action } => match action {
            BaselineCommand::Set {
                input,
                name,
                description,
            } => run_baseline_set(input, name, description.clone()),
            BaselineCommand::Compare { input, name } => run_baseline_compare(input, name),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => emit_failure(&failure),
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn emit_failure(failure: &CliFailure) -> ExitCode {
    let body = serde_json::json!({
        "error": {
            "kind": failure.kind(),
            "message": failure.to_string(),
        }
    });
    eprintln!("{body}");
    ExitCode::from(failure.exit_code())
}

fn run_compute(
    input: &Path,
    output: Option<&Path>,
    format: OutputFormat,
    as_of: Option<NaiveDate>,
    config: &FileConfig,
) -> Result<(), CliFailure> {
    let project = load_project(input)?;
    let calendar = config
        .calendar()
        .map_err(|e| CliFailure::Config(e.to_string()))?
        .unwrap_or(project.calendar);
    let project_start = as_of
        .or(config.project_start)
        .unwrap_or_else(today);

    let out = critpath_engine::schedule(&project.tasks, &calendar, project_start)
        .map_err(engine_error_to_failure)?;

    let mut buf = Vec::new();
    match format {
        OutputFormat::Text => output::write_text(&out, &mut buf),
        OutputFormat::Json => output::write_json(&out, &mut buf),
    }
    .map_err(CliFailure::from)?;

    match output {
        Some(path) => std::fs::write(path, &buf)
            .with_context(|| format!("writing `{}`", path.display()))
            .map_err(CliFailure::from),
        None => {
            std::io::Write::write_all(&mut std::io::stdout(), &buf)
                .context("writing to stdout")
                .map_err(CliFailure::from)
        }
    }
}

fn run_check(input: &Path, strict: bool) -> Result<(), CliFailure> {
    let project = load_project(input)?;

    let mut store = critpath_core::TaskStore::new();
    store
        .replace_all(project.tasks.clone())
        .map_err(|e| CliFailure::Validation(e.to_string()))?;

    let project_start = today();
    let out = critpath_engine::schedule(&project.tasks, &project.calendar, project_start)
        .map_err(engine_error_to_failure)?;

    for d in &out.diagnostics {
        eprintln!("warning[constraint-infeasible]: {}", d.message);
    }
    if strict && !out.diagnostics.is_empty() {
        return Err(CliFailure::Validation(format!(
            "{} constraint-infeasible finding(s) (--strict)",
            out.diagnostics.len()
        )));
    }

    println!(
        "ok: {} task(s), no invariant violations, no dependency cycles",
        project.tasks.len()
    );
    Ok(())
}

fn run_convert(input: &Path, to: InterchangeFormat, output: &Path) -> Result<(), CliFailure> {
    let project = load_project(input)?;
    let exported = match to {
        InterchangeFormat::Json => JsonFormat.export(&project),
        InterchangeFormat::Mspdi => MspdiFormat.export(&project),
    }
    .map_err(|e| CliFailure::Validation(e.to_string()))?;
    std::fs::write(output, exported)
        .with_context(|| format!("writing `{}`", output.display()))
        .map_err(CliFailure::from)
}

/// Captures the current schedule as a named baseline. Since a CLI
/// invocation has no queue that persists across runs (§6.4), the captured
/// [`Baseline`] is written to a JSON sidecar next to the input file rather
/// than kept only in the transient [`ProjectController`] — a minimal,
/// explicit persistence choice for the headless binary, distinct from the
/// (out of scope, §1) SQLite persistence layer a full application would use.
fn run_baseline_set(
    input: &Path,
    name: &str,
    description: Option<String>,
) -> Result<(), CliFailure> {
    let project = load_project(input)?;
    let runtime = current_thread_runtime()?;
    let baseline: Baseline = runtime
        .block_on(async {
            let controller = ProjectController::new(project.calendar.clone(), today());
            controller
                .sync_tasks(project.tasks.clone())
                .await
                .context("loading tasks into controller")?;
            controller
                .set_baseline(name.to_string(), description.clone())
                .await
                .context("capturing baseline")?;
            controller
                .list_baselines()
                .into_iter()
                .find(|b| b.name == name)
                .context("baseline vanished immediately after being captured")
        })
        .map_err(CliFailure::from)?;

    let sidecar = baseline_sidecar_path(input, name);
    let json = serde_json::to_string_pretty(&baseline).context("serializing baseline")?;
    std::fs::write(&sidecar, json)
        .with_context(|| format!("writing `{}`", sidecar.display()))?;
    println!(
        "baseline `{name}` captured ({} task(s)) -> {}",
        baseline.tasks.len(),
        sidecar.display()
    );
    Ok(())
}

fn run_baseline_compare(input: &Path, name: &str) -> Result<(), CliFailure> {
    let project = load_project(input)?;
    let sidecar = baseline_sidecar_path(input, name);
    let text = std::fs::read_to_string(&sidecar).with_context(|| {
        format!(
            "reading baseline `{name}` (expected at `{}`; run `baseline set` first)",
            sidecar.display()
        )
    })?;
    let baseline: Baseline =
        serde_json::from_str(&text).context("parsing baseline sidecar file")?;

    let out = critpath_engine::schedule(&project.tasks, &project.calendar, today())
        .map_err(engine_error_to_failure)?;
    let current = leaf_snapshots(&out.tasks);

    let mut store = BaselineStore::new();
    store
        .add(baseline)
        .map_err(|e| CliFailure::Validation(e.to_string()))?;
    let variance = store
        .compare(name, &current, &project.calendar)
        .map_err(|e| CliFailure::Validation(e.to_string()))?;

    output::write_variance(&variance, &mut std::io::stdout()).map_err(CliFailure::from)
}

fn leaf_snapshots(tasks: &[Task]) -> BTreeMap<String, TaskSnapshot> {
    tasks
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

fn baseline_sidecar_path(input: &Path, name: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{stem}.baseline.{name}.json"))
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime, CliFailure> {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .context("starting async runtime")
        .map_err(CliFailure::from)
}

fn load_project(input: &Path) -> Result<ProjectFile, CliFailure> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading `{}`", input.display()))
        .map_err(CliFailure::from)?;
    let importer: &dyn Importer = match detect_format(input) {
        InterchangeFormat::Json => &JsonFormat,
        InterchangeFormat::Mspdi => &MspdiFormat,
    };
    importer
        .import(&text)
        .map_err(|e| CliFailure::Validation(e.to_string()))
}

fn detect_format(path: &Path) -> InterchangeFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xml") => InterchangeFormat::Mspdi,
        _ => InterchangeFormat::Json,
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn engine_error_to_failure(err: EngineError) -> CliFailure {
    match err {
        EngineError::Cycle(ids) => {
            CliFailure::Cycle(format!("dependency cycle involving: {}", ids.join(", ")))
        }
        EngineError::Core(CoreError::Config(msg)) => CliFailure::Config(msg),
        EngineError::Core(CoreError::CalendarExhausted { limit }) => CliFailure::Config(format!(
            "calendar scan exceeded {limit} days without finding a working day"
        )),
        EngineError::Core(CoreError::Validation(v)) => CliFailure::Validation(v.to_string()),
        other => CliFailure::Other(anyhow::anyhow!(other)),
    }
}

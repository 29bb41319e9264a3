// Sequential stage runner with semicolon-delimited run and error logs
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{error, info, instrument, warn};

const RUN_LOG_HEADER: &str = "timestamp;script;status;duration_seconds";
const ERROR_LOG_HEADER: &str = "timestamp;script;status;duration_seconds;stdout;stderr;exception";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Exited with status 0.
    Success,
    /// Ran but exited non-zero.
    Failure,
    /// Could not be started or waited on.
    Exception,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Success => "SUCCESS",
            StageStatus::Failure => "FAILURE",
            StageStatus::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A program to run as one pipeline step.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: String,
    pub started_at: NaiveDateTime,
    pub status: StageStatus,
    pub duration_seconds: f64,
    pub stdout: String,
    pub stderr: String,
    pub exception: Option<String>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Success
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub outcomes: Vec<StageOutcome>,
    pub run_log: PathBuf,
    /// Present only when some stage failed.
    pub error_log: Option<PathBuf>,
}

impl PipelineSummary {
    pub fn had_errors(&self) -> bool {
        self.outcomes.iter().any(|o| !o.succeeded())
    }
}

/// Captured text goes into a single log field; ";" is the field separator.
pub fn sanitize_field(text: &str) -> String {
    text.trim().replace(';', "|")
}

/// Run and error log files for one pipeline run.
pub struct PipelineLogs {
    run_log: PathBuf,
    error_log: PathBuf,
}

impl PipelineLogs {
    /// Create both logs under `log_dir`, named after `run_stamp`, with headers written.
    pub fn create(log_dir: &Path, run_stamp: NaiveDateTime) -> std::io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let stamp = run_stamp.format("%Y%m%d_%H%M%S");
        let logs = Self {
            run_log: log_dir.join(format!("pipeline_run_{stamp}.csv")),
            error_log: log_dir.join(format!("pipeline_errors_{stamp}.csv")),
        };
        fs::write(&logs.run_log, format!("{RUN_LOG_HEADER}\n"))?;
        fs::write(&logs.error_log, format!("{ERROR_LOG_HEADER}\n"))?;
        Ok(logs)
    }

    pub fn run_log(&self) -> &Path {
        &self.run_log
    }

    pub fn error_log(&self) -> &Path {
        &self.error_log
    }

    fn append(path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        writeln!(file, "{line}")
    }

    pub fn record(&self, outcome: &StageOutcome) -> std::io::Result<()> {
        let timestamp = outcome.started_at.format("%Y-%m-%d %H:%M:%S");
        let prefix = format!(
            "{timestamp};{};{};{:.2}",
            outcome.stage, outcome.status, outcome.duration_seconds
        );
        Self::append(&self.run_log, &prefix)?;

        if !outcome.succeeded() {
            let line = format!(
                "{prefix};{};{};{}",
                sanitize_field(&outcome.stdout),
                sanitize_field(&outcome.stderr),
                outcome.exception.as_deref().map(sanitize_field).unwrap_or_default()
            );
            Self::append(&self.error_log, &line)?;
        }
        Ok(())
    }

    /// Drop the error log when nothing failed; returns the log that remains, if any.
    pub fn finish(self, had_errors: bool) -> std::io::Result<(PathBuf, Option<PathBuf>)> {
        if had_errors {
            return Ok((self.run_log, Some(self.error_log)));
        }
        if self.error_log.exists() {
            fs::remove_file(&self.error_log)?;
        }
        Ok((self.run_log, None))
    }
}

/// Run one stage to completion, capturing its output. Never fails.
#[instrument(skip(stage), fields(stage = %stage.name))]
pub async fn run_stage(stage: &Stage) -> StageOutcome {
    let started_at = Local::now().naive_local();
    let start = Instant::now();
    info!("Running {}", stage.program.display());

    let result = Command::new(&stage.program).args(&stage.args).output().await;
    let duration_seconds = start.elapsed().as_secs_f64();

    match result {
        Ok(output) => {
            let status = if output.status.success() {
                StageStatus::Success
            } else {
                StageStatus::Failure
            };
            StageOutcome {
                stage: stage.name.clone(),
                started_at,
                status,
                duration_seconds,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exception: None,
            }
        }
        Err(e) => StageOutcome {
            stage: stage.name.clone(),
            started_at,
            status: StageStatus::Exception,
            duration_seconds,
            stdout: String::new(),
            stderr: String::new(),
            exception: Some(e.to_string()),
        },
    }
}

/// Run `stages` in order; a failing stage does not stop the ones after it.
pub async fn run_pipeline(stages: &[Stage], log_dir: &Path) -> std::io::Result<PipelineSummary> {
    let logs = PipelineLogs::create(log_dir, Local::now().naive_local())?;
    let mut outcomes = Vec::with_capacity(stages.len());

    for stage in stages {
        let outcome = run_stage(stage).await;
        logs.record(&outcome)?;
        match outcome.status {
            StageStatus::Success => info!(
                "{} succeeded in {:.2}s",
                outcome.stage, outcome.duration_seconds
            ),
            StageStatus::Failure => warn!(
                "{} failed, see {}",
                outcome.stage,
                logs.error_log().display()
            ),
            StageStatus::Exception => error!(
                "{} could not run: {}",
                outcome.stage,
                outcome.exception.as_deref().unwrap_or("unknown error")
            ),
        }
        outcomes.push(outcome);
    }

    let had_errors = outcomes.iter().any(|o| !o.succeeded());
    let (run_log, error_log) = logs.finish(had_errors)?;
    Ok(PipelineSummary {
        outcomes,
        run_log,
        error_log,
    })
}

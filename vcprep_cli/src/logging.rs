//! Tracing setup for a dataset build.
//!
//! Logs always go to stdout. With a log directory, each run also gets its own
//! `<uuid>.log` file and a line in `log_history.txt` pointing at it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};
use uuid::Uuid;

const HISTORY_FILE: &str = "log_history.txt";

/// Keeps the file writer alive; dropping it flushes and closes the run log.
pub struct LogSession {
    log_path: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

impl LogSession {
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn close(self) {}
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init(log_dir: Option<&Path>) -> Result<LogSession> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let (file_layer, guard, log_path) = match log_dir {
        Some(dir) => {
            let log_path = prepare_run_log(dir, Uuid::new_v4())?;
            let file_name = log_path
                .file_name()
                .context("run log path has no file name")?
                .to_owned();
            let (writer, guard) = tracing_appender::non_blocking(rolling::never(dir, file_name));
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard), Some(log_path))
        }
        None => (None, None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    if let Some(path) = &log_path {
        tracing::info!("logging to {}", path.display());
    }
    Ok(LogSession {
        log_path,
        _guard: guard,
    })
}

/// Creates `dir` and records the run's log path in the history file.
fn prepare_run_log(dir: &Path, id: Uuid) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let log_path = dir.join(format!("{id}.log"));

    let history_path = dir.join(HISTORY_FILE);
    let mut history = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&history_path)
        .with_context(|| format!("failed to open {}", history_path.display()))?;
    writeln!(history, "Created logger with log path: {}", log_path.display())?;
    Ok(log_path)
}

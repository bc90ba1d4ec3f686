//! Log output.
//!
//! Lines look like `[HH:MM:SS] message`. A configured log file is appended
//! to; if it cannot be opened, output falls back to stderr.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Local wall-clock timer printing `[HH:MM:SS]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTime;

impl FormatTime for ClockTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", clock_stamp(&Local::now()))
    }
}

fn clock_stamp(at: &DateTime<Local>) -> String {
    at.format("[%H:%M:%S]").to_string()
}

/// Open a log file for appending, creating parent directories.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Initialize logging with the specified level and optional file sink.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(format!("idlewatchd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ClockTime)
        .with_level(false)
        .with_target(false)
        .with_thread_ids(false);

    let Some(path) = log_file else {
        builder.with_writer(std::io::stderr).init();
        return Ok(());
    };

    match open_log_file(path) {
        Ok(file) => {
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        Err(e) => {
            builder.with_writer(std::io::stderr).init();
            warn!("{:#}, logging to stderr instead", e);
        }
    }

    Ok(())
}

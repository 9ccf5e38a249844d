use std::fs::{File, OpenOptions};
use std::os::fd::AsFd as _;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ftpd_contracts::ENV_LOG_FILTER;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. The sink is fixed here, before any worker
/// exists: either `log_file` or a private duplicate of stderr. Workers later
/// point fd 2 at their client, and log lines must never reach it.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(ENV_LOG_FILTER).unwrap_or_else(|_| EnvFilter::new("info"));
    let sink = open_sink(log_file)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(sink))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("install log subscriber: {err}"))
}

fn open_sink(log_file: Option<&Path>) -> Result<File> {
    match log_file {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display())),
        None => {
            let fd = std::io::stderr()
                .as_fd()
                .try_clone_to_owned()
                .context("duplicate stderr for logging")?;
            Ok(File::from(fd))
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ftpd_listener::isolation::{read_isolation_env, resolve_override};
use ftpd_listener::{
    logging, sys, worker, IsolationMode, ListenMode, Overrides, Supervisor, Tunables,
};

#[derive(Parser)]
#[command(name = "ftpd-listener")]
#[command(about = "Standalone FTP listener that forks a worker per connection.", long_about = None)]
struct Cli {
    /// JSON configuration file. Re-read on SIGHUP.
    config: Option<PathBuf>,

    #[arg(long)]
    listen_port: Option<u16>,

    #[arg(long)]
    background: bool,

    #[arg(long, value_enum)]
    isolation: Option<IsolationMode>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let overrides = Overrides {
        listen_port: cli.listen_port,
        background: cli.background,
        isolation: resolve_override(cli.isolation, read_isolation_env()?),
    };
    let tunables = match cli.config.as_deref() {
        Some(path) => Tunables::load_file(path)?,
        None => Tunables::load_defaults(),
    }
    .with_overrides(&overrides);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&tunables)?);
        return Ok(ExitCode::SUCCESS);
    }

    // Family errors go to the caller's stderr; the log sink opens after detaching.
    ListenMode::from_tunables(&tunables)?;
    if tunables.background {
        sys::daemonize().context("could not enter background mode")?;
    }
    logging::init(tunables.log_file.as_deref())?;

    let launch = Supervisor::new(tunables, cli.config, overrides).run()?;
    Ok(worker::run(launch))
}

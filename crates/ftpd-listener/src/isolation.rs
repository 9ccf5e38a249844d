use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use ftpd_contracts::ENV_ISOLATION;

use crate::config::Tunables;

/// How much of the kernel's namespacing a worker is forked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationMode {
    None,
    /// New PID and IPC namespaces.
    Isolate,
    /// As `Isolate`, plus a fresh network namespace.
    IsolateAll,
}

impl IsolationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationMode::None => "none",
            IsolationMode::Isolate => "isolate",
            IsolationMode::IsolateAll => "isolate-all",
        }
    }

    /// A fresh network namespace is only requested for HTTP workers.
    pub fn for_tunables(tunables: &Tunables) -> Self {
        if !tunables.isolate {
            return IsolationMode::None;
        }
        if tunables.http_enable && tunables.isolate_network {
            IsolationMode::IsolateAll
        } else {
            IsolationMode::Isolate
        }
    }

    #[cfg(target_os = "linux")]
    pub fn clone_flags(self) -> Option<libc::c_int> {
        match self {
            IsolationMode::None => None,
            IsolationMode::Isolate => Some(libc::CLONE_NEWPID | libc::CLONE_NEWIPC),
            IsolationMode::IsolateAll => {
                Some(libc::CLONE_NEWPID | libc::CLONE_NEWIPC | libc::CLONE_NEWNET)
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn clone_flags(self) -> Option<libc::c_int> {
        None
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct IsolationModeParseError {
    value: String,
}

impl fmt::Display for IsolationModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid isolation mode {:?} (expected one of: none, isolate, isolate-all)",
            self.value
        )
    }
}

impl std::error::Error for IsolationModeParseError {}

impl FromStr for IsolationMode {
    type Err = IsolationModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "none" => Ok(IsolationMode::None),
            "isolate" => Ok(IsolationMode::Isolate),
            "isolate-all" | "isolate_all" => Ok(IsolationMode::IsolateAll),
            _ => Err(IsolationModeParseError { value: s }),
        }
    }
}

impl clap::ValueEnum for IsolationMode {
    fn value_variants<'a>() -> &'a [Self] {
        const ALL: [IsolationMode; 3] = [
            IsolationMode::None,
            IsolationMode::Isolate,
            IsolationMode::IsolateAll,
        ];
        &ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            IsolationMode::None => Some(clap::builder::PossibleValue::new("none")),
            IsolationMode::Isolate => Some(clap::builder::PossibleValue::new("isolate")),
            IsolationMode::IsolateAll => {
                Some(clap::builder::PossibleValue::new("isolate-all").alias("isolate_all"))
            }
        }
    }
}

pub fn read_isolation_env() -> anyhow::Result<Option<IsolationMode>> {
    let Ok(raw) = std::env::var(ENV_ISOLATION) else {
        return Ok(None);
    };
    let mode = IsolationMode::from_str(&raw)
        .with_context(|| format!("invalid environment variable {ENV_ISOLATION}={raw:?}"))?;
    Ok(Some(mode))
}

/// Command line beats environment; both beat the config file.
pub fn resolve_override(
    cli: Option<IsolationMode>,
    env: Option<IsolationMode>,
) -> Option<IsolationMode> {
    cli.or(env)
}

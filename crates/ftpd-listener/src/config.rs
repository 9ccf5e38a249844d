use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ftpd_contracts::{DEFAULT_LINE_BUFFER_BYTES, DEFAULT_LISTEN_PORT, FTPD_CONFIG_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};

use crate::isolation::IsolationMode;

const MAX_LINE_BUFFER_BYTES: usize = 1024 * 1024;

fn default_schema_version() -> String {
    FTPD_CONFIG_SCHEMA_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_line_buffer_bytes() -> usize {
    DEFAULT_LINE_BUFFER_BYTES
}

/// Listener tunables. Every field a config file leaves out takes its default,
/// so a file that sets nothing yields exactly [`Tunables::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tunables {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_true")]
    pub listen: bool,
    #[serde(default)]
    pub listen_ipv6: bool,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub listen_address: Option<String>,
    /// IPv6 literal, optionally suffixed with `%zone`.
    #[serde(default)]
    pub listen_address6: Option<String>,
    #[serde(default)]
    pub background: bool,
    #[serde(default = "default_true")]
    pub isolate: bool,
    #[serde(default = "default_true")]
    pub isolate_network: bool,
    #[serde(default)]
    pub http_enable: bool,
    #[serde(default)]
    pub setproctitle_enable: bool,
    /// 0 blocks in accept indefinitely.
    #[serde(default)]
    pub accept_timeout_secs: u64,
    /// 0 is unlimited.
    #[serde(default)]
    pub max_clients: u32,
    /// 0 is unlimited.
    #[serde(default)]
    pub max_per_ip: u32,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_line_buffer_bytes")]
    pub line_buffer_bytes: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            schema_version: default_schema_version(),
            listen: true,
            listen_ipv6: false,
            listen_port: default_listen_port(),
            listen_address: None,
            listen_address6: None,
            background: false,
            isolate: true,
            isolate_network: true,
            http_enable: false,
            setproctitle_enable: false,
            accept_timeout_secs: 0,
            max_clients: 0,
            max_per_ip: 0,
            log_file: None,
            line_buffer_bytes: default_line_buffer_bytes(),
        }
    }
}

impl Tunables {
    pub fn load_defaults() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let tunables: Tunables = serde_json::from_slice(bytes).context("parse config JSON")?;
        tunables.validate()?;
        Ok(tunables)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read config: {}", path.display()))?;
        Self::from_json(&bytes).with_context(|| format!("load config: {}", path.display()))
    }

    /// Re-reads configuration from scratch: defaults first, then the file if
    /// one was given. Nothing from the previous load carries over.
    pub fn reload(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => Ok(Self::load_defaults()),
        }
    }

    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(port) = overrides.listen_port {
            self.listen_port = port;
        }
        if overrides.background {
            self.background = true;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.schema_version.trim() != FTPD_CONFIG_SCHEMA_VERSION {
            anyhow::bail!(
                "config schema_version mismatch: expected {} got {:?}",
                FTPD_CONFIG_SCHEMA_VERSION,
                self.schema_version
            );
        }
        if self.line_buffer_bytes == 0 || self.line_buffer_bytes > MAX_LINE_BUFFER_BYTES {
            anyhow::bail!(
                "line_buffer_bytes must be in 1..={MAX_LINE_BUFFER_BYTES}, got {}",
                self.line_buffer_bytes
            );
        }
        Ok(())
    }
}

/// Command-line settings that win over the file and survive reloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub listen_port: Option<u16>,
    pub background: bool,
    pub isolation: Option<IsolationMode>,
}

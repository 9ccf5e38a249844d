//! Shared, version-pinned identifiers and protocol constants.
//!
//! These constants are the single source of truth for values that cross crate
//! boundaries: the listener's socket parameters, the worker launch contract and
//! the FTP reply codes the worker emits.

pub const FTPD_CONFIG_SCHEMA_VERSION: &str = "ftpd.config@0.1.0";

pub const DEFAULT_LISTEN_PORT: u16 = 21;
pub const LISTEN_BACKLOG: i32 = 32;

/// Buckets in each admission accounting table.
pub const ACCOUNTING_BUCKETS: u32 = 256;

pub const DEFAULT_LINE_BUFFER_BYTES: usize = 4096;
pub const COMMAND_TERMINATOR: u8 = b'\n';

/// A launched worker finds its command connection on these descriptors.
pub const COMMAND_FD_IN: i32 = 0;
pub const COMMAND_FD_OUT: i32 = 1;
pub const COMMAND_FD_DIAG: i32 = 2;

pub const PROCESS_TITLE_LISTENER: &str = "LISTENER";

pub const ENV_LOG_FILTER: &str = "FTPD_LOG";
pub const ENV_ISOLATION: &str = "FTPD_ISOLATION";

pub const FTP_NOOPOK: u16 = 200;
pub const FTP_OPTSOK: u16 = 200;
pub const FTP_GREET: u16 = 220;
pub const FTP_GOODBYE: u16 = 221;
pub const FTP_TOO_MANY_USERS: u16 = 421;
pub const FTP_IP_LIMIT: u16 = 421;
pub const FTP_BADCMD: u16 = 500;
pub const FTP_BADOPTS: u16 = 501;

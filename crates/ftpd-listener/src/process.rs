use std::io;
use std::net::TcpStream;
use std::os::unix::io::IntoRawFd as _;

use ftpd_contracts::{COMMAND_FD_DIAG, COMMAND_FD_IN, COMMAND_FD_OUT};
use ftpd_ledger::WorkerId;
use tracing::warn;

use crate::isolation::IsolationMode;
use crate::sys::{self, ForkOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spawn {
    Parent(WorkerId),
    Child,
}

/// Process operations the supervisor needs. Split out so the admission logic
/// can run against a scripted implementation.
pub trait ProcessControl {
    /// Forks a worker. Both sides return: the parent with the worker's id,
    /// the worker with [`Spawn::Child`].
    fn spawn_worker(&mut self, isolation: IsolationMode) -> io::Result<Spawn>;

    /// Non-blocking; `None` once no exited child is left to collect.
    fn reap_one(&mut self) -> io::Result<Option<WorkerId>>;

    /// First thing a worker does: arrange to die with the listener.
    fn enter_child(&mut self) -> io::Result<()>;

    /// Makes `conn` the worker's fds 0, 1 and 2.
    fn prepare_child(&mut self, conn: TcpStream) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct OsProcesses {
    namespaces_refused: bool,
}

impl OsProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn fork_isolated(&mut self, flags: libc::c_int) -> io::Result<ForkOutcome> {
        if self.namespaces_refused {
            return sys::fork();
        }
        match sys::fork_with_clone_flags(flags) {
            Err(err) if matches!(err.raw_os_error(), Some(libc::EINVAL) | Some(libc::EPERM)) => {
                warn!(%err, "namespace isolation unavailable; forking without it");
                self.namespaces_refused = true;
                sys::fork()
            }
            other => other,
        }
    }
}

impl ProcessControl for OsProcesses {
    fn spawn_worker(&mut self, isolation: IsolationMode) -> io::Result<Spawn> {
        let outcome = match isolation.clone_flags() {
            Some(flags) => self.fork_isolated(flags)?,
            None => sys::fork()?,
        };
        Ok(match outcome {
            ForkOutcome::Parent(pid) => Spawn::Parent(WorkerId::from_pid(pid)),
            ForkOutcome::Child => Spawn::Child,
        })
    }

    fn reap_one(&mut self) -> io::Result<Option<WorkerId>> {
        Ok(sys::reap_one()?.map(WorkerId::from_pid))
    }

    fn enter_child(&mut self) -> io::Result<()> {
        sys::die_if_parent_dies()
    }

    fn prepare_child(&mut self, conn: TcpStream) -> io::Result<()> {
        let fd = conn.into_raw_fd();
        for target in [COMMAND_FD_IN, COMMAND_FD_OUT, COMMAND_FD_DIAG] {
            sys::dup2(fd, target)?;
        }
        if fd > COMMAND_FD_DIAG {
            sys::close(fd);
        }
        Ok(())
    }
}

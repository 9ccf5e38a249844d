use std::net::{
    Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, TcpListener, TcpStream,
};
use std::os::unix::io::AsRawFd as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use ftpd_contracts::{LISTEN_BACKLOG, PROCESS_TITLE_LISTENER};
use ftpd_ledger::{AdmissionLedger, LaunchDescriptor, RawAddr, WorkerId};
use tracing::{debug, info, warn};

use crate::config::{Overrides, Tunables};
use crate::isolation::IsolationMode;
use crate::process::{OsProcesses, ProcessControl, Spawn};
use crate::reap;
use crate::signals::Notifications;
use crate::sys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unbound,
    Bound,
    Listening,
    Accepting,
    /// Held only while [`Supervisor::admit`] forks; [`Supervisor::state`]
    /// never reports it.
    Forking,
}

/// Address family and bind address chosen from the tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
}

impl ListenMode {
    /// A listener serves exactly one family; asking for both is refused
    /// before any socket exists.
    pub fn from_tunables(tunables: &Tunables) -> Result<Self> {
        if tunables.listen && tunables.listen_ipv6 {
            bail!("run two copies of the listener for IPv4 and IPv6");
        }
        if tunables.listen {
            let ip = match tunables.listen_address.as_deref() {
                None => Ipv4Addr::UNSPECIFIED,
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("bad listen_address: {raw}"))?,
            };
            return Ok(ListenMode::V4(SocketAddrV4::new(ip, tunables.listen_port)));
        }
        if tunables.listen_ipv6 {
            let (ip, scope_id) = match tunables.listen_address6.as_deref() {
                None => (Ipv6Addr::UNSPECIFIED, 0),
                Some(raw) => parse_ipv6_listen_address(raw)?,
            };
            return Ok(ListenMode::V6(SocketAddrV6::new(
                ip,
                tunables.listen_port,
                0,
                scope_id,
            )));
        }
        bail!("standalone mode needs listen or listen_ipv6 enabled")
    }

    pub fn socket_addr(&self) -> SocketAddr {
        match self {
            ListenMode::V4(a) => SocketAddr::V4(*a),
            ListenMode::V6(a) => SocketAddr::V6(*a),
        }
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, ListenMode::V6(_))
    }

    fn family_name(&self) -> &'static str {
        if self.is_ipv6() {
            "IPv6"
        } else {
            "IPv4"
        }
    }
}

/// Parses `addr` or `addr%zone`. A zone is an interface name or a numeric
/// index; an empty zone means none.
pub fn parse_ipv6_listen_address(raw: &str) -> Result<(Ipv6Addr, u32)> {
    let raw = raw.trim();
    let (addr, zone) = raw.split_once('%').unwrap_or((raw, ""));
    let ip: Ipv6Addr = addr
        .parse()
        .map_err(|_| anyhow!("bad listen_address6: {raw}"))?;
    if zone.is_empty() {
        return Ok((ip, 0));
    }
    let scope_id = match zone.parse::<u32>() {
        Ok(idx) => idx,
        Err(_) => sys::if_name_to_index(zone)
            .with_context(|| format!("bad listen_address6: unknown interface {zone:?}"))?,
    };
    Ok((ip, scope_id))
}

/// What a freshly forked worker carries out of the listener.
#[derive(Debug)]
pub struct WorkerLaunch {
    pub descriptor: LaunchDescriptor,
    pub tunables: Tunables,
}

#[derive(Debug)]
pub enum Admission {
    /// Parent side: the worker exists and is on the books.
    Launched {
        worker: WorkerId,
        descriptor: LaunchDescriptor,
    },
    /// Fork failed; the connection was dropped and the ledger rolled back.
    Rejected,
    /// Worker side: this process now serves `conn`.
    Worker {
        descriptor: LaunchDescriptor,
        conn: TcpStream,
    },
}

pub struct Supervisor<P: ProcessControl = OsProcesses> {
    tunables: Tunables,
    config_path: Option<PathBuf>,
    overrides: Overrides,
    ledger: AdmissionLedger,
    procs: P,
    state: ListenerState,
}

impl Supervisor<OsProcesses> {
    pub fn new(tunables: Tunables, config_path: Option<PathBuf>, overrides: Overrides) -> Self {
        Self::with_process_control(tunables, config_path, overrides, OsProcesses::new())
    }
}

impl<P: ProcessControl> Supervisor<P> {
    pub fn with_process_control(
        tunables: Tunables,
        config_path: Option<PathBuf>,
        overrides: Overrides,
        procs: P,
    ) -> Self {
        Supervisor {
            tunables,
            config_path,
            overrides,
            ledger: AdmissionLedger::new(),
            procs,
            state: ListenerState::Unbound,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn ledger(&self) -> &AdmissionLedger {
        &self.ledger
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn process_control(&self) -> &P {
        &self.procs
    }

    pub fn isolation(&self) -> IsolationMode {
        self.overrides
            .isolation
            .unwrap_or_else(|| IsolationMode::for_tunables(&self.tunables))
    }

    /// Runs the listener. Returns only in a newly forked worker, with the
    /// command connection already on fds 0..=2; the listener itself returns
    /// only through an error. Background mode is entered by the caller, before
    /// logging is set up.
    pub fn run(mut self) -> Result<WorkerLaunch> {
        let mode = ListenMode::from_tunables(&self.tunables)?;
        let listener = self.bind_listener(&mode)?;
        if self.tunables.setproctitle_enable {
            if let Err(err) = sys::set_process_title(PROCESS_TITLE_LISTENER) {
                debug!(%err, "could not set process title");
            }
        }
        let notifications = Notifications::install().context("install signal handlers")?;
        self.state = ListenerState::Accepting;
        info!(addr = %mode.socket_addr(), isolation = %self.isolation(), "listening");

        loop {
            let (child_exited, reload_requested) = notifications.take_pending();
            self.service_notifications(child_exited, reload_requested)?;

            let ready = sys::poll_readable(
                &[listener.as_raw_fd(), notifications.wake_fd()],
                self.accept_timeout(),
            )
            .context("wait for connections")?;
            if ready[1] {
                notifications.drain_wake();
            }
            if !ready[0] {
                continue;
            }

            let (conn, peer) = match listener.accept() {
                Ok(pair) => pair,
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::WouldBlock {
                        debug!(%err, "accept failed");
                    }
                    continue;
                }
            };
            if let Err(err) = conn.set_nonblocking(false) {
                debug!(%err, %peer, "dropping connection");
                continue;
            }

            if let Admission::Worker { descriptor, conn } =
                self.admit(conn, RawAddr::from(peer.ip()))?
            {
                drop(listener);
                notifications.uninstall();
                self.procs
                    .prepare_child(conn)
                    .context("attach command connection")?;
                return Ok(WorkerLaunch {
                    descriptor,
                    tunables: self.tunables,
                });
            }
        }
    }

    pub fn bind_listener(&mut self, mode: &ListenMode) -> Result<TcpListener> {
        let fd = sys::tcp_socket(mode.is_ipv6()).context("could not create listening socket")?;
        sys::set_reuseaddr(&fd).context("could not set SO_REUSEADDR")?;
        sys::bind(&fd, &mode.socket_addr()).with_context(|| {
            format!(
                "could not bind listening {} socket to {}",
                mode.family_name(),
                mode.socket_addr()
            )
        })?;
        self.state = ListenerState::Bound;
        sys::listen(&fd, LISTEN_BACKLOG).context("could not listen")?;
        self.state = ListenerState::Listening;

        let listener = TcpListener::from(fd);
        listener
            .set_nonblocking(true)
            .context("set listening socket non-blocking")?;
        Ok(listener)
    }

    /// Books the connection, forks, and finishes the booking on whichever
    /// side of the fork this process lands.
    pub fn admit(&mut self, conn: TcpStream, peer: RawAddr) -> Result<Admission> {
        let descriptor = self.ledger.begin_admission(peer);
        let isolation = self.isolation();

        let resume = self.state;
        self.state = ListenerState::Forking;
        let spawned = self.procs.spawn_worker(isolation);
        self.state = resume;

        match spawned {
            Ok(Spawn::Parent(worker)) => {
                drop(conn);
                self.ledger
                    .commit_admission(worker, peer)
                    .context("record launched worker")?;
                info!(
                    pid = %worker,
                    %peer,
                    ordinal = descriptor.ordinal,
                    rank = descriptor.rank_for_address,
                    "launched worker"
                );
                Ok(Admission::Launched { worker, descriptor })
            }
            Ok(Spawn::Child) => {
                self.procs
                    .enter_child()
                    .context("arm parent-death signal")?;
                Ok(Admission::Worker { descriptor, conn })
            }
            Err(err) => {
                drop(conn);
                warn!(%peer, %err, "could not fork worker; connection dropped");
                self.ledger
                    .abandon_admission(peer)
                    .context("roll back admission")?;
                Ok(Admission::Rejected)
            }
        }
    }

    pub fn service_notifications(
        &mut self,
        child_exited: bool,
        reload_requested: bool,
    ) -> Result<()> {
        if child_exited {
            for (worker, addr) in reap::reap_exited(&mut self.procs, &mut self.ledger)? {
                debug!(
                    pid = %worker,
                    peer = %addr,
                    live = self.ledger.total_children(),
                    "reaped worker"
                );
            }
        }
        if reload_requested {
            self.reload_config();
        }
        Ok(())
    }

    /// Swaps in a fresh configuration. A file that fails to load leaves the
    /// running configuration untouched. Listen settings only take effect on
    /// the next start.
    pub fn reload_config(&mut self) {
        match Tunables::reload(self.config_path.as_deref()) {
            Ok(fresh) => {
                self.tunables = fresh.with_overrides(&self.overrides);
                info!(isolation = %self.isolation(), "configuration reloaded");
            }
            Err(err) => {
                warn!("configuration reload failed, keeping previous configuration: {err:#}");
            }
        }
    }

    fn accept_timeout(&self) -> Option<Duration> {
        (self.tunables.accept_timeout_secs > 0)
            .then(|| Duration::from_secs(self.tunables.accept_timeout_secs))
    }
}

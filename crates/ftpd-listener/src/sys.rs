//! Thin libc wrappers for the listener's socket and process plumbing.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

pub fn tcp_socket(ipv6: bool) -> io::Result<OwnedFd> {
    let domain = if ipv6 { libc::AF_INET6 } else { libc::AF_INET };
    let fd = cvt(unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) })?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub fn set_reuseaddr(fd: &OwnedFd) -> io::Result<()> {
    let one: libc::c_int = 1;
    cvt(unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub fn bind(fd: &OwnedFd, addr: &SocketAddr) -> io::Result<()> {
    let rc = match addr {
        SocketAddr::V4(a) => {
            let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = a.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(a.ip().octets());
            unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            }
        }
        SocketAddr::V6(a) => {
            let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = a.port().to_be();
            sin6.sin6_flowinfo = a.flowinfo();
            sin6.sin6_addr.s6_addr = a.ip().octets();
            sin6.sin6_scope_id = a.scope_id();
            unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    &sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                )
            }
        }
    };
    cvt(rc)?;
    Ok(())
}

pub fn listen(fd: &OwnedFd, backlog: libc::c_int) -> io::Result<()> {
    cvt(unsafe { libc::listen(fd.as_raw_fd(), backlog) })?;
    Ok(())
}

pub fn if_name_to_index(name: &str) -> io::Result<u32> {
    let c_name = CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL"))?;
    let idx = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if idx == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(idx)
}

/// Waits until any of `fds` is readable. Returns one flag per fd; a signal
/// arriving mid-wait reports nothing ready.
pub fn poll_readable(fds: &[RawFd], timeout: Option<Duration>) -> io::Result<Vec<bool>> {
    let mut pfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let timeout_ms: libc::c_int = match timeout {
        None => -1,
        Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
    };

    let rc = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![false; fds.len()]);
        }
        return Err(err);
    }
    Ok(pfds
        .iter()
        .map(|p| p.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    Parent(libc::pid_t),
    Child,
}

pub fn fork() -> io::Result<ForkOutcome> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(ForkOutcome::Child),
        pid => Ok(ForkOutcome::Parent(pid)),
    }
}

/// Fork-like `clone` that places the child in the namespaces named by
/// `flags`. No new stack is passed, so the child resumes on a copy of ours.
#[cfg(target_os = "linux")]
pub fn fork_with_clone_flags(flags: libc::c_int) -> io::Result<ForkOutcome> {
    let rc = unsafe {
        libc::syscall(
            libc::SYS_clone,
            (flags | libc::SIGCHLD) as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    match rc {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(ForkOutcome::Child),
        pid => Ok(ForkOutcome::Parent(pid as libc::pid_t)),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn fork_with_clone_flags(_flags: libc::c_int) -> io::Result<ForkOutcome> {
    Err(io::Error::from_raw_os_error(libc::EINVAL))
}

/// Collects one exited child without blocking. `None` when no child has
/// exited yet or there are no children at all.
pub fn reap_one() -> io::Result<Option<libc::pid_t>> {
    loop {
        let mut status: libc::c_int = 0;
        let rc = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if rc > 0 {
            return Ok(Some(rc));
        }
        if rc == 0 {
            return Ok(None);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ECHILD) => return Ok(None),
            Some(libc::EINTR) => continue,
            _ => return Err(err),
        }
    }
}

pub fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::dup2(src, dst) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

pub fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

#[cfg(target_os = "linux")]
pub fn die_if_parent_dies() -> io::Result<()> {
    cvt(unsafe {
        libc::prctl(
            libc::PR_SET_PDEATHSIG,
            libc::SIGKILL as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    })?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn die_if_parent_dies() -> io::Result<()> {
    Ok(())
}

/// The kernel keeps at most 15 bytes of the name.
#[cfg(target_os = "linux")]
pub fn set_process_title(title: &str) -> io::Result<()> {
    let c_title = CString::new(title)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "title contains NUL"))?;
    cvt(unsafe {
        libc::prctl(
            libc::PR_SET_NAME,
            c_title.as_ptr() as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    })?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_title(_title: &str) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Forks; the parent exits at once and the child detaches from the
/// controlling terminal with fds 0..=2 pointed at `/dev/null`.
pub fn daemonize() -> io::Result<()> {
    if let ForkOutcome::Parent(_) = fork()? {
        unsafe { libc::_exit(0) };
    }
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")?;
    for fd in 0..=2 {
        dup2(devnull.as_raw_fd(), fd)?;
    }
    cvt(unsafe { libc::setsid() })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};

    #[test]
    fn bound_socket_accepts_loopback_connection() {
        let fd = tcp_socket(false).unwrap();
        set_reuseaddr(&fd).unwrap();
        bind(&fd, &SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))).unwrap();
        listen(&fd, 4).unwrap();

        let listener = TcpListener::from(fd);
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();

        let ready = poll_readable(&[listener.as_raw_fd()], Some(Duration::from_secs(2))).unwrap();
        assert_eq!(ready, vec![true]);
        let (_conn, peer) = listener.accept().unwrap();
        assert_eq!(peer.ip(), std::net::IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn poll_times_out_with_nothing_ready() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let ready =
            poll_readable(&[listener.as_raw_fd()], Some(Duration::from_millis(20))).unwrap();
        assert_eq!(ready, vec![false]);
    }

    #[test]
    fn unknown_interface_has_no_index() {
        assert!(if_name_to_index("ftpd-no-such-if0").is_err());
        assert!(if_name_to_index("bad\0name").is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn loopback_interface_resolves() {
        assert!(if_name_to_index("lo").unwrap() > 0);
    }

    // `waitpid(-1)` sees every child of the test process.
    static CHILDREN: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn reap_one_without_children_is_none() {
        let _guard = CHILDREN.lock().unwrap_or_else(|e| e.into_inner());
        while reap_one().unwrap().is_some() {}
        assert_eq!(reap_one().unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reap_one_collects_exited_child() {
        use std::process::Command;
        use std::thread::sleep;
        use std::time::Instant;

        let _guard = CHILDREN.lock().unwrap_or_else(|e| e.into_inner());
        let child = Command::new("true")
            .spawn()
            .or_else(|_| Command::new("sh").args(["-c", "exit 0"]).spawn())
            .expect("spawn quick-exit child");
        let pid: libc::pid_t = child.id().try_into().expect("pid_t conversion");

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut reaped = false;
        while Instant::now() < deadline {
            if let Some(got) = reap_one().unwrap() {
                if got == pid {
                    reaped = true;
                    break;
                }
            }
            sleep(Duration::from_millis(10));
        }
        assert!(reaped, "child {pid} was never reaped");

        let r = unsafe { libc::kill(pid, 0) };
        assert_eq!(r, -1);
        assert_eq!(
            io::Error::last_os_error().raw_os_error(),
            Some(libc::ESRCH),
            "reaped child must not linger as a zombie"
        );
    }
}

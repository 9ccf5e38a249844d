use std::io::{self, Read as _};
use std::os::unix::io::{AsRawFd as _, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGCHLD, SIGHUP};
use signal_hook::SigId;

/// Signal delivery for the accept loop. Handlers only raise a flag and write
/// a wake byte; all ledger and config work happens on the main thread once
/// the loop notices.
pub struct Notifications {
    child_exited: Arc<AtomicBool>,
    reload_requested: Arc<AtomicBool>,
    wake_rx: UnixStream,
    ids: Vec<SigId>,
}

impl Notifications {
    pub fn install() -> io::Result<Self> {
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;

        let child_exited = Arc::new(AtomicBool::new(false));
        let reload_requested = Arc::new(AtomicBool::new(false));

        // Flags are registered before the pipe so a woken loop always sees
        // the flag already set.
        let ids = vec![
            signal_hook::flag::register(SIGCHLD, Arc::clone(&child_exited))?,
            signal_hook::low_level::pipe::register(SIGCHLD, wake_tx.try_clone()?)?,
            signal_hook::flag::register(SIGHUP, Arc::clone(&reload_requested))?,
            signal_hook::low_level::pipe::register(SIGHUP, wake_tx)?,
        ];

        Ok(Notifications {
            child_exited,
            reload_requested,
            wake_rx,
            ids,
        })
    }

    pub fn wake_fd(&self) -> RawFd {
        self.wake_rx.as_raw_fd()
    }

    /// Returns and clears `(child_exited, reload_requested)`.
    pub fn take_pending(&self) -> (bool, bool) {
        (
            self.child_exited.swap(false, Ordering::SeqCst),
            self.reload_requested.swap(false, Ordering::SeqCst),
        )
    }

    pub fn drain_wake(&self) {
        let mut buf = [0u8; 64];
        while let Ok(n) = (&self.wake_rx).read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    }

    /// Workers must not act on the listener's signals.
    pub fn uninstall(self) {
        for id in self.ids {
            signal_hook::low_level::unregister(id);
        }
    }
}

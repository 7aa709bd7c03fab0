//! Forwarding signals received by the orchestrator to its workers

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::error::LaunchError;
use crate::pipes::{cloexec_pipe, set_nonblocking};

/// Signals relayed to the workers while a launch is running
pub const RELAYED_SIGNALS: [Signal; 9] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGTSTP,
    Signal::SIGCONT,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGWINCH,
];

static RELAY_LOCK: Lazy<Arc<tokio::sync::Mutex<()>>> =
    Lazy::new(|| Arc::new(tokio::sync::Mutex::new(())));

/// Write end of the self-pipe, -1 while no relay is installed
static RELAY_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn relay_handler(signum: libc::c_int) {
    let fd = RELAY_WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = signum as u8;
        // SAFETY: write(2) is async-signal-safe and `byte` outlives the call
        unsafe {
            libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

/// Workers not yet reaped, shared by the relay and the collector
#[derive(Debug, Clone, Default)]
pub struct RelayHandle {
    pids: Arc<Mutex<Vec<Pid>>>,
}

impl RelayHandle {
    pub fn new(pids: Vec<Pid>) -> Self {
        Self {
            pids: Arc::new(Mutex::new(pids)),
        }
    }

    /// Forget a worker that has been reaped; its pid may be reused
    pub fn worker_exited(&self, pid: Pid) {
        self.pids.lock().retain(|p| *p != pid);
    }

    /// Send `signal` to `pid` unless it was reaped, in which case `ESRCH`
    pub fn signal_if_running(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        let pids = self.pids.lock();
        if !pids.contains(&pid) {
            return Err(Errno::ESRCH);
        }
        kill(pid, signal)
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.pids.lock().clone()
    }

    fn forward(&self, signal: Signal) {
        let pids = self.pids.lock();
        debug!(signal = signal.as_str(), workers = pids.len(), "Relaying signal to workers");
        for pid in pids.iter() {
            match kill(*pid, signal) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid = pid.as_raw(), signal = signal.as_str(), "Failed to relay signal: {}", e),
            }
        }
    }
}

/// Installs the relay handlers
pub struct SignalRelay;

impl SignalRelay {
    /// Install handlers for [`RELAYED_SIGNALS`] forwarding to the workers in `handle`.
    ///
    /// Waits until no other relay is installed in this process.
    pub async fn install(handle: RelayHandle) -> Result<SignalRelayGuard, LaunchError> {
        let lock = RELAY_LOCK.clone().lock_owned().await;

        let (read_fd, write_fd) = cloexec_pipe().map_err(LaunchError::Signal)?;
        set_nonblocking(write_fd.as_raw_fd()).map_err(|e| LaunchError::Signal(e.into()))?;

        let thread_handle = handle.clone();
        let thread = std::thread::Builder::new()
            .name("warden-signal-relay".to_string())
            .spawn(move || relay_loop(read_fd, thread_handle))
            .map_err(LaunchError::Signal)?;

        RELAY_WRITE_FD.store(write_fd.as_raw_fd(), Ordering::SeqCst);

        let mut guard = SignalRelayGuard {
            handle,
            previous: Vec::with_capacity(RELAYED_SIGNALS.len()),
            write_fd: Some(write_fd),
            thread: Some(thread),
            _lock: lock,
        };

        let action = SigAction::new(
            SigHandler::Handler(relay_handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        for signal in RELAYED_SIGNALS {
            // SAFETY: the handler only performs an async-signal-safe write
            let previous =
                unsafe { sigaction(signal, &action) }.map_err(|e| LaunchError::Signal(e.into()))?;
            guard.previous.push((signal, previous));
        }

        debug!("Signal relay installed");
        Ok(guard)
    }
}

/// An installed relay; dropping it restores the previous handlers
pub struct SignalRelayGuard {
    handle: RelayHandle,
    previous: Vec<(Signal, SigAction)>,
    write_fd: Option<OwnedFd>,
    thread: Option<JoinHandle<()>>,
    _lock: OwnedMutexGuard<()>,
}

impl SignalRelayGuard {
    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }
}

impl Drop for SignalRelayGuard {
    fn drop(&mut self) {
        for (signal, previous) in self.previous.drain(..).rev() {
            // SAFETY: reinstalls exactly the action that was active before
            if let Err(e) = unsafe { sigaction(signal, &previous) } {
                warn!(signal = signal.as_str(), "Failed to restore signal handler: {}", e);
            }
        }

        RELAY_WRITE_FD.store(-1, Ordering::SeqCst);
        // closing the write end stops the relay thread
        self.write_fd.take();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Signal relay thread panicked");
            }
        }
        debug!("Signal relay removed");
    }
}

fn relay_loop(read_fd: OwnedFd, handle: RelayHandle) {
    let mut pipe = File::from(read_fd);
    let mut buf = [0u8; 32];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => {
                for &signum in &buf[..len] {
                    match Signal::try_from(i32::from(signum)) {
                        Ok(signal) => handle.forward(signal),
                        Err(_) => warn!(signum, "Ignoring unknown signal number"),
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Signal relay pipe failed: {}", e);
                break;
            }
        }
    }
}

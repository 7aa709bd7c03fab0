//! Per-worker control channel pipes

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::unistd::pipe;

/// The two pipes connecting one worker to the orchestrator.
///
/// All four ends are close-on-exec, so no child inherits them unless the
/// flag is cleared in that child before exec.
#[derive(Debug)]
pub struct WorkerChannel {
    /// Read end of the worker-to-orchestrator pipe
    to_orchestrator: OwnedFd,
    /// Write end of the worker-to-orchestrator pipe, passed to the worker
    child_write: OwnedFd,
    /// Read end of the orchestrator-to-worker pipe, passed to the worker
    child_read: OwnedFd,
    /// Write end of the orchestrator-to-worker pipe
    from_orchestrator: OwnedFd,
}

impl WorkerChannel {
    pub fn open() -> io::Result<Self> {
        let (to_orchestrator, child_write) = cloexec_pipe()?;
        let (child_read, from_orchestrator) = cloexec_pipe()?;
        Ok(Self {
            to_orchestrator,
            child_write,
            child_read,
            from_orchestrator,
        })
    }

    /// Descriptors the worker uses, as `(write, read)`
    pub fn child_fds(&self) -> (RawFd, RawFd) {
        (self.child_write.as_raw_fd(), self.child_read.as_raw_fd())
    }

    /// The single argument telling the worker where its channel lives
    pub fn pipe_fd_arg(&self) -> String {
        let (write, read) = self.child_fds();
        format!("--pipe-fd={},{}", write, read)
    }

    /// Close the worker's ends and keep ours, as `(reader, writer)`
    pub fn into_parent_ends(self) -> (OwnedFd, OwnedFd) {
        drop(self.child_write);
        drop(self.child_read);
        (self.to_orchestrator, self.from_orchestrator)
    }
}

/// Toggle close-on-exec; only async-signal-safe calls, usable before exec
pub fn set_cloexec(fd: RawFd, on: bool) -> nix::Result<()> {
    let flags = if on {
        FdFlag::FD_CLOEXEC
    } else {
        FdFlag::empty()
    };
    fcntl(fd, FcntlArg::F_SETFD(flags)).map(drop)
}

pub fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map(drop)
}

/// A pipe with both ends close-on-exec, as `(read, write)`
pub fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = pipe()?;
    set_cloexec(read.as_raw_fd(), true)?;
    set_cloexec(write.as_raw_fd(), true)?;
    Ok((read, write))
}

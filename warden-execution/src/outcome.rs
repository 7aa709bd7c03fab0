//! Exit status normalization and launch results

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{error, warn};
use warden_ipc::IpcResult;

/// Exit code and terminating signal of a finished process.
///
/// A process killed by signal `S` reports `128 + S`, the shell convention.
pub fn normalize_exit(status: ExitStatus) -> (i32, Option<Signal>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    match status.signal() {
        Some(signum) => {
            let signal = Signal::try_from(signum).ok();
            if signal.is_none() {
                warn!(signum, "Worker terminated by an unknown signal");
            }
            (128 + signum, signal)
        }
        None => (1, None),
    }
}

/// 1 if any worker reported exactly 1 (hard error), else the largest code
pub fn aggregate_exit_code(codes: &[i32]) -> i32 {
    if codes.contains(&1) {
        1
    } else {
        codes.iter().copied().max().unwrap_or(0)
    }
}

/// How one worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub index: usize,
    pub pid: Pid,
    pub exit_code: i32,
    pub termination_signal: Option<Signal>,
}

impl WorkerOutcome {
    pub fn from_status(index: usize, pid: Pid, status: ExitStatus) -> Self {
        let (exit_code, termination_signal) = normalize_exit(status);
        Self {
            index,
            pid,
            exit_code,
            termination_signal,
        }
    }
}

/// Result of a finished launch
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub workers: Vec<WorkerOutcome>,
    pub exit_code: i32,
    pub ipc: IpcResult,
}

impl LaunchOutcome {
    pub fn new(workers: Vec<WorkerOutcome>, ipc: IpcResult) -> Self {
        let codes: Vec<i32> = workers.iter().map(|w| w.exit_code).collect();
        Self {
            exit_code: aggregate_exit_code(&codes),
            workers,
            ipc,
        }
    }

    pub fn exit_codes(&self) -> Vec<i32> {
        self.workers.iter().map(|w| w.exit_code).collect()
    }

    pub fn termination_signals(&self) -> Vec<Option<Signal>> {
        self.workers.iter().map(|w| w.termination_signal).collect()
    }

    /// Terminations worth reporting; SIGINT and SIGPIPE are expected on user interrupt
    pub fn noteworthy_signals(&self) -> Vec<(usize, Signal)> {
        self.workers
            .iter()
            .filter_map(|w| w.termination_signal.map(|s| (w.index, s)))
            .filter(|(_, s)| !matches!(s, Signal::SIGINT | Signal::SIGPIPE))
            .collect()
    }

    pub fn log_abnormal_terminations(&self) {
        for (index, signal) in self.noteworthy_signals() {
            error!(
                worker = index,
                "Engine worker {} terminated by signal {} ({})",
                index,
                signal.as_str(),
                signal as i32
            );
        }
    }

    /// True when no worker was killed by a signal
    pub fn exited_gracefully(&self) -> bool {
        self.workers.iter().all(|w| w.termination_signal.is_none())
    }
}

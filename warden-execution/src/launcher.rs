//! Spawning engine workers with their control channels

use std::ffi::{OsStr, OsString};
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_config::{
    check_fan_out, check_reserved_arguments, ConfigError, EngineConfig, ExecutionConfig,
};
use warden_ipc::{Dispatcher, IPC_PROTOCOL_VERSION};

use crate::collector::{spawn_reader, Collector, CollectorReport, ProcessSignaller};
use crate::engine::find_on_path;
use crate::error::LaunchError;
use crate::outcome::{LaunchOutcome, WorkerOutcome};
use crate::pipes::{set_cloexec, WorkerChannel};
use crate::relay::{RelayHandle, SignalRelay, SignalRelayGuard};

/// What to launch and how many times
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub procs: usize,
    pub threads: usize,
    /// Name to show as `argv[0]` if it resolves to the invoking program
    pub program_name: Option<String>,
    /// Handshake version to accept; defaults to warden's own
    pub protocol_version: Option<String>,
}

impl LaunchRequest {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            procs: 1,
            threads: 1,
            program_name: None,
            protocol_version: None,
        }
    }

    pub fn from_config(
        executable: impl Into<PathBuf>,
        engine: &EngineConfig,
        execution: &ExecutionConfig,
    ) -> Self {
        Self {
            procs: execution.procs,
            threads: execution.threads,
            protocol_version: engine.protocol_version.clone(),
            ..Self::new(executable)
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_procs(mut self, procs: usize) -> Self {
        self.procs = procs;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    /// Checks run before anything is spawned
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.procs == 0 || self.threads == 0 {
            return Err(ConfigError::ValidationError(format!(
                "procs and threads must be at least 1, got procs={} threads={}",
                self.procs, self.threads
            )));
        }
        check_fan_out(self.threads, self.procs)?;
        check_reserved_arguments(&self.args)
    }

    /// Arguments after `argv[0]` for worker `index`
    pub fn worker_args(&self, index: usize, pipe_fd_arg: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 3);
        args.push(pipe_fd_arg.to_string());
        if self.procs > 1 {
            args.push(format!("--proc-num-offset={}", index));
        }
        if self.threads > 1 {
            args.push(format!("--threads={}", self.threads));
        }
        args.extend(self.args.iter().cloned());
        args
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.protocol_version
                .clone()
                .unwrap_or_else(|| IPC_PROTOCOL_VERSION.to_string()),
        )
    }
}

/// `argv[0]` for the workers: the program name when it is what the user ran
pub fn resolve_arg0(program_name: Option<&str>, executable: &Path) -> OsString {
    let reuse = program_name.filter(|name| {
        let found = find_on_path(name).and_then(|p| p.canonicalize().ok());
        let current = std::env::current_exe().and_then(|p| p.canonicalize()).ok();
        found.is_some() && found == current
    });
    match reuse {
        Some(name) => OsString::from(name),
        None => executable.as_os_str().to_owned(),
    }
}

struct RunningWorker {
    index: usize,
    pid: Pid,
    child: Child,
    // kept open until the launch is joined
    _to_worker: OwnedFd,
}

/// Start worker `index`; returns it with the read end of its channel
fn spawn_worker(
    request: &LaunchRequest,
    index: usize,
    arg0: &OsStr,
) -> Result<(RunningWorker, OwnedFd), LaunchError> {
    let channel = WorkerChannel::open().map_err(LaunchError::Pipe)?;
    let (child_write, child_read) = channel.child_fds();
    let args = request.worker_args(index, &channel.pipe_fd_arg());

    let mut cmd = Command::new(&request.executable);
    cmd.arg0(arg0).args(&args).kill_on_drop(true);
    // SAFETY: only fcntl(2) runs between fork and exec
    unsafe {
        cmd.pre_exec(move || {
            set_cloexec(child_write, false)?;
            set_cloexec(child_read, false)?;
            Ok(())
        });
    }

    debug!(worker = index, "Spawning {} {}", request.executable.display(), args.join(" "));
    let child = cmd
        .spawn()
        .map_err(|source| LaunchError::Spawn { worker: index, source })?;
    let pid = child.id().ok_or_else(|| LaunchError::Spawn {
        worker: index,
        source: std::io::Error::other("worker exited before its pid was read"),
    })?;

    let (from_worker, to_worker) = channel.into_parent_ends();
    let worker = RunningWorker {
        index,
        pid: Pid::from_raw(pid as i32),
        child,
        _to_worker: to_worker,
    };
    Ok((worker, from_worker))
}

/// Kill and reap workers of a launch that could not be completed
async fn abandon(workers: Vec<RunningWorker>) -> Vec<WorkerOutcome> {
    let mut outcomes = Vec::with_capacity(workers.len());
    for mut worker in workers {
        warn!(worker = worker.index, "Killing worker of failed launch");
        if let Err(e) = worker.child.start_kill() {
            debug!(worker = worker.index, "Worker already gone: {}", e);
        }
        match worker.child.wait().await {
            Ok(status) => outcomes.push(WorkerOutcome::from_status(worker.index, worker.pid, status)),
            Err(e) => warn!(worker = worker.index, "Failed to reap worker: {}", e),
        }
    }
    outcomes
}

/// Launches engine workers
#[derive(Debug, Clone, Default)]
pub struct Launcher;

impl Launcher {
    pub fn new() -> Self {
        Self
    }

    /// Start all workers, their readers and the signal relay
    pub async fn spawn(&self, request: LaunchRequest) -> Result<RunningLaunch, LaunchError> {
        request.validate()?;

        let arg0 = resolve_arg0(request.program_name.as_deref(), &request.executable);
        let mut workers = Vec::with_capacity(request.procs);
        let mut channels = Vec::with_capacity(request.procs);

        for index in 0..request.procs {
            match spawn_worker(&request, index, &arg0) {
                Ok((worker, from_worker)) => {
                    workers.push(worker);
                    channels.push(from_worker);
                }
                Err(e) => {
                    abandon(workers).await;
                    return Err(e);
                }
            }
        }

        let pids: Vec<Pid> = workers.iter().map(|w| w.pid).collect();
        info!(
            workers = workers.len(),
            "Started engine {}",
            request.executable.display()
        );

        let live = RelayHandle::new(pids.clone());
        let (events, receiver) = mpsc::unbounded_channel();
        let collector = Collector::new(
            request.dispatcher(),
            ProcessSignaller::new(pids, live.clone()),
            workers.len(),
        );
        let collector = tokio::spawn(collector.run(receiver));
        let readers = channels
            .into_iter()
            .enumerate()
            .map(|(index, channel)| spawn_reader(index, channel, events.clone()))
            .collect();
        drop(events);

        let relay = SignalRelay::install(live).await?;

        Ok(RunningLaunch {
            workers,
            readers,
            collector,
            relay,
        })
    }

    /// Spawn and wait for completion
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
        self.spawn(request).await?.wait().await
    }
}

/// Launch `request` with a default [`Launcher`]
pub async fn launch(request: LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
    Launcher::new().launch(request).await
}

/// Workers that have been started and not yet joined.
///
/// Dropping it kills any worker still running and restores the signal
/// handlers.
pub struct RunningLaunch {
    workers: Vec<RunningWorker>,
    readers: Vec<JoinHandle<()>>,
    collector: JoinHandle<CollectorReport>,
    relay: SignalRelayGuard,
}

impl RunningLaunch {
    pub fn pids(&self) -> Vec<Pid> {
        self.workers.iter().map(|w| w.pid).collect()
    }

    /// Wait for every worker, then join readers and collector
    pub async fn wait(self) -> Result<LaunchOutcome, LaunchError> {
        let RunningLaunch {
            mut workers,
            readers,
            collector,
            relay,
        } = self;

        let relay_handle = relay.handle();
        let statuses = join_all(workers.iter_mut().map(|worker| {
            let relay_handle = relay_handle.clone();
            async move {
                let status = worker.child.wait().await;
                relay_handle.worker_exited(worker.pid);
                debug!(worker = worker.index, "Worker exited: {:?}", status);
                (worker.index, worker.pid, status)
            }
        }))
        .await;

        drop(relay);

        let mut outcomes = Vec::with_capacity(statuses.len());
        for (index, pid, status) in statuses {
            let status = status.map_err(|source| LaunchError::Wait {
                worker: index,
                source,
            })?;
            outcomes.push(WorkerOutcome::from_status(index, pid, status));
        }
        drop(workers);

        for reader in join_all(readers).await {
            reader?;
        }
        let report = collector.await?;
        let ipc = report.ipc_result();

        if let Some((worker, source)) = report.failures.into_iter().next() {
            return Err(LaunchError::Protocol {
                worker,
                source,
                collected: ipc,
            });
        }

        let outcome = LaunchOutcome::new(outcomes, ipc);
        debug!(
            exit_code = outcome.exit_code,
            messages = outcome.ipc.len(),
            "Launch finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_worker_args_single_process() {
        let request = LaunchRequest::new("/bin/engine").with_args(["run.mac", "-v"]);
        assert_eq!(
            request.worker_args(0, "--pipe-fd=5,6"),
            vec!["--pipe-fd=5,6", "run.mac", "-v"]
        );
    }

    #[test]
    fn test_worker_args_with_fan_out() {
        let request = LaunchRequest::new("/bin/engine")
            .with_procs(3)
            .with_args(["run.mac"]);
        assert_eq!(
            request.worker_args(2, "--pipe-fd=5,6"),
            vec!["--pipe-fd=5,6", "--proc-num-offset=2", "run.mac"]
        );

        let request = LaunchRequest::new("/bin/engine").with_threads(8);
        assert_eq!(
            request.worker_args(0, "--pipe-fd=5,6"),
            vec!["--pipe-fd=5,6", "--threads=8"]
        );
    }

    #[test]
    fn test_validate() {
        assert!(LaunchRequest::new("/bin/engine").validate().is_ok());
        assert!(matches!(
            LaunchRequest::new("/bin/engine").with_procs(0).validate(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            LaunchRequest::new("/bin/engine")
                .with_procs(2)
                .with_threads(2)
                .validate(),
            Err(ConfigError::ConflictingFanOut { .. })
        ));
        assert!(matches!(
            LaunchRequest::new("/bin/engine")
                .with_args(["--proc-num-offset=1"])
                .validate(),
            Err(ConfigError::ReservedArgument(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let engine = EngineConfig {
            protocol_version: Some("2.0.0".to_string()),
            ..Default::default()
        };
        let execution = ExecutionConfig {
            procs: 4,
            ..Default::default()
        };
        let request = LaunchRequest::from_config("/bin/engine", &engine, &execution);
        assert_eq!(request.procs, 4);
        assert_eq!(request.threads, 1);
        assert_eq!(request.dispatcher().expected_version(), "2.0.0");
        assert_eq!(
            LaunchRequest::new("/bin/engine").dispatcher().expected_version(),
            IPC_PROTOCOL_VERSION
        );
    }

    #[test]
    fn test_arg0_uses_program_name_found_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let current = std::env::current_exe().unwrap();
        std::os::unix::fs::symlink(&current, dir.path().join("warden-self")).unwrap();
        let path = dir.path().to_str().unwrap();

        temp_env::with_var("PATH", Some(path), || {
            let exe = Path::new("/opt/engine/bin/engine");
            assert_eq!(
                resolve_arg0(Some("warden-self"), exe),
                OsString::from("warden-self")
            );
            // on PATH but a different program
            let other = dir.path().join("other");
            std::fs::write(&other, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&other, std::fs::Permissions::from_mode(0o755)).unwrap();
            assert_eq!(
                resolve_arg0(Some("other"), exe),
                OsString::from("/opt/engine/bin/engine")
            );
        });
    }

    #[tokio::test]
    async fn test_abandon_kills_started_workers() {
        let workers: Vec<RunningWorker> = (0..2)
            .map(|index| {
                let child = Command::new("/bin/sleep")
                    .arg("30")
                    .kill_on_drop(true)
                    .spawn()
                    .unwrap();
                let (_, to_worker) = crate::pipes::cloexec_pipe().unwrap();
                RunningWorker {
                    index,
                    pid: Pid::from_raw(child.id().unwrap() as i32),
                    child,
                    _to_worker: to_worker,
                }
            })
            .collect();

        let outcomes = abandon(workers).await;
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert_eq!(outcome.termination_signal, Some(Signal::SIGKILL));
            assert_eq!(outcome.exit_code, 137);
        }
    }

    #[test]
    fn test_arg0_falls_back_to_executable() {
        let exe = Path::new("/opt/engine/bin/engine");
        assert_eq!(resolve_arg0(None, exe), OsString::from("/opt/engine/bin/engine"));
        assert_eq!(
            resolve_arg0(Some("definitely-not-on-path-xyz"), exe),
            OsString::from("/opt/engine/bin/engine")
        );
    }
}

//! Reader threads and the collector task that dispatches their messages

use std::fs::File;
use std::os::fd::OwnedFd;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use warden_ipc::{Dispatcher, IpcError, IpcResult, Message, MessageStream};

use crate::relay::RelayHandle;

/// What a reader thread reports about its worker's control channel
#[derive(Debug)]
pub enum ReaderEvent {
    Message(Message),
    Closed { worker: usize },
    Failed { worker: usize, error: IpcError },
}

/// Delivers signals to workers by index
pub trait WorkerSignaller: Send + Sync {
    fn signal(&self, worker: usize, signal: Signal) -> nix::Result<()>;
}

/// Signals worker processes with kill(2), skipping those already reaped
#[derive(Debug, Clone)]
pub struct ProcessSignaller {
    pids: Vec<Pid>,
    live: RelayHandle,
}

impl ProcessSignaller {
    /// `pids` by worker index; `live` is updated as workers are reaped
    pub fn new(pids: Vec<Pid>, live: RelayHandle) -> Self {
        Self { pids, live }
    }
}

impl WorkerSignaller for ProcessSignaller {
    fn signal(&self, worker: usize, signal: Signal) -> nix::Result<()> {
        let pid = self.pids.get(worker).ok_or(Errno::ESRCH)?;
        self.live.signal_if_running(*pid, signal)
    }
}

/// Everything the collector gathered once all readers are done
#[derive(Debug, Default)]
pub struct CollectorReport {
    pub logs: Vec<Vec<Message>>,
    pub failures: Vec<(usize, IpcError)>,
}

impl CollectorReport {
    /// Merged unhandled messages in worker order
    pub fn ipc_result(&self) -> IpcResult {
        IpcResult::merge(self.logs.iter().cloned())
    }
}

/// Runs the dispatcher over every message of a launch.
///
/// A message is appended to its worker's log before the signal it is owed
/// goes out, so a worker resumed by an acknowledgement never races its own
/// message.
pub struct Collector<S> {
    dispatcher: Dispatcher,
    signaller: S,
    logs: Vec<Vec<Message>>,
    failures: Vec<(usize, IpcError)>,
}

impl<S: WorkerSignaller> Collector<S> {
    pub fn new(dispatcher: Dispatcher, signaller: S, workers: usize) -> Self {
        Self {
            dispatcher,
            signaller,
            logs: vec![Vec::new(); workers],
            failures: Vec::new(),
        }
    }

    pub fn handle(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Message(message) => self.handle_message(message),
            ReaderEvent::Closed { worker } => {
                debug!(worker, "Reader finished");
            }
            ReaderEvent::Failed { worker, error } => {
                error!(worker, "Control channel failed, terminating worker: {}", error);
                self.deliver(worker, Signal::SIGTERM);
                self.failures.push((worker, error));
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        let Some(worker) = message.origin.filter(|w| *w < self.logs.len()) else {
            warn!("Dropping message from unknown worker: {}", message);
            return;
        };
        trace!(worker, "Received IPC message {}", message);

        let dispatch = self.dispatcher.dispatch(message);
        if let Some(forward) = dispatch.forward {
            self.logs[worker].push(forward);
        }
        if let Some(signal) = dispatch.action.signal() {
            self.deliver(worker, signal);
        }
    }

    fn deliver(&self, worker: usize, signal: Signal) {
        match self.signaller.signal(worker, signal) {
            Ok(()) => debug!(worker, signal = signal.as_str(), "Signalled worker"),
            Err(Errno::ESRCH) => {
                debug!(worker, signal = signal.as_str(), "Worker already exited")
            }
            Err(e) => warn!(
                worker,
                signal = signal.as_str(),
                "Failed to signal worker: {}",
                e
            ),
        }
    }

    /// Drain events until every reader has hung up
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ReaderEvent>) -> CollectorReport {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        self.finish()
    }

    pub fn finish(self) -> CollectorReport {
        CollectorReport {
            logs: self.logs,
            failures: self.failures,
        }
    }
}

/// Read one worker's control channel on a blocking thread
pub fn spawn_reader(
    worker: usize,
    channel: OwnedFd,
    events: mpsc::UnboundedSender<ReaderEvent>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut stream = MessageStream::new(File::from(channel), worker);
        loop {
            match stream.next_message() {
                Ok(Some(message)) => {
                    if events.send(ReaderEvent::Message(message)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = events.send(ReaderEvent::Closed { worker });
                    break;
                }
                Err(error) => {
                    let _ = events.send(ReaderEvent::Failed { worker, error });
                    break;
                }
            }
        }
    })
}

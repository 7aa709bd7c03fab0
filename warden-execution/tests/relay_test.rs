//! Signal relay behaviour; kept in its own binary since it signals the test process

use std::time::Duration;

use nix::sys::signal::{raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use parking_lot::{const_mutex, Mutex};
use warden_execution::{LaunchRequest, Launcher, RelayHandle, SignalRelay};

static SERIAL: Mutex<()> = const_mutex(());

fn mock_engine() -> LaunchRequest {
    LaunchRequest::new(env!("CARGO_BIN_EXE_warden-mock-engine"))
}

fn set_handler(signal: Signal, handler: SigHandler) -> SigHandler {
    let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
    // SAFETY: only the default and ignore dispositions are installed here
    unsafe { sigaction(signal, &action) }.unwrap().handler()
}

#[tokio::test]
async fn test_signal_is_forwarded_to_workers() {
    let _serial = SERIAL.lock();

    let request = mock_engine()
        .with_procs(2)
        .with_args(["--steps", "announce;pause"]);
    let running = Launcher::new().spawn(request).await.unwrap();
    assert_eq!(running.pids().len(), 2);

    raise(Signal::SIGTERM).unwrap();

    let outcome = running.wait().await.unwrap();
    for worker in &outcome.workers {
        assert_eq!(worker.exit_code, 143);
        assert_eq!(worker.termination_signal, Some(Signal::SIGTERM));
    }
    assert_eq!(outcome.exit_code, 143);
}

#[tokio::test]
async fn test_previous_handlers_are_restored() {
    let _serial = SERIAL.lock();

    let original = set_handler(Signal::SIGWINCH, SigHandler::SigIgn);

    let outcome = Launcher::new()
        .launch(mock_engine().with_args(["--steps", "exit:0"]))
        .await
        .unwrap();
    assert_eq!(outcome.exit_code, 0);

    assert_eq!(set_handler(Signal::SIGWINCH, original), SigHandler::SigIgn);
}

#[tokio::test]
async fn test_relay_guard_restores_on_drop() {
    let _serial = SERIAL.lock();

    let original = set_handler(Signal::SIGHUP, SigHandler::SigIgn);
    let guard = SignalRelay::install(RelayHandle::default()).await.unwrap();
    assert!(guard.handle().pids().is_empty());
    drop(guard);

    assert_eq!(set_handler(Signal::SIGHUP, original), SigHandler::SigIgn);
}

#[tokio::test]
async fn test_second_relay_waits_for_the_first() {
    let _serial = SERIAL.lock();

    let first = SignalRelay::install(RelayHandle::default()).await.unwrap();
    let pending = tokio::time::timeout(
        Duration::from_millis(100),
        SignalRelay::install(RelayHandle::default()),
    )
    .await;
    assert!(pending.is_err(), "second relay installed while the first was active");

    drop(first);
    let second = tokio::time::timeout(
        Duration::from_secs(5),
        SignalRelay::install(RelayHandle::default()),
    )
    .await
    .expect("second relay installs once the first is dropped")
    .unwrap();
    drop(second);
}

//! Interpretation of decoded control messages

use tracing::{error, warn};

use crate::protocol::{Message, Record, IPC_PROTOCOL_VERSION};

/// Signal the orchestrator owes a worker after handling one of its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Nothing to send
    None,
    /// Acknowledge a blocking message so the worker resumes (SIGUSR2)
    Continue,
    /// Stop the worker (SIGTERM)
    Terminate,
}

impl SignalAction {
    /// The OS signal carrying this action, if any
    pub fn signal(self) -> Option<nix::sys::signal::Signal> {
        use nix::sys::signal::Signal;
        match self {
            SignalAction::None => None,
            SignalAction::Continue => Some(Signal::SIGUSR2),
            SignalAction::Terminate => Some(Signal::SIGTERM),
        }
    }
}

/// Outcome of dispatching a single message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Message to append to the unhandled-message log
    pub forward: Option<Message>,
    /// Signal to send once the message has been logged
    pub action: SignalAction,
}

/// Decides what happens with every message coming off a control channel
#[derive(Debug, Clone)]
pub struct Dispatcher {
    expected_version: String,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(IPC_PROTOCOL_VERSION)
    }
}

impl Dispatcher {
    pub fn new(expected_version: impl Into<String>) -> Self {
        Self {
            expected_version: expected_version.into(),
        }
    }

    pub fn expected_version(&self) -> &str {
        &self.expected_version
    }

    pub fn dispatch(&self, message: Message) -> Dispatch {
        let is_blocking = message.blocking;

        if message.is_handshake() {
            let fatal = !self.version_matches(&message);
            let action = if fatal {
                SignalAction::Terminate
            } else if is_blocking {
                SignalAction::Continue
            } else {
                SignalAction::None
            };
            return Dispatch {
                forward: None,
                action,
            };
        }

        if is_blocking {
            warn!(worker = ?message.origin, "Unhandled blocking IPC message {}", message);
        }

        Dispatch {
            forward: Some(message),
            action: if is_blocking {
                SignalAction::Continue
            } else {
                SignalAction::None
            },
        }
    }

    fn version_matches(&self, handshake: &Message) -> bool {
        match handshake.records.get(1) {
            Some(Record::Scalar(version)) if *version == self.expected_version => true,
            other => {
                error!(
                    worker = ?handshake.origin,
                    "Engine protocol version {} does not match warden version {}",
                    other.map(Record::to_string).unwrap_or_else(|| "<missing>".to_string()),
                    self.expected_version
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_handshake_is_consumed() {
        let dispatcher = Dispatcher::new("1.0.0");
        let result = dispatcher.dispatch(Message::handshake("1.0.0"));
        assert_eq!(result.forward, None);
        // the engine sends its handshake blocking, so it still needs its ack
        assert_eq!(result.action, SignalAction::Continue);
    }

    #[test]
    fn test_non_blocking_handshake_needs_no_signal() {
        let dispatcher = Dispatcher::new("1.0.0");
        let mut handshake = Message::handshake("1.0.0");
        handshake.blocking = false;
        let result = dispatcher.dispatch(handshake);
        assert_eq!(result.forward, None);
        assert_eq!(result.action, SignalAction::None);
    }

    #[test]
    fn test_mismatched_handshake_is_fatal() {
        let dispatcher = Dispatcher::new("1.0.0");
        let result = dispatcher.dispatch(Message::handshake("0.9.0"));
        assert_eq!(result.forward, None);
        assert_eq!(result.action, SignalAction::Terminate);
    }

    #[test]
    fn test_handshake_without_version_is_fatal() {
        let dispatcher = Dispatcher::new("1.0.0");
        let result = dispatcher.dispatch(Message::blocking(vec![Record::from("ipc_available")]));
        assert_eq!(result.action, SignalAction::Terminate);
    }

    #[test]
    fn test_blocking_message_is_forwarded_and_acknowledged() {
        let dispatcher = Dispatcher::default();
        let ping = Message::blocking(vec![Record::from("ping")]).with_origin(1);
        let result = dispatcher.dispatch(ping.clone());
        assert_eq!(result.forward, Some(ping));
        assert_eq!(result.action, SignalAction::Continue);
    }

    #[test]
    fn test_plain_message_is_forwarded_silently() {
        let dispatcher = Dispatcher::default();
        let msg = Message::new(vec![Record::from("output"), Record::from("a.out")]);
        let result = dispatcher.dispatch(msg.clone());
        assert_eq!(result.forward, Some(msg));
        assert_eq!(result.action, SignalAction::None);
    }

    #[test]
    fn test_action_signals() {
        use nix::sys::signal::Signal;
        assert_eq!(SignalAction::None.signal(), None);
        assert_eq!(SignalAction::Continue.signal(), Some(Signal::SIGUSR2));
        assert_eq!(SignalAction::Terminate.signal(), Some(Signal::SIGTERM));
    }
}

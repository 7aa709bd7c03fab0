//! IPC protocol definitions and message types
//!
//! Messages travel from the engine to warden as ASCII-delimited text:
//! units are joined by `US`, records by `RS`, and every message ends with
//! `GS`. A blocking message carries an `ENQ` right before its `GS`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ASCII GS, terminates every message
pub const GROUP_SEPARATOR: u8 = 0x1d;

/// ASCII RS, separates records within a message
pub const RECORD_SEPARATOR: u8 = 0x1e;

/// ASCII US, separates units within a record
pub const UNIT_SEPARATOR: u8 = 0x1f;

/// ASCII ENQ, marks a message whose sender waits for a continuation signal
pub const ENQUIRY: u8 = 0x05;

/// First record of the handshake the engine sends once its channel is ready
pub const HANDSHAKE_KEY: &str = "ipc_available";

/// Protocol version spoken by this build of warden
pub const IPC_PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns true for the bytes that carry framing meaning on the wire
pub fn is_control_byte(byte: u8) -> bool {
    matches!(
        byte,
        GROUP_SEPARATOR | RECORD_SEPARATOR | UNIT_SEPARATOR | ENQUIRY
    )
}

/// A single field of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// Record made of exactly one unit
    Scalar(String),
    /// Record made of several units, e.g. a value and its unit
    Composite(Vec<String>),
}

impl Record {
    /// Build a record from its units, collapsing a single unit to a scalar
    pub fn from_units(mut units: Vec<String>) -> Self {
        if units.len() == 1 {
            Record::Scalar(units.remove(0))
        } else {
            Record::Composite(units)
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Record::Scalar(value) => Some(value),
            Record::Composite(_) => None,
        }
    }

    pub fn units(&self) -> Vec<&str> {
        match self {
            Record::Scalar(value) => vec![value.as_str()],
            Record::Composite(units) => units.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for Record {
    fn from(value: &str) -> Self {
        Record::Scalar(value.to_string())
    }
}

impl From<String> for Record {
    fn from(value: String) -> Self {
        Record::Scalar(value)
    }
}

impl From<Vec<String>> for Record {
    fn from(units: Vec<String>) -> Self {
        Record::from_units(units)
    }
}

impl<const N: usize> From<[&str; N]> for Record {
    fn from(units: [&str; N]) -> Self {
        Record::from_units(units.iter().map(|u| u.to_string()).collect())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Scalar(value) => write!(f, "{:?}", value),
            Record::Composite(units) => write!(f, "({})", units.join(", ")),
        }
    }
}

/// A decoded control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocking: bool,
    /// Index of the worker that sent this message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<usize>,
}

impl Message {
    /// Create a new non-blocking message
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            blocking: false,
            origin: None,
        }
    }

    /// Create a new blocking message
    pub fn blocking(records: Vec<Record>) -> Self {
        Self {
            records,
            blocking: true,
            origin: None,
        }
    }

    /// Create the handshake message for the given protocol version
    pub fn handshake(version: &str) -> Self {
        Self::blocking(vec![Record::from(HANDSHAKE_KEY), Record::from(version)])
    }

    pub fn with_origin(mut self, worker: usize) -> Self {
        self.origin = Some(worker);
        self
    }

    /// The key of a message is its first record when that record is a scalar
    pub fn key(&self) -> Option<&str> {
        self.records.first().and_then(Record::as_scalar)
    }

    /// Records following the key
    pub fn values(&self) -> &[Record] {
        self.records.get(1..).unwrap_or(&[])
    }

    pub fn is_handshake(&self) -> bool {
        self.key() == Some(HANDSHAKE_KEY)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records: Vec<String> = self.records.iter().map(Record::to_string).collect();
        write!(f, "[{}]", records.join(", "))
    }
}

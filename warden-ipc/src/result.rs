//! Queryable view over the messages collected during a launch

use serde::{Deserialize, Serialize};

use crate::error::IpcError;
use crate::protocol::{Message, Record};

/// Messages left unhandled by the dispatcher, merged across all workers.
///
/// A message belongs to key `K` when its first record is the scalar `K`;
/// the records after the key are its values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpcResult {
    messages: Vec<Message>,
}

impl IpcResult {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Merge per-worker logs, keeping worker order and FIFO order within a worker
    pub fn merge(logs: impl IntoIterator<Item = Vec<Message>>) -> Self {
        Self {
            messages: logs.into_iter().flatten().collect(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Distinct keys in first-seen order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for key in self.messages.iter().filter_map(Message::key) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Values of all messages for `key` carrying exactly `len` values
    pub fn get_with_len(&self, key: &str, len: usize) -> Vec<&[Record]> {
        self.messages
            .iter()
            .filter(|msg| msg.key() == Some(key))
            .map(Message::values)
            .filter(|values| values.len() == len)
            .collect()
    }

    /// The single value of every message for `key` carrying one value
    pub fn get(&self, key: &str) -> Vec<&Record> {
        self.get_with_len(key, 1)
            .into_iter()
            .map(|values| &values[0])
            .collect()
    }

    /// Scalar values recorded for `key`, skipping composite ones
    pub fn get_strings(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .into_iter()
            .filter_map(Record::as_scalar)
            .collect()
    }

    /// The value for `key`, `default` if absent, an error if recorded more than once
    pub fn get_single(&self, key: &str, default: impl Into<Record>) -> Result<Record, IpcError> {
        match self.get(key).as_slice() {
            [] => Ok(default.into()),
            [value] => Ok((*value).clone()),
            _ => Err(IpcError::DuplicateKey {
                key: key.to_string(),
            }),
        }
    }

    /// Replace every message for `key` by one message per value
    pub fn set<I, V>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Record>,
    {
        self.remove(key);
        self.messages.extend(
            values
                .into_iter()
                .map(|value| Message::new(vec![Record::from(key), value.into()])),
        );
    }

    /// Drop every message for `key`
    pub fn remove(&mut self, key: &str) {
        self.messages.retain(|msg| msg.key() != Some(key));
    }
}

impl From<Vec<Message>> for IpcResult {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

//! IPC error types

use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Malformed frame on the control channel
    #[error("Framing error: {0}")]
    Framing(String),

    /// Message that cannot be put on the wire
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// IO error on the control channel
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A key expected once was recorded several times
    #[error("IPC returned key {key} more than once")]
    DuplicateKey { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_message() {
        let err = IpcError::DuplicateKey { key: "output".to_string() };
        assert_eq!(err.to_string(), "IPC returned key output more than once");
    }
}

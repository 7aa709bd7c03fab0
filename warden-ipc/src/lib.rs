//! Inter-process communication for Warden
//!
//! This crate provides the control-channel protocol spoken between warden
//! and the engine workers it launches: the wire codec, the stream reader
//! that turns pipe reads into messages, the dispatcher deciding which
//! signal a worker is owed, and the result view over collected messages.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod result;
pub mod stream;

// Re-export commonly used types
pub use codec::{decode, encode};
pub use dispatch::{Dispatch, Dispatcher, SignalAction};
pub use error::IpcError;
pub use protocol::{Message, Record, HANDSHAKE_KEY, IPC_PROTOCOL_VERSION};
pub use result::IpcResult;
pub use stream::{FrameBuffer, MessageStream};

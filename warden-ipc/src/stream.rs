//! Turning a control-channel byte stream into discrete messages

use std::io::{ErrorKind, Read};

use nix::errno::Errno;
use tracing::{debug, warn};

use crate::codec::decode;
use crate::error::IpcError;
use crate::protocol::{Message, GROUP_SEPARATOR};

/// Size of a single read from the control channel
pub const READ_CHUNK_SIZE: usize = 1024;

/// Accumulates raw bytes and hands out complete frames
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from one read
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the oldest complete frame, group separator included
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.buf.iter().position(|&b| b == GROUP_SEPARATOR)?;
        let rest = self.buf.split_off(end + 1);
        Some(std::mem::replace(&mut self.buf, rest))
    }

    /// Number of buffered bytes not yet part of a complete frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Reads framed messages from one worker's control channel.
///
/// Frames already buffered are always handed out before the next read, so a
/// chunk carrying several messages yields all of them in order.
pub struct MessageStream<R> {
    reader: R,
    worker: usize,
    frames: FrameBuffer,
    chunk: Box<[u8]>,
    finished: bool,
}

impl<R: Read> MessageStream<R> {
    pub fn new(reader: R, worker: usize) -> Self {
        Self {
            reader,
            worker,
            frames: FrameBuffer::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            finished: false,
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Return the next message, or `None` once the channel is closed
    pub fn next_message(&mut self) -> Result<Option<Message>, IpcError> {
        loop {
            if let Some(frame) = self.frames.next_frame() {
                let (_, message) = decode(&frame)?;
                return Ok(Some(message.with_origin(self.worker)));
            }

            if self.finished {
                return Ok(None);
            }

            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.finished = true;
                    if self.frames.pending() > 0 {
                        warn!(
                            worker = self.worker,
                            bytes = self.frames.pending(),
                            "Control channel closed with a truncated message"
                        );
                    } else {
                        debug!(worker = self.worker, "Control channel closed");
                    }
                    return Ok(None);
                }
                Ok(len) => self.frames.extend(&self.chunk[..len]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(Errno::EBADF as i32) => {
                    // our side already closed the channel during shutdown
                    debug!(worker = self.worker, "Control channel descriptor already closed");
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => return Err(IpcError::Io(e)),
            }
        }
    }
}

impl<R: Read> Iterator for MessageStream<R> {
    type Item = Result<Message, IpcError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished && self.frames.pending() == 0 {
            return None;
        }
        match self.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                self.frames = FrameBuffer::new();
                Some(Err(e))
            }
        }
    }
}

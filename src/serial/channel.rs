//! # Channel Module
//!
//! The [`LineChannel`] trait is the only thing an acquisition loop knows
//! about its device: something that yields complete text lines and can be
//! closed. [`LineReader`] implements it over any tokio byte stream.

use std::future::Future;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::encoding::decode_line;
use crate::error::ChannelError;

/// A newline-delimited text transport.
///
/// Opening is the implementor's constructor; a value of this type is an
/// already opened connection.
pub trait LineChannel: Send + 'static {
    /// Waits for the next complete line and returns it without its
    /// terminator.
    ///
    /// Implementations must be cancel safe: if the returned future is
    /// dropped before completing, no bytes of the stream may be lost.
    fn read_line(&mut self) -> impl Future<Output = Result<String, ChannelError>> + Send;

    /// Releases the transport. Calling it again is a no-op.
    fn close(&mut self);

    /// False once the channel has been closed or the device went away.
    fn is_open(&self) -> bool;

    /// Device identifier, used in log messages.
    fn name(&self) -> &str;
}

/// [`LineChannel`] over any async byte stream.
pub struct LineReader<R> {
    name: String,
    reader: Option<BufReader<R>>,
    buffer: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Wraps an opened stream.
    pub fn new(name: impl Into<String>, stream: R) -> Self {
        Self {
            name: name.into(),
            reader: Some(BufReader::new(stream)),
            buffer: Vec::with_capacity(64),
        }
    }
}

impl<R> LineChannel for LineReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read_line(&mut self) -> Result<String, ChannelError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(ChannelError::Closed);
        };
        // Partial data stays in `buffer` if this future is dropped.
        let read = reader.read_until(b'\n', &mut self.buffer).await?;
        if read == 0 {
            log::debug!("[{}] end of stream", self.name);
            self.reader = None;
            self.buffer.clear();
            return Err(ChannelError::Disconnected);
        }
        let line = decode_line(&self.buffer);
        self.buffer.clear();
        line
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("[{}] channel closed", self.name);
        }
        self.buffer.clear();
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

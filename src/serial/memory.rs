//! # Memory Channel
//!
//! An in-process [`LineChannel`] fed from a [`LineFeeder`]. Used to replay
//! recorded telemetry and to drive acquisition loops in tests without
//! hardware. Dropping the feeder looks like the device being unplugged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::channel::LineChannel;
use super::encoding::{decode_line, strip_terminator};
use crate::error::ChannelError;

enum Feed {
    Line(String),
    Bytes(Vec<u8>),
    Error(ChannelError),
}

#[derive(Default)]
struct Status {
    closed: AtomicBool,
    close_calls: AtomicUsize,
    reads: AtomicUsize,
}

/// Creates a connected channel/feeder pair.
pub fn pair(name: impl Into<String>) -> (MemoryLineChannel, LineFeeder) {
    let (tx, rx) = mpsc::unbounded_channel();
    let status = Arc::new(Status::default());
    let channel = MemoryLineChannel {
        name: name.into(),
        rx: Some(rx),
        status: Arc::clone(&status),
    };
    (channel, LineFeeder { tx, status })
}

/// Receiving end, handed to an acquisition loop.
pub struct MemoryLineChannel {
    name: String,
    rx: Option<mpsc::UnboundedReceiver<Feed>>,
    status: Arc<Status>,
}

impl LineChannel for MemoryLineChannel {
    async fn read_line(&mut self) -> Result<String, ChannelError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(ChannelError::Closed);
        };
        let feed = rx.recv().await;
        self.status.reads.fetch_add(1, Ordering::SeqCst);
        match feed {
            Some(Feed::Line(line)) => Ok(strip_terminator(&line).to_string()),
            Some(Feed::Bytes(bytes)) => decode_line(&bytes),
            Some(Feed::Error(e)) => Err(e),
            None => {
                self.rx = None;
                self.status.closed.store(true, Ordering::SeqCst);
                Err(ChannelError::Disconnected)
            }
        }
    }

    fn close(&mut self) {
        self.status.close_calls.fetch_add(1, Ordering::SeqCst);
        self.rx = None;
        self.status.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sending end, playing the device.
pub struct LineFeeder {
    tx: mpsc::UnboundedSender<Feed>,
    status: Arc<Status>,
}

impl LineFeeder {
    /// Queues one line. Returns false once the channel is gone.
    pub fn send_line(&self, line: impl Into<String>) -> bool {
        self.tx.send(Feed::Line(line.into())).is_ok()
    }

    /// Queues several lines in order.
    pub fn send_lines<I, S>(&self, lines: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lines.into_iter().all(|line| self.send_line(line))
    }

    /// Queues raw bytes to be decoded as one line.
    pub fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Feed::Bytes(bytes.into())).is_ok()
    }

    /// Makes the next read fail with `error`.
    pub fn send_error(&self, error: ChannelError) -> bool {
        self.tx.send(Feed::Error(error)).is_ok()
    }

    /// True until the channel side was closed or disconnected.
    pub fn is_channel_open(&self) -> bool {
        !self.status.closed.load(Ordering::SeqCst)
    }

    /// How many times `close` was called on the channel.
    pub fn close_calls(&self) -> usize {
        self.status.close_calls.load(Ordering::SeqCst)
    }

    /// Number of completed reads, including failed ones.
    pub fn reads(&self) -> usize {
        self.status.reads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_are_delivered_in_order() {
        let (mut channel, feeder) = pair("mem");
        assert!(feeder.send_lines(["a\r\n", "b\n", "c"]));
        assert_eq!(channel.read_line().await.unwrap(), "a");
        assert_eq!(channel.read_line().await.unwrap(), "b");
        assert_eq!(channel.read_line().await.unwrap(), "c");
        assert_eq!(feeder.reads(), 3);
    }

    #[tokio::test]
    async fn test_injected_error() {
        let (mut channel, feeder) = pair("mem");
        feeder.send_error(ChannelError::io("cable pulled"));
        assert!(matches!(channel.read_line().await, Err(ChannelError::Io(_))));
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_invalid_bytes() {
        let (mut channel, feeder) = pair("mem");
        feeder.send_bytes(vec![0xFF, b'\n']);
        assert!(matches!(
            channel.read_line().await,
            Err(ChannelError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_dropping_feeder_disconnects() {
        let (mut channel, feeder) = pair("mem");
        feeder.send_line("last");
        let status = Arc::clone(&feeder.status);
        drop(feeder);
        assert_eq!(channel.read_line().await.unwrap(), "last");
        assert!(matches!(
            channel.read_line().await,
            Err(ChannelError::Disconnected)
        ));
        assert!(!channel.is_open());
        assert!(status.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_stops_feeding() {
        let (mut channel, feeder) = pair("mem");
        channel.close();
        channel.close();
        assert!(!feeder.is_channel_open());
        assert!(!feeder.send_line("ignored"));
        assert_eq!(feeder.close_calls(), 2);
        assert!(matches!(channel.read_line().await, Err(ChannelError::Closed)));
    }
}

//! # Error Module
//!
//! This module provides the error types for `serial_sensors`.
//! It uses the `thiserror` crate for ergonomic error handling.
//!
//! Only [`SensorError`] ever reaches application code. [`ChannelError`] and
//! [`FrameError`] describe streaming faults that an acquisition loop recovers
//! from locally.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for `serial_sensors` operations.
pub type Result<T> = std::result::Result<T, SensorError>;

/// Main error type for the `serial_sensors` crate.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Failed to open serial port.
    #[error("Failed to open serial port '{port_name}': {reason}")]
    PortOpen { port_name: String, reason: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Sampling device answered with fewer bytes than a full measurement.
    #[error("Short reply from sampling device: expected {expected} bytes, got {found}")]
    ShortReply { expected: usize, found: usize },

    /// No async runtime available to drive an acquisition loop.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// File I/O error.
    #[error("File I/O error: {0}")]
    FileIo(#[from] std::io::Error),
}

impl SensorError {
    /// Creates a new port open error.
    #[must_use]
    pub fn port_open(port_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PortOpen {
            port_name: port_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Creates a new configuration parse error.
    #[must_use]
    pub fn config_parse(msg: impl Into<String>) -> Self {
        Self::ConfigParse(msg.into())
    }

    /// Creates a new runtime error.
    #[must_use]
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

/// Transient failure while reading a line from a channel.
///
/// These never leave the acquisition loop; they trigger a backoff cycle.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Underlying transport error.
    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device went away (end of stream).
    #[error("Device disconnected")]
    Disconnected,

    /// The channel was closed locally.
    #[error("Channel closed")]
    Closed,

    /// A line arrived that is not valid text. Carries the hex-encoded bytes.
    #[error("Undecodable line: {0}")]
    InvalidData(String),

    /// No line arrived within the stall timeout.
    #[error("No data received for {0:?}")]
    Timeout(Duration),
}

impl ChannelError {
    /// Creates a new I/O error from a message.
    #[must_use]
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }
}

/// Reason a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The line was empty after trimming the line terminator.
    #[error("Empty frame")]
    Empty,

    /// Fewer fields than the grammar requires.
    #[error("Expected at least {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A mapped field is not a base-10 integer.
    #[error("Field {index} is not an integer: {field:?}")]
    InvalidNumber { index: usize, field: String },

    /// Scaling the field overflowed.
    #[error("Field {index} value {value} overflows when scaled by {scale}")]
    Overflow { index: usize, value: i32, scale: i32 },
}

//! # Encoding Module
//!
//! This module turns raw line bytes received from a sensor into text.
//! Devices in this family emit 7-bit ASCII terminated by `\n` or `\r\n`.

use crate::error::ChannelError;

/// Removes a trailing `\n`, `\r\n` or stray `\r` from a line.
///
/// # Examples
///
/// ```
/// use serial_sensors::serial::encoding::strip_terminator;
///
/// assert_eq!(strip_terminator("10,20,30\r\n"), "10,20,30");
/// assert_eq!(strip_terminator("STAT:1,2,3,4\n"), "STAT:1,2,3,4");
/// assert_eq!(strip_terminator("Range 12"), "Range 12");
/// ```
#[must_use]
pub fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Decodes the bytes of one line into text.
///
/// # Arguments
///
/// * `source_data` - The bytes of one line, with or without its terminator
///
/// # Returns
///
/// The line without its terminator, or [`ChannelError::InvalidData`]
/// carrying the hex-encoded bytes when they are not valid UTF-8.
///
/// # Examples
///
/// ```
/// use serial_sensors::serial::encoding::decode_line;
///
/// assert_eq!(decode_line(b"Range 245\r\n").unwrap(), "Range 245");
/// assert!(decode_line(&[0xFF, 0xFE, b'\n']).is_err());
/// ```
pub fn decode_line(source_data: &[u8]) -> Result<String, ChannelError> {
    match std::str::from_utf8(source_data) {
        Ok(text) => Ok(strip_terminator(text).to_string()),
        Err(_) => Err(ChannelError::InvalidData(hex::encode(source_data))),
    }
}

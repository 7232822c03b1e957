//! # Frame Module
//!
//! Decodes one telemetry line against a [`Grammar`].

use super::grammar::Grammar;
use super::reading::Measurement;
use crate::error::FrameError;

/// Successful outcome of decoding a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The line carried a full set of values.
    Measurement(Measurement),
    /// The device reported that nothing is in range. Not an error.
    OutOfRange,
}

/// Decodes `line` according to `grammar`.
///
/// The sentinel is matched against the whole line before any splitting, so
/// a line containing it is always [`Frame::OutOfRange`]. Otherwise the line
/// is split on every delimiter (empty pieces keep their position), each
/// mapped field is parsed as a base-10 integer and multiplied by the
/// grammar's scale.
///
/// # Examples
///
/// ```
/// use serial_sensors::sensor::{frame::{parse_frame, Frame}, grammar::Grammar, reading::Axis};
///
/// let Ok(Frame::Measurement(m)) = parse_frame("10,20,30\r\n", &Grammar::infrared()) else {
///     panic!("expected a measurement");
/// };
/// assert_eq!(m.get(Axis::X), Some(100));
/// assert_eq!(m.get(Axis::Z), Some(300));
///
/// let frame = parse_frame("out of range", &Grammar::ranging(Axis::X)).unwrap();
/// assert_eq!(frame, Frame::OutOfRange);
/// ```
pub fn parse_frame(line: &str, grammar: &Grammar) -> Result<Frame, FrameError> {
    if let Some(sentinel) = grammar.sentinel.as_deref()
        && !sentinel.is_empty()
        && line.contains(sentinel)
    {
        return Ok(Frame::OutOfRange);
    }

    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(FrameError::Empty);
    }

    let parts: Vec<&str> = line.split(grammar.delimiters.as_slice()).collect();
    if parts.len() < grammar.field_count {
        return Err(FrameError::FieldCount {
            expected: grammar.field_count,
            found: parts.len(),
        });
    }

    let mut values = Vec::with_capacity(grammar.fields.len());
    for &(index, axis) in &grammar.fields {
        let field = parts.get(index).ok_or(FrameError::FieldCount {
            expected: index + 1,
            found: parts.len(),
        })?;
        let value = parse_field(index, field, grammar.scale)?;
        values.push((axis, value));
    }

    // Grammar::validate rejects empty field maps; an unvalidated one lands here.
    Measurement::from_values(values)
        .map(Frame::Measurement)
        .ok_or(FrameError::Empty)
}

fn parse_field(index: usize, field: &str, scale: i32) -> Result<i32, FrameError> {
    let trimmed = field.trim();
    let value: i32 = trimmed.parse().map_err(|_| FrameError::InvalidNumber {
        index,
        field: trimmed.to_string(),
    })?;
    value
        .checked_mul(scale)
        .ok_or(FrameError::Overflow { index, value, scale })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::reading::Axis;

    fn measurement(line: &str, grammar: &Grammar) -> Measurement {
        match parse_frame(line, grammar) {
            Ok(Frame::Measurement(m)) => m,
            other => panic!("expected measurement for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_infrared_scales_to_millimetres() {
        let m = measurement("10,20,30\n", &Grammar::infrared());
        assert_eq!(m.get(Axis::X), Some(100));
        assert_eq!(m.get(Axis::Y), Some(200));
        assert_eq!(m.get(Axis::Z), Some(300));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn test_infrared_with_carriage_return() {
        let m = measurement("7,8,9\r\n", &Grammar::infrared());
        assert_eq!(m.get(Axis::Z), Some(90));
    }

    #[test]
    fn test_combined_frame() {
        let m = measurement("STAT:500,100,200,300\n", &Grammar::combined());
        assert_eq!(m.get(Axis::Mass), Some(500));
        assert_eq!(m.get(Axis::X), Some(100));
        assert_eq!(m.get(Axis::Y), Some(200));
        assert_eq!(m.get(Axis::Z), Some(300));
    }

    #[test]
    fn test_combined_negative_values() {
        let m = measurement("STAT:-12,0,-1,+4", &Grammar::combined());
        assert_eq!(m.get(Axis::Mass), Some(-12));
        assert_eq!(m.get(Axis::Y), Some(-1));
        assert_eq!(m.get(Axis::Z), Some(4));
    }

    #[test]
    fn test_ranging_frame() {
        let m = measurement("Range 245\r\n", &Grammar::ranging(Axis::Y));
        assert_eq!(m.get(Axis::Y), Some(245));
        assert_eq!(m.get(Axis::X), None);
    }

    #[test]
    fn test_ranging_tolerates_extra_fields() {
        let m = measurement("Range 245 mm", &Grammar::ranging(Axis::X));
        assert_eq!(m.get(Axis::X), Some(245));
    }

    #[test]
    fn test_sentinel_anywhere_is_out_of_range() {
        let grammar = Grammar::ranging(Axis::X);
        for line in [
            "out of range",
            "out of range\r\n",
            "Range out of range",
            "xx out of range 12 garbage,,,",
        ] {
            assert_eq!(parse_frame(line, &grammar), Ok(Frame::OutOfRange), "{line:?}");
        }
    }

    #[test]
    fn test_sentinel_checked_before_splitting() {
        // Would be malformed (one field) without the sentinel check.
        let mut grammar = Grammar::infrared();
        grammar.sentinel = Some("ERR".to_string());
        assert_eq!(parse_frame("ERR", &grammar), Ok(Frame::OutOfRange));
    }

    #[test]
    fn test_too_few_fields() {
        let err = parse_frame("garbage\n", &Grammar::combined()).unwrap_err();
        assert_eq!(
            err,
            FrameError::FieldCount {
                expected: 5,
                found: 1
            }
        );
        assert!(matches!(
            parse_frame("1,2", &Grammar::infrared()),
            Err(FrameError::FieldCount { .. })
        ));
    }

    #[test]
    fn test_non_numeric_field() {
        let err = parse_frame("STAT:500,abc,200,300", &Grammar::combined()).unwrap_err();
        assert_eq!(
            err,
            FrameError::InvalidNumber {
                index: 2,
                field: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_empty_field_is_malformed() {
        assert!(matches!(
            parse_frame("1,,3", &Grammar::infrared()),
            Err(FrameError::InvalidNumber { index: 1, .. })
        ));
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(parse_frame("\r\n", &Grammar::infrared()), Err(FrameError::Empty));
        assert_eq!(parse_frame("", &Grammar::ranging(Axis::X)), Err(FrameError::Empty));
    }

    #[test]
    fn test_scale_overflow() {
        let line = format!("{},0,0", i32::MAX);
        assert!(matches!(
            parse_frame(&line, &Grammar::infrared()),
            Err(FrameError::Overflow { index: 0, .. })
        ));
    }

    #[test]
    fn test_non_ascii_never_panics() {
        let grammar = Grammar::combined();
        for line in ["STAT:５,1,2,3", "ÿÿÿÿ", "::::", "STAT:1,2,3,4,5,6"] {
            let _ = parse_frame(line, &grammar);
        }
        assert!(parse_frame("STAT:1,2,3,4,5,6", &grammar).is_ok());
    }
}

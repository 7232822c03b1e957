//! # Grammar Module
//!
//! Declarative description of a device's frame layout. One parser serves
//! every device in the family; a new device variant is a new [`Grammar`]
//! value, not a new code path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::reading::Axis;
use crate::error::{Result, SensorError};

/// Baud rate of the combined mass/XYZ controller and the infrared board.
pub const COMBINED_BAUD_RATE: u32 = 9600;

/// Baud rate of the per-axis time-of-flight ranging boards.
pub const RANGING_BAUD_RATE: u32 = 115200;

/// Sentinel printed by the ranging boards when nothing is in range.
pub const OUT_OF_RANGE: &str = "out of range";

/// Frame layout of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    /// Characters that separate fields.
    pub delimiters: Vec<char>,
    /// Minimum number of fields after splitting.
    pub field_count: usize,
    /// Field index to axis mapping.
    pub fields: Vec<(usize, Axis)>,
    /// Multiplier applied to every decoded field.
    pub scale: i32,
    /// Substring marking a frame as "nothing in range".
    #[serde(default)]
    pub sentinel: Option<String>,
}

impl Grammar {
    /// `STAT:<mass_g>,<x_mm>,<y_mm>,<z_mm>`
    pub fn combined() -> Self {
        Self {
            delimiters: vec![':', ','],
            field_count: 5,
            fields: vec![(1, Axis::Mass), (2, Axis::X), (3, Axis::Y), (4, Axis::Z)],
            scale: 1,
            sentinel: None,
        }
    }

    /// `<x_cm>,<y_cm>,<z_cm>`, scaled to millimetres.
    pub fn infrared() -> Self {
        Self {
            delimiters: vec![','],
            field_count: 3,
            fields: vec![(0, Axis::X), (1, Axis::Y), (2, Axis::Z)],
            scale: 10,
            sentinel: None,
        }
    }

    /// `<prefix> <range_mm>` or `out of range`, for a board measuring `axis`.
    pub fn ranging(axis: Axis) -> Self {
        Self {
            delimiters: vec![' '],
            field_count: 2,
            fields: vec![(1, axis)],
            scale: 1,
            sentinel: Some(OUT_OF_RANGE.to_string()),
        }
    }

    /// Axes a frame of this grammar produces.
    pub fn axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.fields.iter().map(|(_, axis)| *axis)
    }

    /// Checks that the layout is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.delimiters.is_empty() {
            return Err(SensorError::invalid_config("grammar has no delimiters"));
        }
        if self.fields.is_empty() {
            return Err(SensorError::invalid_config("grammar maps no fields"));
        }
        if self.scale == 0 {
            return Err(SensorError::invalid_config("grammar scale must be non-zero"));
        }
        if self.sentinel.as_deref() == Some("") {
            return Err(SensorError::invalid_config("grammar sentinel is empty"));
        }
        let mut seen = BTreeSet::new();
        for (index, axis) in &self.fields {
            if *index >= self.field_count {
                return Err(SensorError::invalid_config(format!(
                    "field index {index} for axis {axis} is outside the {} required fields",
                    self.field_count
                )));
            }
            if !seen.insert(*axis) {
                return Err(SensorError::invalid_config(format!(
                    "axis {axis} is mapped twice"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(Grammar::combined().validate().is_ok());
        assert!(Grammar::infrared().validate().is_ok());
        assert!(Grammar::ranging(Axis::Y).validate().is_ok());
    }

    #[test]
    fn test_ranging_axes() {
        let axes: Vec<_> = Grammar::ranging(Axis::Z).axes().collect();
        assert_eq!(axes, vec![Axis::Z]);
    }

    #[test]
    fn test_validate_index_out_of_bounds() {
        let mut grammar = Grammar::infrared();
        grammar.fields.push((3, Axis::Mass));
        assert!(grammar.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_axis() {
        let mut grammar = Grammar::combined();
        grammar.fields[1] = (2, Axis::Mass);
        let err = grammar.validate().unwrap_err();
        assert!(err.to_string().contains("mapped twice"));
    }

    #[test]
    fn test_validate_zero_scale() {
        let mut grammar = Grammar::infrared();
        grammar.scale = 0;
        assert!(grammar.validate().is_err());
    }

    #[test]
    fn test_validate_no_delimiters() {
        let mut grammar = Grammar::ranging(Axis::X);
        grammar.delimiters.clear();
        assert!(grammar.validate().is_err());
    }
}

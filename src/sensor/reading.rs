//! # Reading Module
//!
//! Decoded measurement types. A [`Measurement`] is the set of axis values
//! taken from one frame; a [`Reading`] is a published, immutable snapshot of
//! a measurement stamped with its sequence number and arrival time.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One physical measurement dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Mass in grams.
    Mass,
    /// X distance in millimetres.
    X,
    /// Y distance in millimetres.
    Y,
    /// Z distance in millimetres.
    Z,
}

impl Axis {
    /// Unit of the values carried on this axis.
    pub fn unit(&self) -> &'static str {
        match self {
            Axis::Mass => "g",
            Axis::X | Axis::Y | Axis::Z => "mm",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Mass => write!(f, "mass"),
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// Axis values decoded from a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    values: BTreeMap<Axis, i32>,
}

impl Measurement {
    /// Builds a measurement from decoded `(axis, value)` pairs.
    ///
    /// Returns `None` when no values are given; an empty measurement is never
    /// published.
    pub fn from_values(values: impl IntoIterator<Item = (Axis, i32)>) -> Option<Self> {
        let values: BTreeMap<Axis, i32> = values.into_iter().collect();
        if values.is_empty() {
            None
        } else {
            Some(Self { values })
        }
    }

    /// Value for `axis`, if this frame carried it.
    pub fn get(&self, axis: Axis) -> Option<i32> {
        self.values.get(&axis).copied()
    }

    /// Axes present in this measurement, in `Axis` order.
    pub fn axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.values.keys().copied()
    }

    /// `(axis, value)` pairs in `Axis` order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, i32)> + '_ {
        self.values.iter().map(|(axis, value)| (*axis, *value))
    }

    /// Number of axes carried.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a constructed measurement.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (axis, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{axis}={value}{}", axis.unit())?;
            first = false;
        }
        Ok(())
    }
}

/// A published measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    sequence: u64,
    received_at: DateTime<Local>,
    measurement: Measurement,
}

impl Reading {
    /// Stamps `measurement` with `sequence` and the current local time.
    pub fn new(sequence: u64, measurement: Measurement) -> Self {
        Self {
            sequence,
            received_at: Local::now(),
            measurement,
        }
    }

    /// Position of this reading in its channel's stream, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Local time at which the frame was decoded.
    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    /// Decoded values.
    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    /// Shortcut for `measurement().get(axis)`.
    pub fn get(&self, axis: Axis) -> Option<i32> {
        self.measurement.get(axis)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] #{} {}",
            self.received_at.format("%Y-%m-%d %H:%M:%S.%3f"),
            self.sequence,
            self.measurement
        )
    }
}

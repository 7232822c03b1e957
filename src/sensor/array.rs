//! # Sensor Array
//!
//! Several acquisition loops presented as one logical sensor, e.g. three
//! single-axis ranging boards forming an X/Y/Z rig.
//!
//! Each member keeps its own task and its own latest reading. A
//! [`Snapshot`] reads every member independently, so the axes of one
//! snapshot may come from frames received at different times.

use log::info;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::acquisition::{AcquisitionLoop, LoopConfig};
use super::grammar::{Grammar, RANGING_BAUD_RATE};
use super::reading::{Axis, Reading};
use super::subscription::SubscriptionHandle;
use crate::config::ArrayConfig;
use crate::error::{Result, SensorError};
use crate::serial::PortSettings;

/// A reading re-emitted by the array, tagged with the member it came from.
#[derive(Debug, Clone)]
pub struct ArrayEvent {
    /// Name of the originating member.
    pub source: Arc<str>,
    /// The member's reading.
    pub reading: Arc<Reading>,
}

impl fmt::Display for ArrayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reading)
    }
}

/// Latest value per axis across all members.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    values: BTreeMap<Axis, Option<i32>>,
}

impl Snapshot {
    /// Latest value of `axis`, `None` if the axis has no reading yet or is
    /// not measured by this array.
    pub fn get(&self, axis: Axis) -> Option<i32> {
        self.values.get(&axis).copied().flatten()
    }

    /// True if some member measures `axis`.
    pub fn contains(&self, axis: Axis) -> bool {
        self.values.contains_key(&axis)
    }

    /// Every measured axis with its latest value.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, Option<i32>)> + '_ {
        self.values.iter().map(|(axis, value)| (*axis, *value))
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (axis, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            match value {
                Some(value) => write!(f, "{axis}={value}{}", axis.unit())?,
                None => write!(f, "{axis}=-")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Named acquisition loops composed into one sensor.
#[derive(Debug)]
pub struct SensorArray {
    members: Vec<AcquisitionLoop>,
}

impl SensorArray {
    /// Composes `members`. Names must be unique and no axis may be measured
    /// by two members.
    pub fn new(members: Vec<AcquisitionLoop>) -> Result<Self> {
        if members.is_empty() {
            return Err(SensorError::invalid_config("sensor array has no members"));
        }
        let mut names = BTreeSet::new();
        let mut axes = BTreeMap::new();
        for member in &members {
            if !names.insert(member.name()) {
                return Err(SensorError::invalid_config(format!(
                    "duplicate member '{}'",
                    member.name()
                )));
            }
            for axis in member.grammar().axes() {
                if let Some(other) = axes.insert(axis, member.name()) {
                    return Err(SensorError::invalid_config(format!(
                        "axis {axis} is measured by both '{other}' and '{}'",
                        member.name()
                    )));
                }
            }
        }
        Ok(Self { members })
    }

    /// Opens every device listed in `config`.
    ///
    /// Must be called from inside a tokio runtime. The configuration is
    /// validated before any port is opened. Fails on the first device that
    /// cannot be opened; devices already opened are released.
    pub fn from_config(config: &ArrayConfig) -> Result<Self> {
        config.validate()?;
        let loop_config = config.loop_config();
        let mut members = Vec::with_capacity(config.members.len());
        for member in &config.members {
            members.push(AcquisitionLoop::open(
                member.name.as_str(),
                &member.port_settings(),
                member.grammar.to_grammar(),
                loop_config,
            )?);
        }
        Self::new(members)
    }

    /// Three single-axis time-of-flight boards, one per port.
    pub fn ranging(x_port: &str, y_port: &str, z_port: &str, config: LoopConfig) -> Result<Self> {
        let mut members = Vec::with_capacity(3);
        for (axis, port) in [(Axis::X, x_port), (Axis::Y, y_port), (Axis::Z, z_port)] {
            let settings = PortSettings::new(port, RANGING_BAUD_RATE);
            members.push(AcquisitionLoop::open(
                axis.to_string(),
                &settings,
                Grammar::ranging(axis),
                config,
            )?);
        }
        Self::new(members)
    }

    /// Starts every member.
    pub fn start(&self) -> Result<()> {
        for member in &self.members {
            member.start()?;
        }
        info!("sensor array started with {} members", self.members.len());
        Ok(())
    }

    /// Requests every member to close.
    pub fn close(&self) {
        for member in &self.members {
            member.close();
        }
    }

    /// Resolves once every member is closed.
    pub async fn wait_closed(&self) {
        for member in &self.members {
            member.wait_closed().await;
        }
    }

    /// Latest value of every measured axis.
    pub fn snapshot(&self) -> Snapshot {
        let mut values = BTreeMap::new();
        for member in &self.members {
            let latest = member.latest();
            for axis in member.grammar().axes() {
                values.insert(axis, latest.as_ref().and_then(|r| r.get(axis)));
            }
        }
        Snapshot { values }
    }

    /// Latest value of a single axis.
    pub fn distance(&self, axis: Axis) -> Option<i32> {
        self.members
            .iter()
            .find(|member| member.grammar().axes().any(|a| a == axis))
            .and_then(|member| member.latest())
            .and_then(|reading| reading.get(axis))
    }

    /// Calls `callback` with every reading of every member, tagged with the
    /// member's name. Order is preserved per member only.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ArrayEvent) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let handles = self.members.iter().map(|member| {
            let source = member.shared_name();
            let callback = Arc::clone(&callback);
            member.subscribe(move |reading| {
                (*callback)(&ArrayEvent {
                    source: Arc::clone(&source),
                    reading: Arc::clone(reading),
                });
            })
        });
        SubscriptionHandle::combine(handles.collect::<Vec<_>>())
    }

    /// Like [`subscribe`](Self::subscribe), delivering into an unbounded channel.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<ArrayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (handle, rx)
    }

    /// Member by name.
    pub fn member(&self, name: &str) -> Option<&AcquisitionLoop> {
        self.members.iter().find(|member| member.name() == name)
    }

    /// All members, in construction order.
    pub fn members(&self) -> &[AcquisitionLoop] {
        &self.members
    }
}

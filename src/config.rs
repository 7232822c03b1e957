//! # Configuration Module
//!
//! Sensor array description stored as a RON file:
//!
//! ```ron
//! (
//!     backoff_ms: 100,
//!     members: [
//!         (name: "X", port: "/dev/ttyUSB0", grammar: Ranging(X)),
//!         (name: "Y", port: "/dev/ttyUSB1", grammar: Ranging(Y)),
//!         (name: "Z", port: "/dev/ttyUSB2", grammar: Ranging(Z)),
//!     ],
//! )
//! ```

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SensorError};
use crate::sensor::acquisition::{Backoff, DEFAULT_BACKOFF, LoopConfig};
use crate::sensor::grammar::{COMBINED_BAUD_RATE, Grammar, RANGING_BAUD_RATE};
use crate::sensor::reading::Axis;
use crate::serial::PortSettings;

/// Configuration file read by the monitor binary when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config/sensors.ron";

fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF.as_millis() as u64
}

/// Frame layout of a member, by preset or spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrammarConfig {
    /// `STAT:<mass_g>,<x_mm>,<y_mm>,<z_mm>`
    Combined,
    /// `<x_cm>,<y_cm>,<z_cm>`
    Infrared,
    /// `<prefix> <range_mm>` or `out of range`
    Ranging(Axis),
    /// Any other layout.
    Custom(Grammar),
}

impl GrammarConfig {
    /// Resolves the preset into a grammar.
    pub fn to_grammar(&self) -> Grammar {
        match self {
            GrammarConfig::Combined => Grammar::combined(),
            GrammarConfig::Infrared => Grammar::infrared(),
            GrammarConfig::Ranging(axis) => Grammar::ranging(*axis),
            GrammarConfig::Custom(grammar) => grammar.clone(),
        }
    }

    /// Baud rate of the device family. Custom layouts get the 9600 baud
    /// of the combined controller.
    pub fn default_baud_rate(&self) -> u32 {
        match self {
            GrammarConfig::Ranging(_) => RANGING_BAUD_RATE,
            GrammarConfig::Combined | GrammarConfig::Infrared | GrammarConfig::Custom(_) => {
                COMBINED_BAUD_RATE
            }
        }
    }
}

/// One device of the array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Name used to tag events and in log messages.
    pub name: String,
    /// Serial port, e.g. `/dev/ttyUSB0` or `COM5`.
    pub port: String,
    /// Overrides the grammar's usual baud rate.
    #[serde(default)]
    pub baud_rate: Option<u32>,
    /// Frame layout.
    pub grammar: GrammarConfig,
}

impl MemberConfig {
    /// Serial settings of this member, honouring the baud rate override.
    pub fn port_settings(&self) -> PortSettings {
        let baud_rate = self
            .baud_rate
            .unwrap_or_else(|| self.grammar.default_baud_rate());
        PortSettings::new(self.port.as_str(), baud_rate)
    }
}

/// Whole sensor array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Delay after a read failure or malformed frame.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// When set, the delay doubles with each consecutive error up to this cap.
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    /// Longest silence tolerated from a device before it counts as a failure.
    #[serde(default)]
    pub stall_timeout_ms: Option<u64>,
    /// Devices.
    pub members: Vec<MemberConfig>,
}

impl ArrayConfig {
    /// Reads and validates a RON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&data)?;
        info!(
            "loaded sensor configuration from {} ({} members)",
            path.display(),
            config.members.len()
        );
        Ok(config)
    }

    /// Parses and validates RON text.
    pub fn from_ron(data: &str) -> Result<Self> {
        let config: ArrayConfig = ron::from_str(data).map_err(|e| {
            warn!("failed to parse sensor configuration: {e}");
            SensorError::config_parse(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises to pretty RON.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SensorError::config_parse(e.to_string()))
    }

    /// Checks member names, ports and grammars, and that no axis is
    /// measured by two members.
    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(SensorError::invalid_config("no members configured"));
        }
        if self.backoff_ms == 0 {
            return Err(SensorError::invalid_config("backoff_ms must be positive"));
        }
        if let Some(max) = self.max_backoff_ms
            && max < self.backoff_ms
        {
            return Err(SensorError::invalid_config(
                "max_backoff_ms is smaller than backoff_ms",
            ));
        }
        if self.stall_timeout_ms == Some(0) {
            return Err(SensorError::invalid_config("stall_timeout_ms must be positive"));
        }
        let mut names = BTreeSet::new();
        let mut axes: BTreeMap<Axis, &str> = BTreeMap::new();
        for member in &self.members {
            if member.name.is_empty() {
                return Err(SensorError::invalid_config("member name is empty"));
            }
            if member.port.is_empty() {
                return Err(SensorError::invalid_config(format!(
                    "member '{}' has no port",
                    member.name
                )));
            }
            if member.baud_rate == Some(0) {
                return Err(SensorError::invalid_config(format!(
                    "member '{}' has a zero baud rate",
                    member.name
                )));
            }
            if !names.insert(member.name.as_str()) {
                return Err(SensorError::invalid_config(format!(
                    "duplicate member '{}'",
                    member.name
                )));
            }
            let grammar = member.grammar.to_grammar();
            grammar.validate()?;
            for axis in grammar.axes() {
                if let Some(other) = axes.insert(axis, member.name.as_str()) {
                    return Err(SensorError::invalid_config(format!(
                        "axis {axis} is measured by both '{other}' and '{}'",
                        member.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Loop tuning shared by every member.
    pub fn loop_config(&self) -> LoopConfig {
        let initial = Duration::from_millis(self.backoff_ms);
        let backoff = match self.max_backoff_ms {
            Some(max) => Backoff::Exponential {
                initial,
                max: Duration::from_millis(max),
            },
            None => Backoff::Fixed(initial),
        };
        LoopConfig {
            backoff,
            stall_timeout: self.stall_timeout_ms.map(Duration::from_millis),
        }
    }
}

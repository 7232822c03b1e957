//! # Serial Sensors
//!
//! Streaming acquisition of distance and mass telemetry from line-oriented
//! serial sensor boards.
//!
//! Each device prints one ASCII frame per measurement. An acquisition loop
//! per device reads those frames on its own tokio task, decodes them with a
//! declarative grammar, keeps the latest reading and pushes every new
//! reading to subscribers. Malformed frames and read failures are absorbed
//! with a short backoff; application code only ever sees valid readings or
//! the absence of one.
//!
//! ## Architecture
//!
//! The project is organized into the following modules:
//!
//! - [`serial`]: Line transports (tokio-serial and in-memory)
//! - [`sensor`]: Frame grammar, acquisition loops and sensor arrays
//! - [`ultrasonic`]: Request/response ultrasonic ranging device
//! - [`config`]: RON configuration of a sensor array
//! - [`error`]: Custom error types
//!
//! ## Usage
//!
//! ```no_run
//! use serial_sensors::prelude::*;
//!
//! # async fn demo() -> serial_sensors::error::Result<()> {
//! let array = SensorArray::ranging("/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2", LoopConfig::default())?;
//! let _subscription = array.subscribe(|event| println!("{event}"));
//! array.start()?;
//! let x_mm = array.distance(Axis::X);
//! # let _ = x_mm;
//! array.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod sensor;
pub mod serial;
pub mod ultrasonic;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::ArrayConfig;
    pub use crate::error::*;
    pub use crate::sensor::{
        AcquisitionLoop, ArrayEvent, Axis, Grammar, LoopConfig, Reading, SensorArray,
        SubscriptionHandle,
    };
    pub use crate::serial::{LineChannel, PortSettings};
}

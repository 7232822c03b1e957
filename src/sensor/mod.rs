//! # Sensor Module
//!
//! Frame decoding, per-device acquisition and multi-device composition.

pub mod acquisition;
pub mod array;
pub mod frame;
pub mod grammar;
pub mod reading;
pub mod store;
pub mod subscription;

pub use acquisition::{AcquisitionLoop, Backoff, LoopConfig, LoopState, LoopStats};
pub use array::{ArrayEvent, SensorArray, Snapshot};
pub use frame::{Frame, parse_frame};
pub use grammar::Grammar;
pub use reading::{Axis, Measurement, Reading};
pub use store::ReadingStore;
pub use subscription::SubscriptionHandle;

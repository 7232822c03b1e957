//! # Serial Module
//!
//! Line transports feeding the acquisition loops: the [`LineChannel`]
//! abstraction, its tokio-serial implementation and an in-memory one.

pub mod channel;
pub mod encoding;
pub mod memory;
pub mod port;

pub use channel::{LineChannel, LineReader};
pub use memory::{LineFeeder, MemoryLineChannel};
pub use port::{PortSettings, SerialLineChannel, open_port};

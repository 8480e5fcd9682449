//! iqgate-core: Core types, traits, and error definitions for iqgate.
//!
//! This crate defines the hardware-agnostic abstractions shared by the
//! device engine crates. DSP pipelines, control surfaces, and tests depend
//! on these types without pulling in any specific SDK binding.
//!
//! # Key types
//!
//! - [`SdrSdk`] / [`SdrHandle`] -- the opaque hardware session seam
//! - [`OutputSettings`] -- the declarative settings snapshot
//! - [`DeviceCommand`] -- the asynchronous command protocol
//! - [`SampleFifo`] -- bounded blocking sample buffer
//! - [`Error`] / [`Result`] -- error handling

pub mod command;
pub mod error;
pub mod events;
pub mod fifo;
pub mod sdk;
pub mod settings;
pub mod types;

// Re-export key types at crate root for ergonomic `use iqgate_core::*`.
pub use command::DeviceCommand;
pub use error::{Error, Result};
pub use events::PipelineNotification;
pub use fifo::{SampleFifo, fifo_capacity};
pub use sdk::{SdrHandle, SdrSdk};
pub use settings::{OutputSettings, Xb200Filter, Xb200Path};
pub use types::{Direction, IqSample, StreamConfig};

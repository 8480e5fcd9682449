//! iqgate-bladerf: the BladeRF1 transmit device engine.
//!
//! This crate owns the hardware session and everything between the command
//! queue and the DAC: it reconciles declarative settings snapshots against
//! live device state, runs the dedicated streaming worker, and coordinates
//! with the buddy device (the receive direction sharing the same physical
//! chip) through an explicit registry.
//!
//! # Architecture
//!
//! ```text
//! GUI / remote API / deserialization
//!         |  DeviceCommand (tokio mpsc, ownership transfer)
//!         v
//! CommandProcessor -> BladeRfOutput::apply_settings (reconciler)
//!         |                 |            \
//!         |                 v             v
//!         |           SdrHandle      RemoteSyncSink (fire-and-forget HTTP)
//!         v
//! OutputWorker (std thread) <- SampleFifo <- DSP pipeline
//! ```
//!
//! Two execution contexts exist per logical device: the command-processing
//! context mutates the confirmed settings and the hardware handle; the
//! worker thread only reads the interpolation factor (an atomic) and the
//! FIFO. Reconfiguration that affects the stream always fully stops the
//! worker first, so the join in [`OutputWorker::stop`] is the sole
//! synchronization barrier.

pub mod device;
pub mod processor;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod worker;

pub use device::BladeRfOutput;
pub use processor::CommandProcessor;
pub use reconcile::ReconcilePlan;
pub use registry::{BuddyRegistry, EngineState, SharedParams};
pub use remote::{RemoteSyncSink, SyncRequest, SyncTransport};
pub use worker::OutputWorker;

//! The asynchronous command protocol.
//!
//! Commands decouple callers (GUI, remote API, startup deserialization)
//! from the hardware-owning context. They are delivered through a
//! `tokio::sync::mpsc` queue: FIFO, thread-safe, with ownership of each
//! message transferred to the queue on push and to the processor on pop.
//!
//! The same enum doubles as the GUI notification echo: whenever the engine
//! mutates settings on a caller's behalf it mirrors the command to the GUI
//! queue so the settings editor can re-render.

use crate::settings::OutputSettings;

/// A command consumed by the device's command processor.
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    /// Reconcile the confirmed settings against a requested snapshot.
    Configure {
        /// The requested settings snapshot.
        settings: OutputSettings,
        /// Apply every parameter even if its value is unchanged.
        force: bool,
    },

    /// Start or stop sample generation and the stream worker.
    StartStop {
        /// `true` to start, `false` to stop.
        start: bool,
    },
}

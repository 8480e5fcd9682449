//! The command-processing loop.
//!
//! Commands arrive on the device's unbounded queue (ownership transfer,
//! no shared mutation) and are consumed strictly in order by a single
//! task. Serializing all settings and lifecycle changes through this one
//! consumer is what lets [`BladeRfOutput`] stay lock-free internally.

use tokio::sync::mpsc;

use iqgate_core::command::DeviceCommand;

use crate::device::BladeRfOutput;

/// Single consumer of a device's inbound command queue.
pub struct CommandProcessor {
    device: BladeRfOutput,
    commands: mpsc::UnboundedReceiver<DeviceCommand>,
}

impl CommandProcessor {
    /// Bind a device to its command receiver.
    pub fn new(device: BladeRfOutput, commands: mpsc::UnboundedReceiver<DeviceCommand>) -> Self {
        CommandProcessor { device, commands }
    }

    /// Consume commands until every sender is dropped.
    ///
    /// Returns the device so the caller can inspect final state or tear it
    /// down explicitly.
    pub async fn run(mut self) -> BladeRfOutput {
        tracing::debug!("command processor started");
        while let Some(command) = self.commands.recv().await {
            self.device.handle_command(command);
        }
        tracing::debug!("command processor stopped");
        self.device
    }

    /// The device under this processor's control.
    pub fn device(&self) -> &BladeRfOutput {
        &self.device
    }

    /// Mutable access for setup before the loop starts (open, restore).
    pub fn device_mut(&mut self) -> &mut BladeRfOutput {
        &mut self.device
    }
}

//! Notifications produced by the device engine.
//!
//! Delivered through `tokio::sync::mpsc` queues to the owning DSP
//! pipeline. GUI echoes reuse [`DeviceCommand`](crate::DeviceCommand)
//! directly and are not duplicated here.

/// Effective rate/frequency change notification for the DSP pipeline.
///
/// Emitted after a reconciliation pass whenever the device sample rate,
/// interpolation factor, or center frequency changed, so downstream stages
/// can retune without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineNotification {
    /// New effective (baseband) sample rate in samples per second.
    pub sample_rate: u32,
    /// New center frequency in hertz.
    pub center_frequency: u64,
}

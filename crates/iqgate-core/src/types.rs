//! Shared value types: stream direction, sample format, transport tuning.

use serde::{Deserialize, Serialize};

/// Streaming direction of a logical device on the physical transceiver.
///
/// One physical chip carries up to two logical devices, one per direction.
/// The device running the opposite direction is the "buddy".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Receive: samples flow from the hardware into the DSP pipeline.
    Rx,
    /// Transmit: samples flow from the DSP pipeline into the hardware.
    Tx,
}

impl Direction {
    /// The opposite direction -- the buddy's side of the chip.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Rx => Direction::Tx,
            Direction::Tx => Direction::Rx,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Rx => write!(f, "rx"),
            Direction::Tx => write!(f, "tx"),
        }
    }
}

/// One complex baseband sample in the SC16 Q11 wire format.
///
/// Both components are 12-bit values sign-extended to `i16`, matching what
/// the transceiver's synchronous transfer interface consumes and produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IqSample {
    /// In-phase component.
    pub re: i16,
    /// Quadrature component.
    pub im: i16,
}

impl IqSample {
    /// Create a sample from its components.
    pub fn new(re: i16, im: i16) -> Self {
        IqSample { re, im }
    }
}

/// Tuning parameters for the synchronous streaming transport.
///
/// Passed to the SDK once per `open()`, before the streaming direction is
/// enabled. The defaults mirror the values the transport has been run with
/// in production: 64 buffers of 8192 samples across 32 in-flight transfers,
/// with a 10 second transfer timeout so a wedged USB link cannot block
/// `stop()` forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Number of transport buffers allocated by the SDK.
    pub num_buffers: u32,
    /// Size of each transport buffer in samples.
    pub buffer_size: u32,
    /// Number of transfers the SDK keeps in flight.
    pub num_transfers: u32,
    /// Per-transfer timeout in milliseconds. Zero disables the timeout.
    pub timeout_ms: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            num_buffers: 64,
            buffer_size: 8192,
            num_transfers: 32,
            timeout_ms: 10_000,
        }
    }
}

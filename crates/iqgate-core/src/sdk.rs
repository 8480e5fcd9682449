//! The opaque SDK seam -- traits for the vendor hardware session.
//!
//! The engine never talks to USB directly; it programs against [`SdrSdk`]
//! (device acquisition) and [`SdrHandle`] (an open hardware session with
//! synchronous get/set-parameter calls and a blocking streaming primitive).
//! The real binding wraps the vendor C library; tests use the mock in
//! iqgate-test-harness.
//!
//! All methods are synchronous because the underlying SDK is: parameter
//! writes are short register transactions, and [`submit_tx`](SdrHandle::submit_tx)
//! is the blocking transfer call that the stream worker drives from its own
//! dedicated thread.

use std::sync::Arc;

use crate::error::Result;
use crate::settings::{Xb200Filter, Xb200Path};
use crate::types::{Direction, IqSample, StreamConfig};

/// Entry point for acquiring hardware sessions.
pub trait SdrSdk: Send + Sync {
    /// Open the physical device identified by `serial`.
    ///
    /// Returns a shared handle; the buddy device attaches by cloning the
    /// `Arc` out of the registry rather than opening a second session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceOpen`](crate::Error::DeviceOpen) if the SDK
    /// cannot acquire the device.
    fn open(&self, serial: &str) -> Result<Arc<dyn SdrHandle>>;
}

/// An open hardware session on the physical transceiver.
///
/// Implementations must be safe to share between the command-processing
/// context and the streaming worker thread: parameter writes and transfer
/// submissions may be issued concurrently from the two contexts.
pub trait SdrHandle: Send + Sync {
    /// Configure the synchronous streaming transport for one direction.
    fn configure_stream(&self, dir: Direction, config: &StreamConfig) -> Result<()>;

    /// Enable or disable the streaming module for one direction.
    fn enable_module(&self, dir: Direction, on: bool) -> Result<()>;

    /// Set the device sample rate. Returns the actual rate the hardware
    /// settled on, which may differ slightly from the request.
    fn set_sample_rate(&self, dir: Direction, rate: u32) -> Result<u32>;

    /// Set the analog filter bandwidth. Returns the actual bandwidth.
    fn set_bandwidth(&self, dir: Direction, bandwidth: u32) -> Result<u32>;

    /// Tune the center frequency in hertz.
    fn set_frequency(&self, dir: Direction, freq_hz: u64) -> Result<()>;

    /// Set the TX VGA1 gain in dB (pre-LPF stage).
    fn set_tx_vga1(&self, gain_db: i32) -> Result<()>;

    /// Set the TX VGA2 gain in dB (post-LPF stage).
    fn set_tx_vga2(&self, gain_db: i32) -> Result<()>;

    /// Attach or detach the XB-200 transverter expansion board.
    ///
    /// Rewires the RF front end, so the caller must make sure the buddy
    /// direction is not actively streaming.
    fn expansion_attach(&self, attach: bool) -> Result<()>;

    /// Select the XB-200 signal path for one direction.
    fn set_xb200_path(&self, dir: Direction, path: Xb200Path) -> Result<()>;

    /// Select the XB-200 filter bank for one direction.
    fn set_xb200_filter(&self, dir: Direction, filter: Xb200Filter) -> Result<()>;

    /// Submit one block of samples to the transmit stream.
    ///
    /// Blocks until the transport has accepted the block or the configured
    /// transfer timeout expires.
    fn submit_tx(&self, samples: &[IqSample]) -> Result<()>;

    /// Physically close the hardware session.
    ///
    /// Only the owning logical device calls this, and only when no buddy is
    /// registered for the other direction.
    fn close(&self);
}

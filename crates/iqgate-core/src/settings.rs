//! The declarative settings snapshot for the transmit device.
//!
//! Exactly one snapshot is "confirmed" (last successfully applied) per
//! logical device at any time. Callers never mutate the confirmed snapshot
//! in place: they clone it, edit the clone, and submit it through a
//! [`Configure`](crate::DeviceCommand::Configure) command. The reconciler
//! diffs the two snapshots and applies the minimal ordered set of hardware
//! changes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Signal path through the XB-200 transverter expansion board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Xb200Path {
    /// RF bypasses the transverter.
    Bypass,
    /// RF is mixed through the transverter.
    Mix,
}

/// Filter bank selection on the XB-200 expansion board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Xb200Filter {
    /// 50 MHz (6 meter) band filter.
    Band50M,
    /// 144 MHz (2 meter) band filter.
    Band144M,
    /// 222 MHz (1.25 meter) band filter.
    Band222M,
    /// User-installed custom filter.
    Custom,
    /// Automatic selection, 1 dB bandwidth criterion.
    Auto1dB,
    /// Automatic selection, 3 dB bandwidth criterion.
    Auto3dB,
}

/// All tunable parameters of the transmit device.
///
/// Immutable by convention once constructed; replaced wholesale when a
/// reconciliation pass succeeds. Persisted and restored as JSON bytes via
/// [`serialize`](OutputSettings::serialize) /
/// [`deserialize`](OutputSettings::deserialize).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Center frequency in hertz.
    pub center_frequency: u64,
    /// Device (DAC) sample rate in samples per second.
    pub dev_sample_rate: u32,
    /// Power-of-two interpolation factor between baseband and device rate.
    pub log2_interp: u32,
    /// TX VGA1 gain in dB (pre-LPF, -35 to -4).
    pub vga1: i32,
    /// TX VGA2 gain in dB (post-LPF, 0 to 25).
    pub vga2: i32,
    /// Analog filter bandwidth in hertz.
    pub bandwidth: u32,
    /// Whether the XB-200 expansion board is attached.
    pub xb200: bool,
    /// XB-200 signal path.
    pub xb200_path: Xb200Path,
    /// XB-200 filter bank.
    pub xb200_filter: Xb200Filter,
    /// Whether local changes are mirrored to the remote control plane.
    pub use_remote_sync: bool,
    /// Remote control plane host.
    pub remote_address: String,
    /// Remote control plane port.
    pub remote_port: u16,
    /// Index of this device set on the remote control plane.
    pub remote_device_index: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            center_frequency: 435_000_000,
            dev_sample_rate: 3_072_000,
            log2_interp: 0,
            vga1: -20,
            vga2: 9,
            bandwidth: 1_500_000,
            xb200: false,
            xb200_path: Xb200Path::Mix,
            xb200_filter: Xb200Filter::Auto1dB,
            use_remote_sync: false,
            remote_address: "127.0.0.1".to_string(),
            remote_port: 8888,
            remote_device_index: 0,
        }
    }
}

impl OutputSettings {
    /// Restore every parameter to its default value.
    pub fn reset_to_defaults(&mut self) {
        *self = OutputSettings::default();
    }

    /// Baseband sample rate after interpolation: `dev_sample_rate >> log2_interp`.
    pub fn baseband_sample_rate(&self) -> u32 {
        self.dev_sample_rate >> self.log2_interp
    }

    /// Encode the snapshot for persistence.
    pub fn serialize(&self) -> Vec<u8> {
        // A plain value struct cannot fail to encode.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] on malformed bytes. The caller is
    /// expected to reset to defaults and force a reconfiguration so hardware
    /// state stays consistent with the confirmed snapshot.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

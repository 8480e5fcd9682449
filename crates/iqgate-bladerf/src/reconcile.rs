//! Settings diff engine.
//!
//! Compares the confirmed snapshot against a requested one and decides
//! which hardware parameters must change, whether the stream worker must
//! be paused, whether the FIFO must be resized, and which key names go
//! into the outbound notification payload. The plan is pure data; the
//! device applies it in a fixed hardware order (see
//! [`BladeRfOutput::apply_settings`](crate::BladeRfOutput::apply_settings)).

use iqgate_core::settings::OutputSettings;

/// Outcome of diffing two settings snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Names of parameters that differ (or all parameter names when
    /// forced), in the fixed reporting order used by the remote patch.
    pub changed_keys: Vec<&'static str>,
    /// The FIFO capacity must be recomputed before hardware is touched.
    pub resize_fifo: bool,
    /// A running worker must be stopped before applying and restarted
    /// afterwards: the stream must never observe a half-applied rate or
    /// interpolation change.
    pub suspend_worker: bool,
    /// Downstream DSP stages must be told the new effective rate/frequency.
    pub forward_change: bool,
    /// The remote patch must carry every parameter, not just the changed
    /// ones: remote sync was just enabled or its routing changed.
    pub remote_full_update: bool,
}

impl ReconcilePlan {
    /// Diff `current` against `requested`.
    ///
    /// With `force` set, every parameter is reported changed regardless of
    /// value, producing a full reconfiguration pass.
    pub fn compute(current: &OutputSettings, requested: &OutputSettings, force: bool) -> Self {
        let freq = current.center_frequency != requested.center_frequency;
        let rate = current.dev_sample_rate != requested.dev_sample_rate;
        let interp = current.log2_interp != requested.log2_interp;
        let vga1 = current.vga1 != requested.vga1;
        let vga2 = current.vga2 != requested.vga2;
        let xb200 = current.xb200 != requested.xb200;
        let xb200_path = current.xb200_path != requested.xb200_path;
        let xb200_filter = current.xb200_filter != requested.xb200_filter;
        let bandwidth = current.bandwidth != requested.bandwidth;

        let mut changed_keys = Vec::new();
        if freq || force {
            changed_keys.push("centerFrequency");
        }
        if rate || force {
            changed_keys.push("devSampleRate");
        }
        if interp || force {
            changed_keys.push("log2Interp");
        }
        if vga1 || force {
            changed_keys.push("vga1");
        }
        if vga2 || force {
            changed_keys.push("vga2");
        }
        if xb200 || force {
            changed_keys.push("xb200");
        }
        if xb200_path || force {
            changed_keys.push("xb200Path");
        }
        if xb200_filter || force {
            changed_keys.push("xb200Filter");
        }
        if bandwidth || force {
            changed_keys.push("bandwidth");
        }

        ReconcilePlan {
            changed_keys,
            resize_fifo: rate || interp || force,
            suspend_worker: rate || interp || force,
            forward_change: rate || interp || freq || force,
            remote_full_update: (!current.use_remote_sync && requested.use_remote_sync)
                || current.remote_address != requested.remote_address
                || current.remote_port != requested.remote_port
                || current.remote_device_index != requested.remote_device_index,
        }
    }

    /// Whether the named parameter is in the changed set.
    pub fn contains(&self, key: &str) -> bool {
        self.changed_keys.iter().any(|k| *k == key)
    }
}

//! Best-effort outbound sync to a remote control plane.
//!
//! Mirrors local settings changes and run-state transitions to an external
//! HTTP collaborator: a PATCH carrying only the changed parameter names
//! (plus required routing fields), and POST/DELETE for start/stop. All
//! requests are fire-and-forget -- transport errors are logged at warn
//! level, never retried, never surfaced to the caller.
//!
//! Delivery goes through the [`SyncTransport`] seam: production uses the
//! HTTP transport on the tokio runtime, tests substitute a recording one
//! to assert what the engine would have sent.

use std::sync::Arc;

use iqgate_core::settings::OutputSettings;
use serde_json::{Value, json};

/// Hardware type tag carried in every outbound payload.
const DEVICE_HW_TYPE: &str = "BladeRF1";

/// One outbound request toward the remote control plane.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRequest {
    /// PATCH of a (possibly partial) settings payload.
    Settings {
        /// Fully-formed target URL.
        url: String,
        /// Device-set envelope with the changed parameters.
        body: Value,
    },
    /// POST (start) or DELETE (stop) of the remote run state.
    Run {
        /// Fully-formed target URL.
        url: String,
        /// `true` for start (POST), `false` for stop (DELETE).
        start: bool,
    },
}

/// Delivery seam for outbound sync requests.
pub trait SyncTransport: Send + Sync {
    /// Deliver one request. Must not block the caller.
    fn dispatch(&self, request: SyncRequest);
}

/// HTTP delivery, spawned fire-and-forget on the tokio runtime.
struct HttpTransport {
    client: reqwest::Client,
}

impl SyncTransport for HttpTransport {
    fn dispatch(&self, request: SyncRequest) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let (url, result) = match request {
                SyncRequest::Settings { url, body } => {
                    let result = client.patch(url.as_str()).json(&body).send().await;
                    (url, result)
                }
                SyncRequest::Run { url, start } => {
                    let builder = if start {
                        client.post(url.as_str())
                    } else {
                        client.delete(url.as_str())
                    };
                    let result = builder.send().await;
                    (url, result)
                }
            };
            match result {
                Ok(resp) => tracing::debug!(status = %resp.status(), url = %url, "remote sync"),
                Err(e) => tracing::warn!(error = %e, url = %url, "remote sync failed"),
            }
        });
    }
}

/// Fire-and-forget notifier toward the remote control plane.
#[derive(Clone)]
pub struct RemoteSyncSink {
    transport: Arc<dyn SyncTransport>,
}

impl RemoteSyncSink {
    /// Create a sink delivering over HTTP with a fresh client.
    pub fn new() -> Self {
        RemoteSyncSink {
            transport: Arc::new(HttpTransport {
                client: reqwest::Client::new(),
            }),
        }
    }

    /// Create a sink delivering through the given transport.
    pub fn with_transport(transport: Arc<dyn SyncTransport>) -> Self {
        RemoteSyncSink { transport }
    }

    /// PATCH the changed settings to the remote device set.
    ///
    /// With `full` set (remote sync just enabled, routing changed, or a
    /// forced reconfiguration), every parameter is included instead of
    /// only the changed ones.
    pub fn send_settings(&self, settings: &OutputSettings, changed_keys: &[&'static str], full: bool) {
        let body = settings_patch(settings, changed_keys, full);
        let url = format!(
            "http://{}:{}/deviceset/{}/device/settings",
            settings.remote_address, settings.remote_port, settings.remote_device_index
        );
        self.transport.dispatch(SyncRequest::Settings { url, body });
    }

    /// POST (start) or DELETE (stop) the remote device set's run state.
    pub fn send_run(&self, settings: &OutputSettings, start: bool) {
        let url = format!(
            "http://{}:{}/deviceset/{}/device/run",
            settings.remote_address, settings.remote_port, settings.remote_device_index
        );
        self.transport.dispatch(SyncRequest::Run { url, start });
    }
}

impl Default for RemoteSyncSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the PATCH body: only the listed keys (all keys when `full`),
/// wrapped in the device-set envelope. Remote routing fields are never
/// included so a remote peer cannot redirect our own sync target.
fn settings_patch(settings: &OutputSettings, changed_keys: &[&'static str], full: bool) -> Value {
    let has = |key: &str| full || changed_keys.contains(&key);
    let mut fields = serde_json::Map::new();

    if has("centerFrequency") {
        fields.insert("centerFrequency".into(), json!(settings.center_frequency));
    }
    if has("devSampleRate") {
        fields.insert("devSampleRate".into(), json!(settings.dev_sample_rate));
    }
    if has("log2Interp") {
        fields.insert("log2Interp".into(), json!(settings.log2_interp));
    }
    if has("vga1") {
        fields.insert("vga1".into(), json!(settings.vga1));
    }
    if has("vga2") {
        fields.insert("vga2".into(), json!(settings.vga2));
    }
    if has("xb200") {
        fields.insert("xb200".into(), json!(settings.xb200));
    }
    if has("xb200Path") {
        fields.insert("xb200Path".into(), json!(settings.xb200_path));
    }
    if has("xb200Filter") {
        fields.insert("xb200Filter".into(), json!(settings.xb200_filter));
    }
    if has("bandwidth") {
        fields.insert("bandwidth".into(), json!(settings.bandwidth));
    }

    json!({
        "direction": "tx",
        "deviceHwType": DEVICE_HW_TYPE,
        "outputSettings": Value::Object(fields),
    })
}

/// Transport that records requests instead of delivering them.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingTransport {
    requests: std::sync::Mutex<Vec<SyncRequest>>,
}

#[cfg(test)]
impl RecordingTransport {
    /// Snapshot of the recorded requests, in dispatch order.
    pub(crate) fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl SyncTransport for RecordingTransport {
    fn dispatch(&self, request: SyncRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

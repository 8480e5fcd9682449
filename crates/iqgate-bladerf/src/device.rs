//! The BladeRF1 transmit device: hardware session ownership, settings
//! reconciliation, and stream lifecycle.
//!
//! One [`BladeRfOutput`] is the logical transmit device on a physical
//! chip. It owns (or attaches to) the hardware session, holds the single
//! confirmed settings snapshot, and is mutated only from the
//! command-processing context. The streaming worker thread shares nothing
//! with it beyond the FIFO and an atomic interpolation factor.

use std::sync::Arc;

use tokio::sync::mpsc;

use iqgate_core::command::DeviceCommand;
use iqgate_core::error::{Error, Result};
use iqgate_core::events::PipelineNotification;
use iqgate_core::fifo::{SampleFifo, fifo_capacity};
use iqgate_core::sdk::{SdrHandle, SdrSdk};
use iqgate_core::settings::OutputSettings;
use iqgate_core::types::{Direction, StreamConfig};

use crate::registry::{BuddyRegistry, EngineState, SharedParams};
use crate::remote::{RemoteSyncSink, SyncTransport};
use crate::worker::OutputWorker;

/// The logical transmit device on one physical BladeRF1.
pub struct BladeRfOutput {
    serial: String,
    sdk: Arc<dyn SdrSdk>,
    registry: Arc<BuddyRegistry>,
    settings: OutputSettings,
    handle: Option<Arc<dyn SdrHandle>>,
    shared: SharedParams,
    fifo: Arc<SampleFifo>,
    worker: Option<OutputWorker>,
    running: bool,
    // Weak so the device's own enqueues never keep the processor's drain
    // loop alive after every external sender is gone.
    command_tx: mpsc::WeakUnboundedSender<DeviceCommand>,
    gui_tx: Option<mpsc::UnboundedSender<DeviceCommand>>,
    pipeline_tx: mpsc::UnboundedSender<PipelineNotification>,
    remote: RemoteSyncSink,
}

impl BladeRfOutput {
    /// Create the device with default settings and a fresh command queue.
    ///
    /// Returns the device together with both ends of its inbound command
    /// queue: hand the receiver to a
    /// [`CommandProcessor`](crate::CommandProcessor) and the sender to GUI
    /// and remote API collaborators. The device itself holds only a weak
    /// sender, so the processor's drain loop ends once every collaborator
    /// drops theirs.
    pub fn new(
        serial: &str,
        sdk: Arc<dyn SdrSdk>,
        registry: Arc<BuddyRegistry>,
        pipeline_tx: mpsc::UnboundedSender<PipelineNotification>,
    ) -> (
        Self,
        mpsc::UnboundedSender<DeviceCommand>,
        mpsc::UnboundedReceiver<DeviceCommand>,
    ) {
        let settings = OutputSettings::default();
        let fifo = Arc::new(SampleFifo::new(fifo_capacity(
            settings.dev_sample_rate,
            settings.log2_interp,
        )));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let device = BladeRfOutput {
            serial: serial.to_string(),
            sdk,
            registry,
            settings,
            handle: None,
            shared: SharedParams::default(),
            fifo,
            worker: None,
            running: false,
            command_tx: command_tx.downgrade(),
            gui_tx: None,
            pipeline_tx,
            remote: RemoteSyncSink::new(),
        };
        (device, command_tx, command_rx)
    }

    /// Attach the GUI notification queue for command echoes.
    pub fn set_gui_queue(&mut self, gui_tx: mpsc::UnboundedSender<DeviceCommand>) {
        self.gui_tx = Some(gui_tx);
    }

    /// Replace the remote sync delivery transport.
    pub fn set_sync_transport(&mut self, transport: Arc<dyn SyncTransport>) {
        self.remote = RemoteSyncSink::with_transport(transport);
    }

    /// Static device description.
    pub fn device_description(&self) -> &'static str {
        "BladeRFOutput"
    }

    /// The confirmed settings snapshot.
    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    /// Effective (baseband) sample rate in samples per second.
    pub fn sample_rate(&self) -> u32 {
        self.settings.baseband_sample_rate()
    }

    /// Current center frequency in hertz.
    pub fn center_frequency(&self) -> u64 {
        self.settings.center_frequency
    }

    /// Whether the streaming worker is active.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The FIFO the DSP pipeline writes baseband samples into.
    pub fn sample_fifo(&self) -> Arc<SampleFifo> {
        Arc::clone(&self.fifo)
    }

    /// The streaming thread's id, if running (tests use this to detect
    /// restart cycles).
    pub fn worker_thread_id(&self) -> Option<std::thread::ThreadId> {
        self.worker.as_ref().and_then(|w| w.thread_id())
    }

    /// Acquire the hardware session: attach to the buddy's open handle if
    /// the receive direction already holds one, otherwise open the device
    /// by serial and become the owner.
    ///
    /// After acquisition the streaming transport is configured and the TX
    /// module enabled, then the shared parameters are published so a
    /// subsequently opening buddy sees up-to-date state.
    ///
    /// # Errors
    ///
    /// [`Error::NoPeerHandle`] if a buddy is registered but holds no open
    /// handle (the registry is left unchanged); [`Error::DeviceOpen`] if
    /// the SDK cannot acquire the device; [`Error::StreamEnable`] if the
    /// device rejects the transport configuration or the TX module.
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            self.close();
        }

        self.fifo.resize(fifo_capacity(
            self.settings.dev_sample_rate,
            self.settings.log2_interp,
        ));

        let (handle, owned) = match self.registry.peer(&self.serial, Direction::Tx) {
            Some(peer) => {
                let handle = peer.handle.clone().ok_or(Error::NoPeerHandle)?;
                tracing::debug!(serial = %self.serial, "attached to buddy's open handle");
                self.shared = peer;
                (handle, false)
            }
            None => {
                let handle = self.sdk.open(&self.serial)?;
                tracing::debug!(serial = %self.serial, "opened device");
                self.shared = SharedParams {
                    handle: Some(Arc::clone(&handle)),
                    xb200_attached: false,
                };
                (handle, true)
            }
        };

        let streaming = handle
            .configure_stream(Direction::Tx, &StreamConfig::default())
            .and_then(|()| handle.enable_module(Direction::Tx, true));
        if let Err(e) = streaming {
            // A session we just opened must not leak when it never became
            // usable; a buddy's session is theirs to tear down.
            if owned {
                handle.close();
            }
            self.shared = SharedParams::default();
            return Err(Error::StreamEnable(e.to_string()));
        }

        self.registry
            .publish(&self.serial, Direction::Tx, self.shared.clone());
        self.registry
            .set_state(&self.serial, Direction::Tx, EngineState::Idle);
        self.handle = Some(handle);
        Ok(())
    }

    /// Release the hardware session.
    ///
    /// Disables the TX module, clears this device's registry entry, and
    /// physically closes the handle only when the buddy is not registered
    /// (otherwise the buddy keeps streaming on the shared session).
    /// Idempotent: safe to call when never opened.
    pub fn close(&mut self) {
        if self.running {
            self.stop();
        }
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Err(e) = handle.enable_module(Direction::Tx, false) {
            tracing::warn!(error = %e, "could not disable TX module");
        }

        self.registry.clear(&self.serial, Direction::Tx);
        if self.registry.peer_registered(&self.serial, Direction::Tx) {
            tracing::debug!(serial = %self.serial, "leaving device open for buddy");
        } else {
            tracing::debug!(serial = %self.serial, "closing device, buddy direction not open");
            handle.close();
        }
        self.shared = SharedParams::default();
    }

    /// Spawn the streaming worker.
    ///
    /// Before the worker comes up, the confirmed snapshot is force-applied
    /// so hardware is guaranteed to match it at stream start, no matter
    /// what happened to the device since the last reconciliation.
    ///
    /// # Errors
    ///
    /// [`Error::NoDevice`] when no hardware handle is present; no worker
    /// is spawned in that case.
    pub fn start(&mut self) -> Result<()> {
        let handle = self.handle.clone().ok_or(Error::NoDevice)?;
        if self.running {
            self.stop();
        }

        let confirmed = self.settings.clone();
        self.apply_settings(&confirmed, true);

        self.fifo.reset();
        let worker = OutputWorker::start(handle, Arc::clone(&self.fifo), self.settings.log2_interp);
        self.worker = Some(worker);
        self.running = true;
        self.registry
            .set_state(&self.serial, Direction::Tx, EngineState::Running);
        tracing::debug!(serial = %self.serial, "output started");
        Ok(())
    }

    /// Stop the streaming worker and join its thread.
    ///
    /// No-op when the worker was never started; otherwise blocks until the
    /// current transfer completes so nothing is left half-submitted.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            tracing::debug!(serial = %self.serial, "output stopped");
        }
        self.running = false;
        if self.handle.is_some() {
            self.registry
                .set_state(&self.serial, Direction::Tx, EngineState::Idle);
        }
    }

    /// Reconcile the confirmed settings against `requested` and apply the
    /// differences to hardware.
    ///
    /// Hardware-affecting changes are applied with the worker fully
    /// stopped (one stop/restart cycle at most); individual write failures
    /// are logged and do not abort the remaining steps. The confirmed
    /// snapshot is replaced by `requested` unconditionally, and a
    /// rate/frequency notification is forwarded to the pipeline when the
    /// effective rate or tuning changed.
    pub fn apply_settings(&mut self, requested: &OutputSettings, force: bool) {
        let plan = crate::ReconcilePlan::compute(&self.settings, requested, force);
        tracing::debug!(
            changed = ?plan.changed_keys,
            force,
            has_device = self.handle.is_some(),
            "applying settings"
        );

        // Rate or interpolation changes invalidate in-flight slices: stop
        // the worker before the FIFO or hardware is touched.
        let mut worker_was_running = false;
        if plan.suspend_worker {
            if let Some(worker) = self.worker.take() {
                worker.stop();
                worker_was_running = true;
            }
        }

        if plan.resize_fifo {
            self.fifo.resize(fifo_capacity(
                requested.dev_sample_rate,
                requested.log2_interp,
            ));
        }

        if plan.contains("devSampleRate") {
            if let Some(handle) = &self.handle {
                match handle.set_sample_rate(Direction::Tx, requested.dev_sample_rate) {
                    Ok(actual) => {
                        tracing::debug!(requested = requested.dev_sample_rate, actual, "sample rate set")
                    }
                    Err(e) => tracing::warn!(error = %e, "could not set sample rate"),
                }
            }
        }

        if plan.contains("log2Interp") {
            // The worker (if it survived) picks the factor up on the next
            // slice boundary; a restarted worker gets it at spawn.
            if let Some(worker) = &self.worker {
                worker.set_log2_interpolation(requested.log2_interp);
            }
            tracing::debug!(interpolation = 1u32 << requested.log2_interp, "interpolation set");
        }

        if plan.contains("vga1") {
            if let Some(handle) = &self.handle {
                match handle.set_tx_vga1(requested.vga1) {
                    Ok(()) => tracing::debug!(gain_db = requested.vga1, "VGA1 gain set"),
                    Err(e) => tracing::warn!(error = %e, "could not set VGA1 gain"),
                }
            }
        }

        if plan.contains("vga2") {
            if let Some(handle) = &self.handle {
                match handle.set_tx_vga2(requested.vga2) {
                    Ok(()) => tracing::debug!(gain_db = requested.vga2, "VGA2 gain set"),
                    Err(e) => tracing::warn!(error = %e, "could not set VGA2 gain"),
                }
            }
        }

        if plan.contains("xb200") {
            if let Some(handle) = &self.handle {
                // Rewiring the expansion board while the buddy streams
                // would glitch its RF path; leave the wiring alone.
                let peer_running = self.registry.peer_state(&self.serial, Direction::Tx)
                    == Some(EngineState::Running);
                if peer_running {
                    tracing::debug!("skipping XB200 change, buddy direction is streaming");
                } else {
                    match handle.expansion_attach(requested.xb200) {
                        Ok(()) => tracing::debug!(attach = requested.xb200, "XB200 wiring changed"),
                        Err(e) => tracing::warn!(error = %e, "could not change XB200 wiring"),
                    }
                    self.shared.xb200_attached = requested.xb200;
                    self.registry
                        .set_xb200_attached(&self.serial, Direction::Tx, requested.xb200);
                }
            }
        }

        if plan.contains("xb200Path") {
            if let Some(handle) = &self.handle {
                match handle.set_xb200_path(Direction::Tx, requested.xb200_path) {
                    Ok(()) => tracing::debug!(path = ?requested.xb200_path, "XB200 path set"),
                    Err(e) => tracing::warn!(error = %e, "could not set XB200 path"),
                }
            }
        }

        if plan.contains("xb200Filter") {
            if let Some(handle) = &self.handle {
                match handle.set_xb200_filter(Direction::Tx, requested.xb200_filter) {
                    Ok(()) => tracing::debug!(filter = ?requested.xb200_filter, "XB200 filter set"),
                    Err(e) => tracing::warn!(error = %e, "could not set XB200 filter"),
                }
            }
        }

        if plan.contains("bandwidth") {
            if let Some(handle) = &self.handle {
                match handle.set_bandwidth(Direction::Tx, requested.bandwidth) {
                    Ok(actual) => {
                        tracing::debug!(requested = requested.bandwidth, actual, "bandwidth set")
                    }
                    Err(e) => tracing::warn!(error = %e, "could not set bandwidth"),
                }
            }
        }

        if plan.contains("centerFrequency") {
            if let Some(handle) = &self.handle {
                match handle.set_frequency(Direction::Tx, requested.center_frequency) {
                    Ok(()) => {
                        tracing::debug!(freq_hz = requested.center_frequency, "frequency set")
                    }
                    Err(e) => tracing::warn!(error = %e, "could not set frequency"),
                }
            }
        }

        if worker_was_running {
            if let Some(handle) = self.handle.clone() {
                self.fifo.reset();
                self.worker = Some(OutputWorker::start(
                    handle,
                    Arc::clone(&self.fifo),
                    requested.log2_interp,
                ));
            }
        }

        if requested.use_remote_sync {
            self.remote.send_settings(
                requested,
                &plan.changed_keys,
                plan.remote_full_update || force,
            );
        }

        // Last write wins: the confirmed snapshot takes the requested
        // values even when individual hardware writes were rejected.
        self.settings = requested.clone();

        if plan.forward_change {
            let notification = PipelineNotification {
                sample_rate: self.settings.baseband_sample_rate(),
                center_frequency: self.settings.center_frequency,
            };
            let _ = self.pipeline_tx.send(notification);
        }

        tracing::debug!(
            center_frequency = self.settings.center_frequency,
            dev_sample_rate = self.settings.dev_sample_rate,
            baseband_rate = self.settings.baseband_sample_rate(),
            bandwidth = self.settings.bandwidth,
            "settings applied"
        );
    }

    /// Consume one inbound command. Returns `true` when the message was
    /// consumed (all current variants are; the contract leaves room for a
    /// shared bus where other handlers see unconsumed messages).
    pub fn handle_command(&mut self, command: DeviceCommand) -> bool {
        match command {
            DeviceCommand::Configure { settings, force } => {
                tracing::debug!(force, "Configure command");
                self.apply_settings(&settings, force);
                true
            }
            DeviceCommand::StartStop { start } => {
                tracing::debug!(start, "StartStop command");
                if start {
                    if let Err(e) = self.start() {
                        tracing::warn!(error = %e, "device start failed");
                    }
                } else {
                    self.stop();
                }
                if self.settings.use_remote_sync {
                    self.remote.send_run(&self.settings, start);
                }
                true
            }
        }
    }

    /// Retune by pushing a Configure command carrying only a frequency
    /// change, mirrored to the GUI queue.
    pub fn set_center_frequency(&self, freq_hz: u64) {
        let mut requested = self.settings.clone();
        requested.center_frequency = freq_hz;
        let command = DeviceCommand::Configure {
            settings: requested,
            force: false,
        };
        if let Some(tx) = self.command_tx.upgrade() {
            let _ = tx.send(command.clone());
        }
        if let Some(gui) = &self.gui_tx {
            let _ = gui.send(command);
        }
    }

    /// Encode the confirmed settings for persistence.
    pub fn serialize(&self) -> Vec<u8> {
        self.settings.serialize()
    }

    /// Restore settings from persisted bytes.
    ///
    /// On malformed bytes the settings are reset to defaults and `false`
    /// is returned. Either way a forced Configure is enqueued (and echoed
    /// to the GUI) so hardware state converges on the confirmed snapshot.
    pub fn deserialize(&mut self, data: &[u8]) -> bool {
        let success = match OutputSettings::deserialize(data) {
            Ok(settings) => {
                self.settings = settings;
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "settings restore failed, resetting to defaults");
                self.settings.reset_to_defaults();
                false
            }
        };

        let command = DeviceCommand::Configure {
            settings: self.settings.clone(),
            force: true,
        };
        if let Some(tx) = self.command_tx.upgrade() {
            let _ = tx.send(command.clone());
        }
        if let Some(gui) = &self.gui_tx {
            let _ = gui.send(command);
        }
        success
    }
}

impl Drop for BladeRfOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RecordingTransport, SyncRequest};
    use iqgate_test_harness::{MockSdk, MockSdrHandle};

    struct TestQueues {
        // Held so the device's weak sender can upgrade while a test runs.
        #[allow(dead_code)]
        command_tx: mpsc::UnboundedSender<DeviceCommand>,
        command_rx: mpsc::UnboundedReceiver<DeviceCommand>,
        pipeline_rx: mpsc::UnboundedReceiver<PipelineNotification>,
    }

    fn make_device(sdk: Arc<MockSdk>, registry: Arc<BuddyRegistry>) -> (BladeRfOutput, TestQueues) {
        let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
        let (device, command_tx, command_rx) =
            BladeRfOutput::new("test-serial", sdk, registry, pipeline_tx);
        (
            device,
            TestQueues {
                command_tx,
                command_rx,
                pipeline_rx,
            },
        )
    }

    fn opened_device(sdk: &Arc<MockSdk>) -> (BladeRfOutput, Arc<MockSdrHandle>, TestQueues) {
        let registry = BuddyRegistry::new();
        let (mut device, queues) = make_device(Arc::clone(sdk), registry);
        device.open().unwrap();
        let handle = sdk.handle();
        handle.clear_calls();
        (device, handle, queues)
    }

    // -- open / close --------------------------------------------------------

    #[test]
    fn open_as_owner_configures_and_enables_tx() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));

        device.open().unwrap();

        assert_eq!(sdk.opened_serials(), vec!["test-serial"]);
        assert_eq!(
            sdk.handle().calls(),
            vec!["configure_stream(tx, 64x8192)", "enable_module(tx, true)"]
        );
        // Shared params are published for a later buddy.
        assert!(registry.peer("test-serial", Direction::Rx).is_some());
    }

    #[test]
    fn open_failure_surfaces_device_open_error() {
        let sdk = MockSdk::new();
        sdk.fail_open(true);
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());
        assert!(matches!(device.open(), Err(Error::DeviceOpen(_))));
    }

    #[test]
    fn stream_enable_failure_surfaces_stream_enable_error() {
        let sdk = MockSdk::new();
        sdk.handle().fail_call("enable_module");
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());
        assert!(matches!(device.open(), Err(Error::StreamEnable(_))));
    }

    #[test]
    fn stream_enable_failure_tears_down_the_owned_session() {
        let sdk = MockSdk::new();
        sdk.handle().fail_call("enable_module");
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());

        assert!(matches!(device.open(), Err(Error::StreamEnable(_))));

        // The session we opened and never got streaming must not leak.
        assert!(sdk.handle().is_closed());
        assert!(device.shared.handle.is_none());
        // Nothing was published, and a later close has nothing to do.
        assert!(device.registry.is_empty());
        device.close();
    }

    #[test]
    fn stream_enable_failure_never_closes_the_buddy_session() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        registry.publish(
            "test-serial",
            Direction::Rx,
            SharedParams {
                handle: Some(sdk.handle()),
                xb200_attached: false,
            },
        );
        sdk.handle().fail_call("configure_stream");

        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));
        assert!(matches!(device.open(), Err(Error::StreamEnable(_))));

        // The buddy owns that session; it stays open.
        assert!(!sdk.handle().is_closed());
        assert!(device.shared.handle.is_none());
    }

    #[test]
    fn attach_to_buddy_copies_shared_params() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        // The receive side already opened the chip and attached the XB200.
        let buddy_handle = sdk.handle();
        registry.publish(
            "test-serial",
            Direction::Rx,
            SharedParams {
                handle: Some(buddy_handle),
                xb200_attached: true,
            },
        );

        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));
        device.open().unwrap();

        // Attached, not opened: the SDK never saw a second open.
        assert!(sdk.opened_serials().is_empty());
        assert!(device.shared.xb200_attached);
    }

    #[test]
    fn attach_with_null_buddy_handle_fails_and_leaves_registry_unchanged() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        registry.publish("test-serial", Direction::Rx, SharedParams::default());

        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));
        let err = device.open().unwrap_err();

        assert!(matches!(err, Error::NoPeerHandle));
        assert_eq!(registry.len(), 1);
        assert!(!registry.peer_registered("test-serial", Direction::Rx));
    }

    #[test]
    fn close_with_no_buddy_physically_closes() {
        let sdk = MockSdk::new();
        let (mut device, handle, _queues) = opened_device(&sdk);
        device.close();
        assert!(handle.is_closed());
        assert_eq!(
            handle.calls(),
            vec!["enable_module(tx, false)", "close()"]
        );
    }

    #[test]
    fn close_with_buddy_registered_skips_physical_close() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));
        device.open().unwrap();
        // The buddy attaches after we opened.
        registry.publish(
            "test-serial",
            Direction::Rx,
            SharedParams {
                handle: Some(sdk.handle()),
                xb200_attached: false,
            },
        );

        device.close();

        assert!(!sdk.handle().is_closed());
        // Our entry is gone, the buddy's remains.
        assert!(!registry.peer_registered("test-serial", Direction::Rx));
        assert!(registry.peer_registered("test-serial", Direction::Tx));
    }

    #[test]
    fn close_when_never_opened_is_a_no_op() {
        let sdk = MockSdk::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());
        device.close();
        assert!(sdk.handle().calls().is_empty());
    }

    // -- start / stop --------------------------------------------------------

    #[test]
    fn start_without_handle_fails_and_spawns_nothing() {
        let sdk = MockSdk::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());
        assert!(matches!(device.start(), Err(Error::NoDevice)));
        assert!(!device.is_running());
        assert!(device.worker_thread_id().is_none());
    }

    #[test]
    fn stop_of_never_started_device_returns_immediately() {
        let sdk = MockSdk::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());
        device.stop();
        assert!(!device.is_running());
    }

    #[test]
    fn start_marks_engine_running_in_registry() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));
        device.open().unwrap();
        device.start().unwrap();
        assert!(device.is_running());
        assert_eq!(
            registry.peer_state("test-serial", Direction::Rx),
            Some(EngineState::Running)
        );
        device.stop();
        assert_eq!(
            registry.peer_state("test-serial", Direction::Rx),
            Some(EngineState::Idle)
        );
    }

    // -- reconciliation ------------------------------------------------------

    #[test]
    fn apply_writes_only_changed_parameters() {
        let sdk = MockSdk::new();
        let (mut device, handle, _queues) = opened_device(&sdk);

        let mut requested = device.settings().clone();
        requested.vga2 = 15;
        device.apply_settings(&requested, false);

        assert_eq!(handle.calls(), vec!["set_tx_vga2(15)"]);
        assert_eq!(device.settings().vga2, 15);
    }

    #[test]
    fn apply_is_symmetric_across_the_same_diff() {
        let sdk = MockSdk::new();
        let (mut device, handle, _queues) = opened_device(&sdk);

        let s1 = device.settings().clone();
        let mut s2 = s1.clone();
        s2.vga1 = -8;
        s2.bandwidth = 2_250_000;

        device.apply_settings(&s2, false);
        let forward_calls = handle.calls();
        handle.clear_calls();
        device.apply_settings(&s1, false);
        let backward_calls = handle.calls();

        assert_eq!(forward_calls, vec!["set_tx_vga1(-8)", "set_bandwidth(tx, 2250000)"]);
        assert_eq!(
            backward_calls,
            vec!["set_tx_vga1(-20)", "set_bandwidth(tx, 1500000)"]
        );
    }

    #[test]
    fn forced_apply_writes_every_parameter_in_fixed_order() {
        let sdk = MockSdk::new();
        let (mut device, handle, _queues) = opened_device(&sdk);

        let requested = device.settings().clone();
        device.apply_settings(&requested, true);

        assert_eq!(
            handle.calls(),
            vec![
                "set_sample_rate(tx, 3072000)",
                "set_tx_vga1(-20)",
                "set_tx_vga2(9)",
                "expansion_attach(false)",
                "set_xb200_path(tx, Mix)",
                "set_xb200_filter(tx, Auto1dB)",
                "set_bandwidth(tx, 1500000)",
                "set_frequency(tx, 435000000)",
            ]
        );
    }

    #[test]
    fn start_reapplies_confirmed_snapshot_before_streaming() {
        let sdk = MockSdk::new();
        let (mut device, handle, mut queues) = opened_device(&sdk);

        device.start().unwrap();

        // The full snapshot hits hardware, in the fixed write order, before
        // any sample is streamed.
        assert_eq!(
            handle.calls(),
            vec![
                "set_sample_rate(tx, 3072000)",
                "set_tx_vga1(-20)",
                "set_tx_vga2(9)",
                "expansion_attach(false)",
                "set_xb200_path(tx, Mix)",
                "set_xb200_filter(tx, Auto1dB)",
                "set_bandwidth(tx, 1500000)",
                "set_frequency(tx, 435000000)",
            ]
        );
        let notification = queues.pipeline_rx.try_recv().unwrap();
        assert_eq!(notification.sample_rate, 3_072_000);
        device.stop();
    }

    #[test]
    fn rate_change_while_running_restarts_worker_once_and_forwards() {
        let sdk = MockSdk::new();
        let (mut device, _handle, mut queues) = opened_device(&sdk);
        device.start().unwrap();
        // Drain the notification from the forced apply at start.
        queues.pipeline_rx.try_recv().unwrap();
        let id_before = device.worker_thread_id().unwrap();

        let mut requested = device.settings().clone();
        requested.dev_sample_rate = 2_000_000;
        requested.log2_interp = 2;
        device.apply_settings(&requested, false);

        assert!(device.is_running());
        let id_after = device.worker_thread_id().unwrap();
        assert_ne!(id_before, id_after, "worker must restart on a rate change");

        let notification = queues.pipeline_rx.try_recv().unwrap();
        assert_eq!(notification.sample_rate, 500_000);
        assert_eq!(notification.center_frequency, 435_000_000);
        // Exactly one stop/restart cycle produces exactly one notification.
        assert!(queues.pipeline_rx.try_recv().is_err());

        assert_eq!(device.sample_rate(), 500_000);
        device.stop();
    }

    #[test]
    fn gain_only_change_while_running_keeps_worker_alive() {
        let sdk = MockSdk::new();
        let (mut device, _handle, mut queues) = opened_device(&sdk);
        device.start().unwrap();
        // Drain the notification from the forced apply at start.
        queues.pipeline_rx.try_recv().unwrap();
        let id_before = device.worker_thread_id().unwrap();

        let mut requested = device.settings().clone();
        requested.vga1 = -12;
        device.apply_settings(&requested, false);

        assert_eq!(device.worker_thread_id().unwrap(), id_before);
        assert!(queues.pipeline_rx.try_recv().is_err());
        device.stop();
    }

    #[test]
    fn fifo_capacity_tracks_rate_changes() {
        let sdk = MockSdk::new();
        let (mut device, _handle, _queues) = opened_device(&sdk);

        let mut requested = device.settings().clone();
        requested.dev_sample_rate = 40_000_000;
        device.apply_settings(&requested, false);

        assert_eq!(
            device.sample_fifo().capacity(),
            fifo_capacity(40_000_000, 0)
        );
    }

    #[test]
    fn hardware_write_failure_is_advisory_and_snapshot_still_commits() {
        let sdk = MockSdk::new();
        let (mut device, handle, _queues) = opened_device(&sdk);
        handle.fail_call("set_tx_vga1");

        let mut requested = device.settings().clone();
        requested.vga1 = -6;
        requested.bandwidth = 2_000_000;
        device.apply_settings(&requested, false);

        // The failed write did not abort the bandwidth step, and the
        // confirmed snapshot committed both values.
        assert_eq!(
            handle.calls(),
            vec!["set_tx_vga1(-6)", "set_bandwidth(tx, 2000000)"]
        );
        assert_eq!(device.settings().vga1, -6);
        assert_eq!(device.settings().bandwidth, 2_000_000);
    }

    #[test]
    fn xb200_change_is_skipped_while_buddy_is_streaming() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), Arc::clone(&registry));
        device.open().unwrap();
        registry.publish(
            "test-serial",
            Direction::Rx,
            SharedParams {
                handle: Some(sdk.handle()),
                xb200_attached: false,
            },
        );
        registry.set_state("test-serial", Direction::Rx, EngineState::Running);
        let handle = sdk.handle();
        handle.clear_calls();

        let mut requested = device.settings().clone();
        requested.xb200 = true;
        device.apply_settings(&requested, false);

        assert!(handle.calls().is_empty(), "wiring must not change");
        // The snapshot still commits; the wiring catches up later.
        assert!(device.settings().xb200);
        assert!(!device.shared.xb200_attached);
    }

    #[test]
    fn apply_without_handle_still_commits_and_forwards() {
        let sdk = MockSdk::new();
        let (mut device, mut queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());

        let mut requested = device.settings().clone();
        requested.center_frequency = 868_000_000;
        device.apply_settings(&requested, false);

        assert_eq!(device.center_frequency(), 868_000_000);
        assert_eq!(
            queues.pipeline_rx.try_recv().unwrap().center_frequency,
            868_000_000
        );
        assert!(sdk.handle().calls().is_empty());
    }

    // -- command handling ----------------------------------------------------

    #[test]
    fn configure_command_is_consumed() {
        let sdk = MockSdk::new();
        let (mut device, _handle, _queues) = opened_device(&sdk);
        let mut settings = device.settings().clone();
        settings.vga2 = 20;
        let consumed = device.handle_command(DeviceCommand::Configure {
            settings,
            force: false,
        });
        assert!(consumed);
        assert_eq!(device.settings().vga2, 20);
    }

    #[test]
    fn start_stop_commands_drive_the_worker() {
        let sdk = MockSdk::new();
        let (mut device, _handle, _queues) = opened_device(&sdk);
        assert!(device.handle_command(DeviceCommand::StartStop { start: true }));
        assert!(device.is_running());
        assert!(device.handle_command(DeviceCommand::StartStop { start: false }));
        assert!(!device.is_running());
    }

    #[test]
    fn start_command_without_handle_fails_silently() {
        let sdk = MockSdk::new();
        let (mut device, _queues) = make_device(Arc::clone(&sdk), BuddyRegistry::new());
        assert!(device.handle_command(DeviceCommand::StartStop { start: true }));
        assert!(!device.is_running());
    }

    // -- remote sync ---------------------------------------------------------

    #[test]
    fn enabling_remote_sync_sends_full_patch_then_partial_diffs() {
        let sdk = MockSdk::new();
        let (mut device, _handle, _queues) = opened_device(&sdk);
        let transport = Arc::new(RecordingTransport::default());
        device.set_sync_transport(Arc::clone(&transport) as Arc<dyn SyncTransport>);

        let mut requested = device.settings().clone();
        requested.use_remote_sync = true;
        device.apply_settings(&requested, false);

        let mut follow_up = device.settings().clone();
        follow_up.vga2 = 14;
        device.apply_settings(&follow_up, false);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        // Newly enabled sync pushes the whole snapshot.
        match &requests[0] {
            SyncRequest::Settings { body, .. } => {
                assert_eq!(body["outputSettings"].as_object().unwrap().len(), 9);
            }
            other => panic!("unexpected request: {other:?}"),
        }
        // Later changes carry only the diff.
        match &requests[1] {
            SyncRequest::Settings { body, .. } => {
                let fields = body["outputSettings"].as_object().unwrap();
                assert_eq!(fields.len(), 1);
                assert_eq!(fields["vga2"], serde_json::json!(14));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn remote_sync_disabled_sends_nothing() {
        let sdk = MockSdk::new();
        let (mut device, _handle, _queues) = opened_device(&sdk);
        let transport = Arc::new(RecordingTransport::default());
        device.set_sync_transport(Arc::clone(&transport) as Arc<dyn SyncTransport>);

        let mut requested = device.settings().clone();
        requested.vga1 = -10;
        device.apply_settings(&requested, false);
        device.handle_command(DeviceCommand::StartStop { start: true });
        device.handle_command(DeviceCommand::StartStop { start: false });

        assert!(transport.requests().is_empty());
    }

    #[test]
    fn start_stop_commands_mirror_run_state_when_synced() {
        let sdk = MockSdk::new();
        let (mut device, _handle, _queues) = opened_device(&sdk);
        let transport = Arc::new(RecordingTransport::default());
        device.set_sync_transport(Arc::clone(&transport) as Arc<dyn SyncTransport>);

        let mut requested = device.settings().clone();
        requested.use_remote_sync = true;
        device.apply_settings(&requested, false);

        device.handle_command(DeviceCommand::StartStop { start: true });
        device.handle_command(DeviceCommand::StartStop { start: false });

        let runs: Vec<bool> = transport
            .requests()
            .into_iter()
            .filter_map(|request| match request {
                SyncRequest::Run { start, .. } => Some(start),
                _ => None,
            })
            .collect();
        assert_eq!(runs, vec![true, false]);
    }

    // -- persistence ---------------------------------------------------------

    #[test]
    fn serialize_round_trips_through_deserialize() {
        let sdk = MockSdk::new();
        let (mut device, _handle, mut queues) = opened_device(&sdk);
        let mut requested = device.settings().clone();
        requested.center_frequency = 145_000_000;
        device.apply_settings(&requested, false);

        let bytes = device.serialize();
        assert!(device.deserialize(&bytes));
        assert_eq!(device.center_frequency(), 145_000_000);

        // A forced Configure was enqueued to reconcile hardware.
        match queues.command_rx.try_recv().unwrap() {
            DeviceCommand::Configure { settings, force } => {
                assert!(force);
                assert_eq!(settings.center_frequency, 145_000_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn corrupt_bytes_reset_to_defaults_and_force_configure() {
        let sdk = MockSdk::new();
        let (mut device, _handle, mut queues) = opened_device(&sdk);
        let (gui_tx, mut gui_rx) = mpsc::unbounded_channel();
        device.set_gui_queue(gui_tx);

        let mut requested = device.settings().clone();
        requested.vga2 = 22;
        device.apply_settings(&requested, false);

        assert!(!device.deserialize(b"\x00garbage"));
        assert_eq!(device.settings(), &OutputSettings::default());

        match queues.command_rx.try_recv().unwrap() {
            DeviceCommand::Configure { settings, force } => {
                assert!(force);
                assert_eq!(settings, OutputSettings::default());
            }
            other => panic!("unexpected command: {other:?}"),
        }
        // Mirrored to the GUI queue.
        assert!(matches!(
            gui_rx.try_recv().unwrap(),
            DeviceCommand::Configure { force: true, .. }
        ));
    }

    #[test]
    fn set_center_frequency_enqueues_configure_without_mutating() {
        let sdk = MockSdk::new();
        let (device, _handle, mut queues) = opened_device(&sdk);

        device.set_center_frequency(433_920_000);

        // The confirmed snapshot is untouched until the command is processed.
        assert_eq!(device.center_frequency(), 435_000_000);
        match queues.command_rx.try_recv().unwrap() {
            DeviceCommand::Configure { settings, force } => {
                assert!(!force);
                assert_eq!(settings.center_frequency, 433_920_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    // -- owner / buddy scenario ---------------------------------------------

    #[test]
    fn owner_and_buddy_share_one_session_end_to_end() {
        let sdk = MockSdk::new();
        let registry = BuddyRegistry::new();

        // Device A: the receive side opens the chip first. We model it
        // with a registry entry the way the Rx engine would publish it.
        let a_handle = sdk.open("shared-serial").unwrap();
        registry.publish(
            "shared-serial",
            Direction::Rx,
            SharedParams {
                handle: Some(a_handle),
                xb200_attached: false,
            },
        );

        // Device B: the transmit side attaches to A's open handle.
        let (pipeline_tx, _pipeline_rx) = mpsc::unbounded_channel();
        let (mut b, _b_commands, _b_rx) = BladeRfOutput::new(
            "shared-serial",
            Arc::clone(&sdk) as Arc<dyn SdrSdk>,
            Arc::clone(&registry),
            pipeline_tx,
        );
        b.open().unwrap();
        assert_eq!(sdk.opened_serials(), vec!["shared-serial"]);

        // A closes: B is registered, so the physical close is skipped.
        registry.clear("shared-serial", Direction::Rx);
        assert!(!sdk.handle().is_closed());

        // B closes last: no buddy remains, the session is torn down.
        b.close();
        assert!(sdk.handle().is_closed());
    }
}

//! Mock SDK session for testing the device engine without hardware.
//!
//! [`MockSdrHandle`] implements [`SdrHandle`] by appending a formatted
//! entry to an ordered call log instead of touching USB. Tests assert
//! against the log to verify hardware write ordering and change detection.
//!
//! # Example
//!
//! ```
//! use iqgate_test_harness::MockSdk;
//! use iqgate_core::{SdrHandle, SdrSdk};
//!
//! let sdk = MockSdk::new();
//! let handle = sdk.open("mock-serial").unwrap();
//! handle.set_tx_vga2(9).unwrap();
//! assert_eq!(sdk.handle().calls(), vec!["set_tx_vga2(9)"]);
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use iqgate_core::error::{Error, Result};
use iqgate_core::sdk::{SdrHandle, SdrSdk};
use iqgate_core::settings::{Xb200Filter, Xb200Path};
use iqgate_core::types::{Direction, IqSample, StreamConfig};

/// A mock [`SdrHandle`] that records calls instead of performing them.
///
/// Calls are logged in invocation order as formatted strings. Individual
/// calls can be made to fail by name via [`fail_call`](Self::fail_call),
/// which exercises the engine's best-effort error paths.
#[derive(Default)]
pub struct MockSdrHandle {
    /// Ordered log of every SDK call made through this handle.
    calls: Mutex<Vec<String>>,
    /// Sample blocks submitted to the transmit stream.
    tx_blocks: Mutex<Vec<Vec<IqSample>>>,
    /// Names of calls that should fail.
    failing: Mutex<HashSet<&'static str>>,
    /// Whether `close()` has been invoked.
    closed: AtomicBool,
}

impl MockSdrHandle {
    /// Create a new mock handle with an empty call log.
    pub fn new() -> Arc<Self> {
        Arc::new(MockSdrHandle::default())
    }

    /// Make the named call fail until [`clear_failure`](Self::clear_failure).
    pub fn fail_call(&self, name: &'static str) {
        self.failing.lock().unwrap().insert(name);
    }

    /// Stop the named call from failing.
    pub fn clear_failure(&self, name: &'static str) {
        self.failing.lock().unwrap().remove(name);
    }

    /// Snapshot of the ordered call log.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Discard the call log, keeping failure injection in place.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Blocks submitted through [`SdrHandle::submit_tx`].
    pub fn tx_blocks(&self) -> Vec<Vec<IqSample>> {
        self.tx_blocks.lock().unwrap().clone()
    }

    /// Number of blocks submitted so far.
    pub fn tx_block_count(&self) -> usize {
        self.tx_blocks.lock().unwrap().len()
    }

    /// Whether the session has been physically closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    fn check(&self, name: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(name) {
            Err(Error::HardwareWrite {
                param: name,
                reason: "injected failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl SdrHandle for MockSdrHandle {
    fn configure_stream(&self, dir: Direction, config: &StreamConfig) -> Result<()> {
        self.record(format!(
            "configure_stream({dir}, {}x{})",
            config.num_buffers, config.buffer_size
        ));
        self.check("configure_stream")
    }

    fn enable_module(&self, dir: Direction, on: bool) -> Result<()> {
        self.record(format!("enable_module({dir}, {on})"));
        self.check("enable_module")
    }

    fn set_sample_rate(&self, dir: Direction, rate: u32) -> Result<u32> {
        self.record(format!("set_sample_rate({dir}, {rate})"));
        self.check("set_sample_rate")?;
        Ok(rate)
    }

    fn set_bandwidth(&self, dir: Direction, bandwidth: u32) -> Result<u32> {
        self.record(format!("set_bandwidth({dir}, {bandwidth})"));
        self.check("set_bandwidth")?;
        Ok(bandwidth)
    }

    fn set_frequency(&self, dir: Direction, freq_hz: u64) -> Result<()> {
        self.record(format!("set_frequency({dir}, {freq_hz})"));
        self.check("set_frequency")
    }

    fn set_tx_vga1(&self, gain_db: i32) -> Result<()> {
        self.record(format!("set_tx_vga1({gain_db})"));
        self.check("set_tx_vga1")
    }

    fn set_tx_vga2(&self, gain_db: i32) -> Result<()> {
        self.record(format!("set_tx_vga2({gain_db})"));
        self.check("set_tx_vga2")
    }

    fn expansion_attach(&self, attach: bool) -> Result<()> {
        self.record(format!("expansion_attach({attach})"));
        self.check("expansion_attach")
    }

    fn set_xb200_path(&self, dir: Direction, path: Xb200Path) -> Result<()> {
        self.record(format!("set_xb200_path({dir}, {path:?})"));
        self.check("set_xb200_path")
    }

    fn set_xb200_filter(&self, dir: Direction, filter: Xb200Filter) -> Result<()> {
        self.record(format!("set_xb200_filter({dir}, {filter:?})"));
        self.check("set_xb200_filter")
    }

    fn submit_tx(&self, samples: &[IqSample]) -> Result<()> {
        if self.failing.lock().unwrap().contains("submit_tx") {
            return Err(Error::Transfer("injected failure".into()));
        }
        self.tx_blocks.lock().unwrap().push(samples.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.record("close()".to_string());
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A mock [`SdrSdk`] handing out a single shared [`MockSdrHandle`].
pub struct MockSdk {
    handle: Arc<MockSdrHandle>,
    fail_open: AtomicBool,
    opened: Mutex<Vec<String>>,
}

impl MockSdk {
    /// Create a mock SDK with a fresh handle.
    pub fn new() -> Arc<Self> {
        Arc::new(MockSdk {
            handle: MockSdrHandle::new(),
            fail_open: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        })
    }

    /// The handle every successful `open()` returns.
    pub fn handle(&self) -> Arc<MockSdrHandle> {
        Arc::clone(&self.handle)
    }

    /// Make subsequent `open()` calls fail.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Serials passed to successful `open()` calls, in order.
    pub fn opened_serials(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl SdrSdk for MockSdk {
    fn open(&self, serial: &str) -> Result<Arc<dyn SdrHandle>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::DeviceOpen(format!("injected failure for {serial}")));
        }
        self.opened.lock().unwrap().push(serial.to_string());
        Ok(self.handle() as Arc<dyn SdrHandle>)
    }
}

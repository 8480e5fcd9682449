//! The dedicated streaming worker thread.
//!
//! Pulls baseband slices from the [`SampleFifo`], expands them by the
//! current interpolation factor, and drives the SDK's blocking synchronous
//! transfer call in a tight loop. Runs on a `std::thread` rather than a
//! tokio task because `submit_tx` blocks for the duration of a USB
//! transfer.
//!
//! The interpolation factor is the only piece of settings state the worker
//! reads, and it reads it through an atomic once per slice -- factor
//! changes take effect on the next slice boundary without restarting the
//! thread. Everything else is reconfigured by stopping the worker first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;

use iqgate_core::fifo::SampleFifo;
use iqgate_core::sdk::SdrHandle;
use iqgate_core::types::IqSample;

/// Samples per hardware transfer block.
pub const TRANSFER_BLOCK_SIZE: usize = 1 << 14;

/// Highest supported log2 interpolation factor (64x).
pub const MAX_LOG2_INTERP: u32 = 6;

/// Handle to the running streaming thread.
///
/// Dropping the worker stops and joins the thread; [`stop`](Self::stop)
/// does the same explicitly. The join guarantees no transfer is left
/// half-submitted when control returns to the caller.
pub struct OutputWorker {
    stop: Arc<AtomicBool>,
    log2_interp: Arc<AtomicU32>,
    fifo: Arc<SampleFifo>,
    thread: Option<thread::JoinHandle<()>>,
}

impl OutputWorker {
    /// Spawn the streaming thread.
    pub fn start(handle: Arc<dyn SdrHandle>, fifo: Arc<SampleFifo>, log2_interp: u32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let interp = Arc::new(AtomicU32::new(log2_interp.min(MAX_LOG2_INTERP)));
        let thread = {
            let stop = Arc::clone(&stop);
            let interp = Arc::clone(&interp);
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || run_loop(handle, fifo, interp, stop))
        };
        OutputWorker {
            stop,
            log2_interp: interp,
            fifo,
            thread: Some(thread),
        }
    }

    /// Change the interpolation factor applied from the next slice on.
    ///
    /// Safe to call while the thread is streaming.
    pub fn set_log2_interpolation(&self, log2_interp: u32) {
        self.log2_interp
            .store(log2_interp.min(MAX_LOG2_INTERP), Ordering::Release);
    }

    /// The factor currently applied to slices.
    pub fn log2_interpolation(&self) -> u32 {
        self.log2_interp.load(Ordering::Acquire)
    }

    /// The streaming thread's identifier (tests use this to detect
    /// restart cycles).
    pub fn thread_id(&self) -> Option<thread::ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    /// Signal the thread to exit after its current transfer and join it.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Unblock a worker waiting on an empty FIFO.
        self.fifo.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OutputWorker {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run_loop(
    handle: Arc<dyn SdrHandle>,
    fifo: Arc<SampleFifo>,
    log2_interp: Arc<AtomicU32>,
    stop: Arc<AtomicBool>,
) {
    let mut chunk = vec![IqSample::default(); TRANSFER_BLOCK_SIZE];
    let mut block = vec![IqSample::default(); TRANSFER_BLOCK_SIZE];
    tracing::debug!("output worker started");

    while !stop.load(Ordering::Acquire) {
        let interp = log2_interp.load(Ordering::Acquire).min(MAX_LOG2_INTERP);
        let take = TRANSFER_BLOCK_SIZE >> interp;

        if fifo.read(&mut chunk[..take]).is_err() {
            // FIFO shut down: exit promptly, mid-slice data is dropped.
            break;
        }

        let out: &[IqSample] = if interp == 0 {
            &chunk[..take]
        } else {
            expand(&chunk[..take], &mut block, interp);
            &block[..]
        };

        if let Err(e) = handle.submit_tx(out) {
            // A single failed slice is recoverable; keep streaming.
            tracing::warn!(error = %e, "TX transfer failed, continuing");
        }
    }

    tracing::debug!("output worker stopped");
}

/// Zero-order-hold expansion of one baseband slice into a full transfer
/// block: each input sample is repeated `1 << log2_interp` times.
fn expand(input: &[IqSample], output: &mut [IqSample], log2_interp: u32) {
    let factor = 1usize << log2_interp;
    for (i, s) in input.iter().enumerate() {
        let base = i * factor;
        output[base..base + factor].fill(*s);
    }
}

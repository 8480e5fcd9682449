//! Bounded blocking sample FIFO between the DSP pipeline and the stream
//! worker.
//!
//! Single producer, single consumer. Both ends block under backpressure
//! (full on the producer side, empty on the consumer side) so no samples
//! are silently dropped, and both unblock immediately when
//! [`shutdown`](SampleFifo::shutdown) is signalled so the worker can exit
//! promptly during a stop or reconfiguration.
//!
//! Capacity is recomputed on every rate or interpolation change via
//! [`fifo_capacity`] so that the buffered duration stays within a bounded
//! time window regardless of the effective sample rate.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::types::IqSample;

/// Target buffered duration in seconds.
pub const FIFO_LENGTH_SECONDS: f64 = 0.25;

/// Minimum capacity in frames at interpolation factors below 32x.
pub const FIFO_MIN_FRAMES: usize = 65_536;

/// Fixed capacity in frames at interpolation factors of 32x and above,
/// where the transport submits much larger bursts per transfer.
pub const FIFO_MIN_FRAMES_HIGH_INTERP: usize = 131_072;

/// Interpolation factor (log2) at which the high-rate floor kicks in.
pub const HIGH_INTERP_THRESHOLD: u32 = 5;

/// Compute the FIFO capacity for a device sample rate and interpolation
/// factor.
///
/// Below the 32x threshold the capacity tracks the effective baseband rate
/// (`rate >> log2_interp`) scaled by [`FIFO_LENGTH_SECONDS`], floored at
/// [`FIFO_MIN_FRAMES`]. At 32x and above the capacity is the fixed
/// [`FIFO_MIN_FRAMES_HIGH_INTERP`] floor. The result is always positive.
pub fn fifo_capacity(dev_sample_rate: u32, log2_interp: u32) -> usize {
    if log2_interp >= HIGH_INTERP_THRESHOLD {
        FIFO_MIN_FRAMES_HIGH_INTERP
    } else {
        let effective_rate = (dev_sample_rate >> log2_interp) as f64;
        ((effective_rate * FIFO_LENGTH_SECONDS) as usize).max(FIFO_MIN_FRAMES)
    }
}

struct FifoState {
    buf: VecDeque<IqSample>,
    capacity: usize,
    shutdown: bool,
}

/// Bounded ring of complex sample frames with blocking ends.
pub struct SampleFifo {
    state: Mutex<FifoState>,
    readable: Condvar,
    writable: Condvar,
}

/// Recover the guard even if a panicking thread poisoned the lock; the
/// FIFO state is structurally valid between any two operations.
fn lock(state: &Mutex<FifoState>) -> MutexGuard<'_, FifoState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl SampleFifo {
    /// Create a FIFO with the given capacity in frames (floored at 1).
    pub fn new(capacity: usize) -> Self {
        SampleFifo {
            state: Mutex::new(FifoState {
                buf: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                shutdown: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Current capacity in frames.
    pub fn capacity(&self) -> usize {
        lock(&self.state).capacity
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        lock(&self.state).buf.len()
    }

    /// Whether the FIFO holds no frames.
    pub fn is_empty(&self) -> bool {
        lock(&self.state).buf.is_empty()
    }

    /// Change the capacity, dropping any buffered frames.
    ///
    /// Only valid while the worker is not actively streaming; callers stop
    /// or pause the worker before resizing.
    pub fn resize(&self, capacity: usize) {
        let mut st = lock(&self.state);
        st.capacity = capacity.max(1);
        st.buf.clear();
        // Blocked writers re-evaluate against the new capacity.
        self.writable.notify_all();
        self.readable.notify_all();
    }

    /// Signal shutdown: all blocked and future calls return
    /// [`Error::FifoStopped`] without touching buffered data.
    pub fn shutdown(&self) {
        let mut st = lock(&self.state);
        st.shutdown = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Clear the shutdown signal and drop stale frames before a restart.
    pub fn reset(&self) {
        let mut st = lock(&self.state);
        st.shutdown = false;
        st.buf.clear();
    }

    /// Write all of `samples`, blocking while the FIFO is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FifoStopped`] if [`shutdown`](Self::shutdown) is
    /// signalled before everything was accepted.
    pub fn write(&self, samples: &[IqSample]) -> Result<()> {
        let mut st = lock(&self.state);
        let mut written = 0;
        while written < samples.len() {
            while st.buf.len() >= st.capacity && !st.shutdown {
                st = self.writable.wait(st).unwrap_or_else(|e| e.into_inner());
            }
            if st.shutdown {
                return Err(Error::FifoStopped);
            }
            let room = st.capacity - st.buf.len();
            let n = room.min(samples.len() - written);
            st.buf.extend(samples[written..written + n].iter().copied());
            written += n;
            self.readable.notify_one();
        }
        Ok(())
    }

    /// Fill all of `out`, blocking while the FIFO is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FifoStopped`] if [`shutdown`](Self::shutdown) is
    /// signalled before `out` was filled.
    pub fn read(&self, out: &mut [IqSample]) -> Result<()> {
        let mut st = lock(&self.state);
        let mut filled = 0;
        while filled < out.len() {
            while st.buf.is_empty() && !st.shutdown {
                st = self.readable.wait(st).unwrap_or_else(|e| e.into_inner());
            }
            if st.shutdown {
                return Err(Error::FifoStopped);
            }
            while filled < out.len() {
                match st.buf.pop_front() {
                    Some(s) => {
                        out[filled] = s;
                        filled += 1;
                    }
                    None => break,
                }
            }
            self.writable.notify_one();
        }
        Ok(())
    }
}

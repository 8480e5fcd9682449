//! iqgate-test-harness: Mock SDK sessions for deterministic testing of the
//! device engine without real transceiver hardware.
//!
//! [`MockSdrHandle`] records every SDK call in order and supports per-call
//! failure injection, so tests can assert exact hardware write sequences
//! and best-effort error handling.

pub mod mock_sdk;

pub use mock_sdk::{MockSdk, MockSdrHandle};

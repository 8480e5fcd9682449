//! Error types for iqgate.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Hardware-facing errors never cross the
//! command boundary: only `open()` and `start()` surface failures to their
//! callers, everything else is logged and treated as advisory.

/// The error type for all iqgate operations.
///
/// Variants cover the failure modes of a full-duplex transceiver session:
/// device acquisition, buddy attachment, streaming setup, individual
/// parameter writes, and single-transfer failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The physical device could not be opened by serial identifier.
    ///
    /// Fatal to `open()`; the device stays unusable until a future retry.
    #[error("could not open device: {0}")]
    DeviceOpen(String),

    /// Buddy attachment was requested but the peer holds no open handle.
    #[error("peer device has no open handle")]
    NoPeerHandle,

    /// The device opened but rejected streaming setup for this direction.
    #[error("could not enable streaming: {0}")]
    StreamEnable(String),

    /// An individual parameter write was rejected by the SDK.
    ///
    /// Non-fatal: reconciliation logs it and continues with the remaining
    /// parameters.
    #[error("hardware write failed for {param}: {reason}")]
    HardwareWrite {
        /// Name of the rejected parameter.
        param: &'static str,
        /// SDK-reported reason.
        reason: String,
    },

    /// A single streaming transfer failed.
    ///
    /// Non-fatal: the worker loop logs it and continues with the next slice.
    #[error("sample transfer failed: {0}")]
    Transfer(String),

    /// Persisted settings bytes could not be decoded.
    ///
    /// Recovered locally by resetting to defaults; surfaced to the caller
    /// only as a boolean.
    #[error("settings deserialization failed: {0}")]
    Deserialization(String),

    /// No hardware handle is present (device was never opened).
    #[error("no device handle")]
    NoDevice,

    /// The sample FIFO was shut down while a blocking call was waiting.
    #[error("sample fifo stopped")]
    FifoStopped,
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_device_open() {
        let e = Error::DeviceOpen("no such serial".into());
        assert_eq!(e.to_string(), "could not open device: no such serial");
    }

    #[test]
    fn error_display_no_peer_handle() {
        let e = Error::NoPeerHandle;
        assert_eq!(e.to_string(), "peer device has no open handle");
    }

    #[test]
    fn error_display_stream_enable() {
        let e = Error::StreamEnable("module busy".into());
        assert_eq!(e.to_string(), "could not enable streaming: module busy");
    }

    #[test]
    fn error_display_hardware_write() {
        let e = Error::HardwareWrite {
            param: "devSampleRate",
            reason: "out of range".into(),
        };
        assert_eq!(
            e.to_string(),
            "hardware write failed for devSampleRate: out of range"
        );
    }

    #[test]
    fn error_display_transfer() {
        let e = Error::Transfer("usb stall".into());
        assert_eq!(e.to_string(), "sample transfer failed: usb stall");
    }

    #[test]
    fn error_display_fifo_stopped() {
        let e = Error::FifoStopped;
        assert_eq!(e.to_string(), "sample fifo stopped");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}

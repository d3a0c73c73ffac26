use thiserror::Error;

/// Errors that can occur during microphone capture operations.
///
/// Payloads are plain strings so the error can be cloned into the published
/// `RecordingStatus` when it originates on the device callback thread.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No device selected, invalid stream format, invalid gain, or an
    /// operation that is not valid in the current state.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Device unavailable, format unsupported, or a device-level fault.
    #[error("device error: {0}")]
    Device(String),

    /// Destination unwritable or a write to the container failed.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("already recording")]
    AlreadyRecording,

    #[error("malformed audio block: {len} bytes is not a whole number of {sample_width}-byte samples")]
    MalformedBlock { len: usize, sample_width: usize },
}

impl CaptureError {
    /// Whether this error, raised mid-capture, forces the session down.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, Self::Device(_) | Self::Io(_) | Self::MalformedBlock { .. })
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

use std::sync::Arc;

use crate::models::device::DeviceDescriptor;
use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;

/// Callback invoked with each block of interleaved little-endian PCM bytes
/// in the provider's negotiated `StreamFormat`.
///
/// The slice is only valid for the duration of the call.
pub type AudioBufferCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Callback invoked when the device faults mid-capture.
pub type DeviceErrorCallback = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// A capture device acquired at a fixed format.
///
/// Implemented by:
/// - `CpalMicCapture` (cpal backend)
/// - scripted providers in tests
pub trait CaptureProvider: Send {
    /// Start delivering buffers via `on_buffer`.
    ///
    /// Callbacks fire on a device thread; keep processing minimal.
    fn start(&mut self, on_buffer: AudioBufferCallback, on_error: DeviceErrorCallback) -> Result<(), CaptureError>;

    /// Stop delivering buffers.
    ///
    /// When this returns no callback is running and none will run again.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Format the device delivers.
    fn format(&self) -> StreamFormat;

    /// Device backing this provider.
    fn device_info(&self) -> DeviceDescriptor;
}

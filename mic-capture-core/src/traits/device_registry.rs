use crate::models::device::DeviceDescriptor;
use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;
use crate::traits::capture_provider::CaptureProvider;

/// Source of capture endpoints.
pub trait DeviceRegistry: Send + Sync {
    type Provider: CaptureProvider + 'static;

    /// List capture devices in a stable order for this pass.
    ///
    /// Each call re-enumerates; indices from an older pass are stale.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CaptureError>;

    /// Acquire `device` at `format`.
    ///
    /// Fails with `CaptureError::Device` if the device is gone or cannot
    /// deliver the format.
    fn open_device(&self, device: &DeviceDescriptor, format: &StreamFormat) -> Result<Self::Provider, CaptureError>;
}

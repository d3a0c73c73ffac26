//! # mic-capture-cpal
//!
//! Cross-platform cpal backend for mic-capture-core.
//!
//! Provides:
//! - `CpalDeviceRegistry`: input device enumeration and format negotiation
//! - `CpalMicCapture`: microphone capture on a dedicated stream thread
//!
//! ## Usage
//! ```ignore
//! use mic_capture_core::{RecorderConfiguration, RecordingController, StreamFormat};
//! use mic_capture_cpal::CpalDeviceRegistry;
//!
//! let controller = RecordingController::new(CpalDeviceRegistry::new(), RecorderConfiguration::default())?;
//! let devices = controller.enumerate_devices()?;
//! controller.start(devices[0].index, StreamFormat::default(), None)?;
//! ```

pub mod cpal_mic;
pub mod device_registry;

pub use cpal_mic::CpalMicCapture;
pub use device_registry::CpalDeviceRegistry;

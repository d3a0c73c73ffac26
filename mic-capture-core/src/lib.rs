//! # mic-capture-core
//!
//! Platform-agnostic microphone recording core.
//!
//! Provides gain, level metering, streaming WAV output and the recording
//! state machine. Audio backends implement `DeviceRegistry` and
//! `CaptureProvider` and plug into the generic `RecordingController`.
//!
//! ## Architecture
//!
//! ```text
//! mic-capture-core (this crate)
//! ├── traits/       ← DeviceRegistry, CaptureProvider, RecordingDelegate
//! ├── models/       ← CaptureError, StreamFormat, AudioBlock, RecordingStatus, etc.
//! ├── processing/   ← gain, level meter, PCM sample codec, WAV header generation
//! ├── session/      ← CaptureSession (one recording), RecordingController
//! └── storage/      ← WavStreamWriter, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_block::AudioBlock;
pub use models::config::RecorderConfiguration;
pub use models::device::DeviceDescriptor;
pub use models::error::CaptureError;
pub use models::format::{BitDepth, StreamFormat, COMMON_SAMPLE_RATES};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{RecordingState, RecordingStatus};
pub use processing::gain::{apply_gain, GainControl, UNITY_GAIN};
pub use processing::level_meter::{measure_level, LevelMonitor};
pub use session::capture_session::{CaptureSession, SessionHooks};
pub use session::controller::RecordingController;
pub use storage::wav_writer::WavStreamWriter;
pub use traits::capture_delegate::RecordingDelegate;
pub use traits::capture_provider::{AudioBufferCallback, CaptureProvider, DeviceErrorCallback};
pub use traits::device_registry::DeviceRegistry;
